use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use homebus_frame::PacketDefaults;
use homebus_transport::PacketSink;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::ack::{AckKey, AckRegistry};

/// Retry budget of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Configured retry budget, `tx_retry_cnt`. See [`attempts`](Self::attempts).
    pub retry_count: u32,
    /// How long each attempt waits for its acknowledgement.
    pub timeout: Duration,
    /// Pause after every timed-out attempt, the last one included.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn from_defaults(defaults: &PacketDefaults) -> Self {
        Self {
            retry_count: defaults.tx_retry_cnt,
            timeout: defaults.tx_timeout(),
            interval: defaults.tx_retry_interval(),
        }
    }

    /// Transmissions made when no acknowledgement ever arrives.
    ///
    /// The budget starts at `retry_count + 1` and is only checked for
    /// exhaustion once it drops below zero, so one more send goes out than the
    /// budget suggests.
    pub fn attempts(&self) -> u32 {
        self.retry_count.saturating_add(2)
    }
}

/// How a command ended. Every job settles exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Settlement {
    /// Transmitted once; no acknowledgement was requested.
    Sent,
    /// Acknowledged after `attempts` transmissions.
    Acknowledged { attempts: u32 },
    /// No acknowledgement after every transmission. Not an error.
    Exhausted { attempts: u32 },
    /// Dropped before it was transmitted, e.g. on channel shutdown.
    Abandoned,
}

/// Settle-once completion signal shared between a job and its owner.
#[derive(Debug)]
struct Completion {
    settled: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Settlement>>>,
}

impl Completion {
    fn settle(&self, settlement: Settlement) -> bool {
        if self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(settlement);
        }
        true
    }
}

/// A pending outbound transmission.
#[derive(Debug)]
pub struct CommandJob {
    packet: Bytes,
    policy: RetryPolicy,
    ack: Option<AckKey>,
    completion: Arc<Completion>,
}

impl CommandJob {
    /// Create a job for a fully framed packet, plus the handle that resolves
    /// when it settles.
    pub fn new(packet: impl Into<Bytes>, policy: RetryPolicy) -> (Self, JobHandle) {
        let (tx, rx) = oneshot::channel();
        let completion = Arc::new(Completion {
            settled: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        });
        let job = Self {
            packet: packet.into(),
            policy,
            ack: None,
            completion,
        };
        (job, JobHandle { rx })
    }

    /// Require an acknowledgement before the job counts as delivered.
    pub fn with_ack(mut self, key: AckKey) -> Self {
        self.ack = Some(key);
        self
    }

    pub fn packet(&self) -> &[u8] {
        &self.packet
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn ack(&self) -> Option<&AckKey> {
        self.ack.as_ref()
    }

    /// Settle the job. Returns false when it was already settled.
    pub fn settle(&self, settlement: Settlement) -> bool {
        self.completion.settle(settlement)
    }

    pub fn is_settled(&self) -> bool {
        self.completion.settled.load(Ordering::Acquire)
    }
}

/// Resolves with the job's settlement.
#[derive(Debug)]
pub struct JobHandle {
    rx: oneshot::Receiver<Settlement>,
}

impl JobHandle {
    /// Wait for settlement. A job dropped without settling counts as
    /// abandoned.
    pub async fn wait(self) -> Settlement {
        self.rx.await.unwrap_or(Settlement::Abandoned)
    }
}

/// Runs jobs to settlement against a sink and an acknowledgement registry.
pub struct RetryEngine<S> {
    sink: S,
    registry: Arc<Mutex<AckRegistry>>,
}

impl<S: PacketSink> RetryEngine<S> {
    pub fn new(sink: S, registry: Arc<Mutex<AckRegistry>>) -> Self {
        Self { sink, registry }
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Transmit `job` until it is acknowledged or its budget is spent.
    ///
    /// A failed write counts as an attempt without an acknowledgement.
    pub async fn run(&mut self, job: CommandJob) -> Settlement {
        let Some(key) = job.ack.clone() else {
            self.transmit(&job, 1);
            job.settle(Settlement::Sent);
            return Settlement::Sent;
        };

        let policy = job.policy;
        let mut attempts_remaining = i64::from(policy.retry_count) + 1;
        let mut attempt = 0u32;
        while attempts_remaining >= 0 {
            attempts_remaining -= 1;
            attempt += 1;
            let (id, ack) = self.registry().register(&key);
            self.transmit(&job, attempt);

            let acked = matches!(tokio::time::timeout(policy.timeout, ack).await, Ok(Ok(())));
            self.registry().deregister(id);
            if acked {
                let settlement = Settlement::Acknowledged { attempts: attempt };
                job.settle(settlement);
                debug!(attempt, "command acknowledged");
                return settlement;
            }

            trace!(attempt, attempts_remaining, "no acknowledgement before timeout");
            tokio::time::sleep(policy.interval).await;
        }

        warn!(
            attempts = attempt,
            ack = ?key,
            "command not acknowledged; giving up"
        );
        let settlement = Settlement::Exhausted { attempts: attempt };
        job.settle(settlement);
        settlement
    }

    fn transmit(&mut self, job: &CommandJob, attempt: u32) {
        trace!(attempt, len = job.packet.len(), "transmitting command");
        if let Err(err) = self.sink.write_packet(&job.packet) {
            warn!(attempt, error = %err, "failed to transmit command");
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, AckRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

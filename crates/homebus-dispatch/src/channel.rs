use std::sync::{Arc, Mutex, PoisonError};

use homebus_frame::{encode_command, PacketDefaults, RawPacket};
use homebus_transport::PacketSink;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::ack::{AckKey, AckRegistry};
use crate::dispatcher::{CommandDispatcher, Priority};
use crate::error::{DispatchError, Result};
use crate::retry::{CommandJob, JobHandle, RetryEngine, RetryPolicy, Settlement};

const REQUEST_QUEUE_DEPTH: usize = 64;

enum Request {
    Submit(CommandJob, Priority),
    Shutdown(oneshot::Sender<usize>),
}

/// Handle to the command task of one bus channel.
///
/// The task transmits one command at a time: each job runs to settlement
/// before the next one is dequeued, and consecutive transmissions are at
/// least `tx_delay` apart. Clones share the same task.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    requests: mpsc::Sender<Request>,
    registry: Arc<Mutex<AckRegistry>>,
    defaults: Arc<PacketDefaults>,
}

impl CommandChannel {
    /// Spawn the channel task on the current tokio runtime.
    pub fn spawn<S>(sink: S, defaults: PacketDefaults) -> Result<Self>
    where
        S: PacketSink + Send + 'static,
    {
        defaults.validate()?;
        let registry = Arc::new(Mutex::new(AckRegistry::new()));
        let (requests, inbox) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let engine = RetryEngine::new(sink, Arc::clone(&registry));
        let dispatcher = CommandDispatcher::new(defaults.tx_delay());
        tokio::spawn(run_channel(engine, dispatcher, inbox));

        Ok(Self {
            requests,
            registry,
            defaults: Arc::new(defaults),
        })
    }

    /// Frame `body` with the transmit header, checksum and footer and queue
    /// it. The handle resolves when the command settles.
    pub async fn submit(
        &self,
        body: &[u8],
        ack: Option<AckKey>,
        priority: Priority,
    ) -> Result<JobHandle> {
        let packet = encode_command(&self.defaults, body);
        let (job, handle) = CommandJob::new(packet, RetryPolicy::from_defaults(&self.defaults));
        let job = match ack {
            Some(key) => job.with_ack(key),
            None => job,
        };
        self.requests
            .send(Request::Submit(job, priority))
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;
        Ok(handle)
    }

    /// Submit and wait for settlement.
    pub async fn send(
        &self,
        body: &[u8],
        ack: Option<AckKey>,
        priority: Priority,
    ) -> Result<Settlement> {
        Ok(self.submit(body, ack, priority).await?.wait().await)
    }

    /// Report that an entity changed state. Returns how many waiting
    /// commands this acknowledged.
    pub fn state_changed(&self, entity_id: &str) -> usize {
        self.lock_registry().notify_entity(entity_id)
    }

    /// Offer a received packet to pattern acknowledgements. Patterns without
    /// their own offset are matched right after the receive header.
    pub fn packet_received(&self, packet: &RawPacket) -> usize {
        let base_offset = self.defaults.rx_header.len();
        self.lock_registry().notify_packet(packet, base_offset)
    }

    /// Stop the task. Queued commands settle as abandoned; the command in
    /// flight, if any, finishes first. Returns the number abandoned.
    pub async fn shutdown(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Shutdown(tx))
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;
        rx.await.map_err(|_| DispatchError::ChannelClosed)
    }

    pub fn defaults(&self) -> &PacketDefaults {
        &self.defaults
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, AckRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_channel<S: PacketSink>(
    mut engine: RetryEngine<S>,
    mut dispatcher: CommandDispatcher<CommandJob>,
    mut inbox: mpsc::Receiver<Request>,
) {
    let mut open = true;
    loop {
        if dispatcher.is_empty() {
            if !open {
                break;
            }
            match inbox.recv().await {
                Some(request) => {
                    if let Some(reply) = accept(&mut dispatcher, request) {
                        return shut_down(&mut dispatcher, reply);
                    }
                }
                None => open = false,
            }
            continue;
        }

        // Queue everything already waiting so priorities apply across it.
        while open {
            match inbox.try_recv() {
                Ok(request) => {
                    if let Some(reply) = accept(&mut dispatcher, request) {
                        return shut_down(&mut dispatcher, reply);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => open = false,
            }
        }

        let now = Instant::now().into_std();
        if let Some(job) = dispatcher.dequeue_if_ready(now) {
            engine.run(job).await;
            continue;
        }
        let Some(ready_at) = dispatcher.next_ready_at(now) else {
            continue;
        };
        tokio::select! {
            request = inbox.recv(), if open => match request {
                Some(request) => {
                    if let Some(reply) = accept(&mut dispatcher, request) {
                        return shut_down(&mut dispatcher, reply);
                    }
                }
                None => open = false,
            },
            () = tokio::time::sleep_until(Instant::from_std(ready_at)) => {}
        }
    }

    let abandoned = abandon(&mut dispatcher);
    debug!(abandoned, "command channel handles dropped");
}

/// Queue a submitted job, or hand back the reply slot of a shutdown request.
fn accept(
    dispatcher: &mut CommandDispatcher<CommandJob>,
    request: Request,
) -> Option<oneshot::Sender<usize>> {
    match request {
        Request::Submit(job, priority) => {
            dispatcher.enqueue(job, priority);
            None
        }
        Request::Shutdown(reply) => Some(reply),
    }
}

fn shut_down(dispatcher: &mut CommandDispatcher<CommandJob>, reply: oneshot::Sender<usize>) {
    let abandoned = abandon(dispatcher);
    info!(abandoned, "command channel shut down");
    let _ = reply.send(abandoned);
}

fn abandon(dispatcher: &mut CommandDispatcher<CommandJob>) -> usize {
    dispatcher
        .drain()
        .into_iter()
        .filter(|job| job.settle(Settlement::Abandoned))
        .count()
}

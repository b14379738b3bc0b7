//! Correlation of sent commands with acknowledgement events.
//!
//! Entity listeners are keyed by entity id. Pattern listeners are tested
//! against every received packet, which is fine while only a handful of
//! raw-acknowledged commands are in flight.

use std::collections::HashMap;

use homebus_frame::ByteSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::trace;

/// What confirms that a command took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckKey {
    /// The named entity reports a state change.
    Entity(String),
    /// A received packet matches the pattern.
    Pattern(ByteSchema),
}

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug)]
struct Waiter {
    id: ListenerId,
    tx: oneshot::Sender<()>,
}

/// Active acknowledgement listeners for one channel.
///
/// A listener fires at most once and is removed when it fires.
#[derive(Debug, Default)]
pub struct AckRegistry {
    next_id: u64,
    entities: HashMap<String, Vec<Waiter>>,
    patterns: Vec<(ByteSchema, Waiter)>,
    /// Entity each live listener waits on; `None` for pattern listeners.
    owners: HashMap<ListenerId, Option<String>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `key`; the receiver resolves when it fires.
    pub fn register(&mut self, key: &AckKey) -> (ListenerId, oneshot::Receiver<()>) {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter { id, tx };
        match key {
            AckKey::Entity(entity) => {
                self.entities.entry(entity.clone()).or_default().push(waiter);
                self.owners.insert(id, Some(entity.clone()));
            }
            AckKey::Pattern(pattern) => {
                self.patterns.push((pattern.clone(), waiter));
                self.owners.insert(id, None);
            }
        }
        (id, rx)
    }

    /// Remove a listener. Unknown or already fired ids are ignored.
    ///
    /// Only the listener's own entity entry is touched.
    pub fn deregister(&mut self, id: ListenerId) {
        match self.owners.remove(&id) {
            Some(Some(entity)) => {
                if let Some(waiters) = self.entities.get_mut(&entity) {
                    waiters.retain(|waiter| waiter.id != id);
                    if waiters.is_empty() {
                        self.entities.remove(&entity);
                    }
                }
            }
            Some(None) => self.patterns.retain(|(_, waiter)| waiter.id != id),
            None => {}
        }
    }

    /// Fire every listener waiting on `entity`. Returns how many fired.
    pub fn notify_entity(&mut self, entity: &str) -> usize {
        let Some(waiters) = self.entities.remove(entity) else {
            return 0;
        };
        for waiter in &waiters {
            self.owners.remove(&waiter.id);
        }
        let fired = fire(waiters);
        trace!(entity, fired, "entity acknowledgement");
        fired
    }

    /// Fire every pattern listener matching `packet`. Returns how many fired.
    pub fn notify_packet(&mut self, packet: &[u8], base_offset: usize) -> usize {
        if self.patterns.is_empty() {
            return 0;
        }
        let (hits, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.patterns)
            .into_iter()
            .partition(|(pattern, _)| pattern.matches(packet, base_offset));
        self.patterns = rest;
        for (_, waiter) in &hits {
            self.owners.remove(&waiter.id);
        }
        let fired = fire(hits.into_iter().map(|(_, waiter)| waiter));
        if fired > 0 {
            trace!(fired, "packet acknowledgement");
        }
        fired
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn fire(waiters: impl IntoIterator<Item = Waiter>) -> usize {
    waiters
        .into_iter()
        .filter(|waiter| !waiter.tx.is_closed())
        .map(|waiter| waiter.tx.send(()))
        .filter(Result::is_ok)
        .count()
}

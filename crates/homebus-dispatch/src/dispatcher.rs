use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Queue a command is placed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// User-initiated commands.
    #[default]
    Normal,
    /// Background traffic such as periodic polls.
    Low,
}

/// Two-priority FIFO with a minimum delay between dispatches.
///
/// Items only leave through [`dequeue_if_ready`](Self::dequeue_if_ready),
/// which pops `Normal` before `Low`.
#[derive(Debug)]
pub struct CommandDispatcher<T> {
    normal: VecDeque<T>,
    low: VecDeque<T>,
    delay: Duration,
    last_dispatch: Option<Instant>,
}

impl<T> CommandDispatcher<T> {
    /// Create a dispatcher enforcing `delay` between dispatches.
    pub fn new(delay: Duration) -> Self {
        Self {
            normal: VecDeque::new(),
            low: VecDeque::new(),
            delay,
            last_dispatch: None,
        }
    }

    pub fn enqueue(&mut self, item: T, priority: Priority) {
        match priority {
            Priority::Normal => self.normal.push_back(item),
            Priority::Low => self.low.push_back(item),
        }
    }

    /// Pop the next item if the inter-command delay has elapsed.
    pub fn dequeue_if_ready(&mut self, now: Instant) -> Option<T> {
        if self.is_empty() || !self.is_ready(now) {
            return None;
        }
        let item = self.normal.pop_front().or_else(|| self.low.pop_front())?;
        self.last_dispatch = Some(now);
        Some(item)
    }

    /// Earliest instant at which an item can be dequeued, or `None` when
    /// nothing is queued.
    pub fn next_ready_at(&self, now: Instant) -> Option<Instant> {
        if self.is_empty() {
            return None;
        }
        match self.last_dispatch {
            Some(last) => Some((last + self.delay).max(now)),
            None => Some(now),
        }
    }

    pub fn len(&self) -> usize {
        self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.low.is_empty()
    }

    /// Remove every queued item, normal queue first.
    pub fn drain(&mut self) -> Vec<T> {
        self.normal.drain(..).chain(self.low.drain(..)).collect()
    }

    fn is_ready(&self, now: Instant) -> bool {
        self.last_dispatch
            .is_none_or(|last| now.saturating_duration_since(last) >= self.delay)
    }
}

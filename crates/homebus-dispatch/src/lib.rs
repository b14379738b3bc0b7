//! Command dispatch for RS485 buses.
//!
//! Commands are queued by priority, transmitted one at a time with a minimum
//! gap, and retried until a matching acknowledgement arrives: either a
//! state change of the target entity or a received packet matching a byte
//! pattern. A device that never answers settles its command as exhausted
//! instead of stalling the channel.

pub mod ack;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod retry;

pub use ack::{AckKey, AckRegistry, ListenerId};
pub use channel::CommandChannel;
pub use dispatcher::{CommandDispatcher, Priority};
pub use error::{DispatchError, Result};
pub use pipeline::{FramePipeline, DEFAULT_QUEUE_DEPTH};
pub use retry::{CommandJob, JobHandle, RetryEngine, RetryPolicy, Settlement};

/// Errors that can occur in command dispatch.
///
/// Exhausted retries are not an error; see
/// [`Settlement::Exhausted`](crate::retry::Settlement::Exhausted).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] homebus_transport::TransportError),

    /// Frame-level error, usually invalid channel configuration.
    #[error("frame error: {0}")]
    Frame(#[from] homebus_frame::FrameError),

    /// The command channel task has stopped.
    #[error("command channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DispatchError>;

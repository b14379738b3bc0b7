/// Errors that can occur while configuring or driving the packet framer.
///
/// Noisy wire data is never an error here; only setup problems and the
/// underlying stream failing are.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The channel configuration is contradictory or unusable.
    #[error("invalid packet configuration: {0}")]
    InvalidConfig(String),

    /// Channel configuration JSON could not be parsed.
    #[error("invalid packet configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading from the bus.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bus closed.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

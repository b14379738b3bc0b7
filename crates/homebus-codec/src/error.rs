/// Errors that can occur while encoding device values.
///
/// Decoding never fails: a window that does not fit the packet simply has
/// no value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be represented in the schema's decode mode.
    #[error("cannot encode {value} as {mode}")]
    Unencodable { mode: &'static str, value: String },

    /// A label was given that the schema's mapping does not contain.
    #[error("label '{0}' is not in the value mapping")]
    UnknownLabel(String),

    /// The scaled value does not fit into the configured width.
    #[error("value {value} does not fit into {length} byte(s)")]
    OutOfRange { value: String, length: usize },

    /// The configured width is not supported by the decode mode.
    #[error("unsupported length {length} for {mode}")]
    UnsupportedLength { mode: &'static str, length: usize },

    /// The schema is not valid JSON.
    #[error("invalid schema: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

use thiserror::Error;

/// Errors produced while decoding wire messages and payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message or payload was not valid JSON of the expected shape.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field was absent or empty.
    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    /// An epoch-millisecond value outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

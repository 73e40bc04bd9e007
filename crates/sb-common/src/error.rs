//! Error types for splat-bench.

use thiserror::Error;

/// Result type alias for splat-bench operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for splat-bench.
///
/// Module-level errors (codec, metric, record, archive) are converted into
/// this type only at the CLI boundary; inside a batch they are recorded as
/// data instead.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid config file {path}: {reason}")]
    InvalidConfigFile { path: String, reason: String },

    // Input / path errors (20-29)
    #[error("input not found: {0}")]
    InputNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("output root not writable: {path}: {reason}")]
    OutputNotWritable { path: String, reason: String },

    // Codec errors (30-39)
    #[error("codec tool not found: {0}")]
    CodecNotFound(String),

    #[error("no requested codec is available: {0}")]
    NoCodecAvailable(String),

    // Record errors (40-49)
    #[error("record corrupt: {0}")]
    RecordCorrupt(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal (90-99)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfigFile { .. } => 11,
            Error::InputNotFound(_) => 20,
            Error::InvalidInput(_) => 21,
            Error::OutputNotWritable { .. } => 22,
            Error::CodecNotFound(_) => 30,
            Error::NoCodecAvailable(_) => 31,
            Error::RecordCorrupt(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Internal(_) => 90,
        }
    }
}

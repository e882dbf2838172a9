//! Engine error types

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Key not present in any segment
    #[error("key not found")]
    NotFound,

    /// Key exists but under a different type tag, or its value failed to parse
    /// as the requested type
    #[error("type mismatch for key")]
    TypeMismatch,

    /// A frame's declared lengths overran the buffer it was decoded from
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A segment file contained a partial frame during recovery
    #[error("corrupted segment {path}: {reason}")]
    CorruptedSegment { path: String, reason: String },

    /// A file in the engine directory did not match the segment naming pattern
    #[error("unknown file in engine directory: {0}")]
    UnknownFile(String),

    /// An underlying filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Enforced above the engine (by the façade / CLI driver); the engine
    /// itself has no restriction on empty values
    #[error("value must not be empty")]
    EmptyValue,
}

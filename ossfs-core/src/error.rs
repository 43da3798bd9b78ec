//! Error types for ossfs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OssfsError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while tracking dirty ranges or planning parts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan needs {needed} parts, store allows {max}")]
    TooManyParts { needed: usize, max: u32 },

    #[error("invalid range: start={start}, size={size}")]
    InvalidRange { start: i64, size: i64 },

    #[error("invalid part limits: {0}")]
    InvalidLimits(String),
}

/// Errors reported by an object store transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("part {part_number} is smaller than the minimum allowed size")]
    EntityTooSmall { part_number: u32 },

    #[error("store IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether repeating the same request may succeed.
    ///
    /// Timeouts, connection failures, 5xx responses and throttling (429)
    /// are transient; everything else is a rejection of the request itself.
    pub fn retryable(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Network(_) => true,
            TransportError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

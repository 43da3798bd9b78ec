//! Error types for the local object store

use ossfs_core::{OssfsError, TransportError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Object not found: {key}")]
    ObjectNotFound { key: String },

    #[error("Upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("Invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("Part {part_number} is below the minimum part size")]
    PartTooSmall { part_number: u32 },

    #[error("Range {offset}+{len} is outside an object of {size} bytes")]
    InvalidRange { offset: u64, len: u64, size: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] OssfsError),
}

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<StoreError> for TransportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ObjectNotFound { key } => TransportError::NoSuchKey(key),
            StoreError::UploadNotFound { upload_id } => TransportError::NoSuchUpload(upload_id),
            StoreError::InvalidPart { part_number, reason } => {
                TransportError::InvalidPart { part_number, reason }
            }
            StoreError::PartTooSmall { part_number } => TransportError::EntityTooSmall { part_number },
            StoreError::InvalidRange { offset, len, size } => TransportError::Http {
                status: 416,
                message: format!("range {}+{} outside {} bytes", offset, len, size),
            },
            other => TransportError::Io(other.to_string()),
        }
    }
}

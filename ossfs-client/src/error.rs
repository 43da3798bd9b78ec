//! Client error types

use ossfs_core::{OssfsError, PlanError, TransportError};
use std::io;
use thiserror::Error;

use crate::session::SessionState;

/// Failure of a coordinated part upload run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("part {part_number} failed: {cause}")]
    PartFailed { part_number: u32, cause: TransportError },

    #[error("upload cancelled")]
    Cancelled,

    #[error("reading part {part_number} from the local cache failed: {message}")]
    Source { part_number: u32, message: String },
}

/// Failure of a multipart transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("initiating multipart upload failed: {0}")]
    InitFailed(TransportError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("completing multipart upload failed: {0}")]
    CompleteFailed(TransportError),

    #[error("aborting upload {upload_id} failed: {cause}")]
    AbortFailed { upload_id: String, cause: TransportError },

    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] OssfsError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Errno reported to the filesystem layer
    pub fn errno(&self) -> i32 {
        match self {
            ClientError::Plan(PlanError::InvalidRange { .. }) => libc::EINVAL,
            ClientError::Plan(_) => libc::EIO,
            ClientError::Config(_) => libc::EINVAL,
            ClientError::Core(OssfsError::InvalidKey(_)) => libc::EINVAL,
            ClientError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            ClientError::Session(SessionError::Upload(UploadError::Cancelled)) => libc::EINTR,
            _ => libc::EIO,
        }
    }

    /// The part-level failure behind this error, if any
    pub fn upload_error(&self) -> Option<&UploadError> {
        match self {
            ClientError::Session(SessionError::Upload(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientError> for io::Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Io(e) => e,
            other => io::Error::from_raw_os_error(other.errno()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let bad_range = ClientError::Plan(PlanError::InvalidRange { start: -1, size: 4 });
        assert_eq!(bad_range.errno(), libc::EINVAL);

        let failed = ClientError::Session(SessionError::Upload(UploadError::PartFailed {
            part_number: 3,
            cause: TransportError::Http {
                status: 403,
                message: "denied".into(),
            },
        }));
        assert_eq!(failed.errno(), libc::EIO);
        assert!(matches!(
            failed.upload_error(),
            Some(UploadError::PartFailed { part_number: 3, .. })
        ));

        let io_err: io::Error = ClientError::Config("bad".into()).into();
        assert_eq!(io_err.raw_os_error(), Some(libc::EINVAL));
    }
}

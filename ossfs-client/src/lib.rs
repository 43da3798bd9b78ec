//! Multipart upload coordination for ossfs: part uploads, the per-file
//! transaction, and the flush path that drives them

pub mod coordinator;
pub mod error;
pub mod file;
pub mod registry;
pub mod session;
pub mod uploader;

pub use coordinator::{AbortHandle, CoordinatorConfig, PartState, PartUploadCoordinator, RetryPolicy};
pub use error::{ClientError, SessionError, UploadError};
pub use file::OpenFile;
pub use registry::{KeyLease, SessionRegistry};
pub use session::{MultipartSession, SessionState};
pub use uploader::{FlushRequest, Uploader};

pub type Result<T> = std::result::Result<T, ClientError>;

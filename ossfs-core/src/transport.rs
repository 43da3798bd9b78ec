//! The narrow interface between the upload core and an object store

use async_trait::async_trait;

use crate::{CopySource, ETagReceipt, ObjectKey, ObjectMeta, TransportError};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Object store operations the multipart core depends on.
///
/// Implementations own request signing, headers and retries below the HTTP
/// layer; the core only retries whole operations that report a
/// [`TransportError::retryable`] failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a multipart upload and return its upload id
    async fn initiate_multipart(&self, key: &ObjectKey) -> TransportResult<String>;

    /// Upload one part of fresh data and return its ETag
    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> TransportResult<String>;

    /// Fill one part from bytes already stored and return its ETag
    async fn copy_part(
        &self,
        upload_id: &str,
        part_number: u32,
        source: &CopySource,
    ) -> TransportResult<String>;

    /// Assemble the object from `receipts`, which are in part-number order
    async fn complete_multipart(
        &self,
        upload_id: &str,
        receipts: &[ETagReceipt],
    ) -> TransportResult<ObjectMeta>;

    /// Discard an upload and its parts
    async fn abort_multipart(&self, upload_id: &str) -> TransportResult<()>;

    /// Write a whole object in one request
    async fn put_object(&self, key: &ObjectKey, data: &[u8]) -> TransportResult<ObjectMeta>;
}

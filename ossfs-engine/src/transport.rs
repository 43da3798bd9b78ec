//! [`Transport`] over a local [`Bucket`]

use async_trait::async_trait;
use ossfs_core::{
    CopySource, ETagReceipt, ObjectKey, ObjectMeta, StoreOptions, Transport, TransportResult,
};
use tracing::debug;

use crate::Bucket;

/// Serves multipart requests from a fjall-backed bucket.
///
/// Enforces the same completion rules a real store does, including the
/// minimum size of non-final parts.
#[derive(Clone)]
pub struct LocalTransport {
    bucket: Bucket,
    options: StoreOptions,
    min_part_size: u64,
}

impl LocalTransport {
    pub fn new(bucket: Bucket, options: StoreOptions, min_part_size: u64) -> Self {
        LocalTransport {
            bucket,
            options,
            min_part_size,
        }
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn initiate_multipart(&self, key: &ObjectKey) -> TransportResult<String> {
        let upload_id = self.bucket.create_upload(key)?;
        debug!(%key, %upload_id, "initiated multipart upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> TransportResult<String> {
        debug!(upload_id, part_number, size = data.len(), "upload part");
        Ok(self.bucket.put_part(upload_id, part_number, data)?)
    }

    async fn copy_part(
        &self,
        upload_id: &str,
        part_number: u32,
        source: &CopySource,
    ) -> TransportResult<String> {
        debug!(
            upload_id,
            part_number,
            source = %source.key,
            range = %source.range_header(),
            "copy part"
        );
        Ok(self.bucket.copy_part(upload_id, part_number, source)?)
    }

    async fn complete_multipart(
        &self,
        upload_id: &str,
        receipts: &[ETagReceipt],
    ) -> TransportResult<ObjectMeta> {
        let meta =
            self.bucket
                .complete_upload(upload_id, receipts, self.min_part_size, &self.options)?;
        debug!(upload_id, parts = receipts.len(), size = meta.size, "completed multipart upload");
        Ok(meta)
    }

    async fn abort_multipart(&self, upload_id: &str) -> TransportResult<()> {
        debug!(upload_id, "abort multipart upload");
        Ok(self.bucket.abort_upload(upload_id)?)
    }

    async fn put_object(&self, key: &ObjectKey, data: &[u8]) -> TransportResult<ObjectMeta> {
        debug!(%key, size = data.len(), "put object");
        Ok(self.bucket.put_object(key, data, &self.options)?)
    }
}

//! Bucket over a fjall partition: whole objects plus in-progress multipart
//! uploads and their parts

use fjall::{Partition, PartitionCreateOptions};
use ossfs_core::{ContentHash, CopySource, ETagReceipt, ObjectKey, ObjectMeta, StoreOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

use crate::{Result, StoreEngine, StoreError};

/// Largest part number OSS accepts
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Stored object metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub size: u64,
    pub etag: String,
    pub acl: String,
    pub sse: Option<String>,
    /// Signing scheme the writing mount was configured with
    #[serde(default)]
    pub signature: String,
    pub created_at: SystemTime,
}

/// An initiated, not yet completed multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: String,
    pub key: ObjectKey,
    pub initiated_at: SystemTime,
}

/// A named bucket of objects
#[derive(Clone)]
pub struct Bucket {
    name: String,
    partition: Arc<Partition>,
    engine: StoreEngine,
}

impl Bucket {
    /// Create or open bucket
    pub(crate) fn new(engine: StoreEngine, name: &str) -> Result<Self> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(StoreError::InvalidBucketName(name.to_string()));
        }

        let partition = Arc::new(
            engine
                .keyspace()
                .open_partition(&format!("{}_main", name), PartitionCreateOptions::default())?,
        );

        Ok(Bucket {
            name: name.to_string(),
            partition,
            engine,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a whole object in one write
    pub fn put_object(&self, key: &ObjectKey, data: &[u8], options: &StoreOptions) -> Result<ObjectMeta> {
        let etag = ContentHash::new(data).to_hex();
        self.write_object(key, data, etag, options)
    }

    /// Get object bytes
    pub fn get_object(&self, key: &ObjectKey) -> Result<Option<Vec<u8>>> {
        Ok(self.partition.get(self.data_key(key))?.map(|data| data.to_vec()))
    }

    /// Get stored object metadata
    pub fn get_record(&self, key: &ObjectKey) -> Result<Option<ObjectRecord>> {
        match self.partition.get(self.meta_key(key))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn head_object(&self, key: &ObjectKey) -> Result<Option<ObjectMeta>> {
        Ok(self.get_record(key)?.map(|record| ObjectMeta {
            key: key.clone(),
            size: record.size,
            etag: record.etag,
        }))
    }

    /// Read `len` bytes at `offset` of a stored object
    pub fn read_range(&self, key: &ObjectKey, offset: u64, len: u64) -> Result<Vec<u8>> {
        let data = self
            .partition
            .get(self.data_key(key))?
            .ok_or_else(|| StoreError::ObjectNotFound { key: key.to_string() })?;

        let size = data.len() as u64;
        let end = offset.checked_add(len).filter(|end| len > 0 && *end <= size);
        match end {
            Some(end) => Ok(data[offset as usize..end as usize].to_vec()),
            None => Err(StoreError::InvalidRange { offset, len, size }),
        }
    }

    pub fn delete_object(&self, key: &ObjectKey) -> Result<()> {
        self.partition.remove(self.meta_key(key))?;
        self.partition.remove(self.data_key(key))?;
        self.engine.persist()
    }

    /// Start a multipart upload
    pub fn create_upload(&self, key: &ObjectKey) -> Result<String> {
        let upload_id = ulid::Ulid::new().to_string();
        let record = UploadRecord {
            upload_id: upload_id.clone(),
            key: key.clone(),
            initiated_at: SystemTime::now(),
        };

        self.partition
            .insert(self.upload_key(&upload_id), serde_json::to_vec(&record)?)?;
        self.engine.persist()?;

        Ok(upload_id)
    }

    /// Store one part and return its ETag. Re-uploading a part number replaces it.
    pub fn put_part(&self, upload_id: &str, part_number: u32, data: &[u8]) -> Result<String> {
        self.upload_record(upload_id)?;

        if part_number == 0 || part_number > MAX_PART_NUMBER {
            return Err(StoreError::InvalidPart {
                part_number,
                reason: format!("part number must be within 1..={}", MAX_PART_NUMBER),
            });
        }

        self.partition.insert(self.part_key(upload_id, part_number), data)?;
        Ok(ContentHash::new(data).to_hex())
    }

    /// Fill a part from a range of a stored object
    pub fn copy_part(&self, upload_id: &str, part_number: u32, source: &CopySource) -> Result<String> {
        let data = self.read_range(&source.key, source.offset, source.len)?;
        self.put_part(upload_id, part_number, &data)
    }

    /// Assemble the object from the listed parts.
    ///
    /// Parts must be listed in ascending order, match their stored ETags, and
    /// all but the last must hold at least `min_part_size` bytes.
    pub fn complete_upload(
        &self,
        upload_id: &str,
        receipts: &[ETagReceipt],
        min_part_size: u64,
        options: &StoreOptions,
    ) -> Result<ObjectMeta> {
        let upload = self.upload_record(upload_id)?;

        if receipts.is_empty() {
            return Err(StoreError::InvalidPart {
                part_number: 0,
                reason: "no parts listed".to_string(),
            });
        }

        let mut data = Vec::new();
        let mut previous = 0;
        for (i, receipt) in receipts.iter().enumerate() {
            let part_number = receipt.part_number;
            if part_number <= previous {
                return Err(StoreError::InvalidPart {
                    part_number,
                    reason: "parts out of order".to_string(),
                });
            }
            previous = part_number;

            let part = self
                .partition
                .get(self.part_key(upload_id, part_number))?
                .ok_or_else(|| StoreError::InvalidPart {
                    part_number,
                    reason: "part was not uploaded".to_string(),
                })?;

            if ContentHash::new(&part).to_hex() != receipt.etag {
                return Err(StoreError::InvalidPart {
                    part_number,
                    reason: "etag mismatch".to_string(),
                });
            }

            if i + 1 < receipts.len() && (part.len() as u64) < min_part_size {
                return Err(StoreError::PartTooSmall { part_number });
            }

            data.extend_from_slice(&part);
        }

        let etag = format!(
            "{}-{}",
            ContentHash::of_parts(receipts.iter().map(|r| r.etag.as_str())).to_hex(),
            receipts.len()
        );
        let meta = self.write_object(&upload.key, &data, etag, options)?;
        self.drop_upload(upload_id)?;

        Ok(meta)
    }

    /// Discard an upload and every part stored for it
    pub fn abort_upload(&self, upload_id: &str) -> Result<()> {
        self.upload_record(upload_id)?;
        self.drop_upload(upload_id)
    }

    /// Uploads that were initiated and neither completed nor aborted
    pub fn list_uploads(&self) -> Result<Vec<UploadRecord>> {
        let mut uploads = Vec::new();
        for key in self.keys_with_prefix(b"upload:")? {
            if let Some(raw) = self.partition.get(&key)? {
                uploads.push(serde_json::from_slice(&raw)?);
            }
        }
        Ok(uploads)
    }

    /// Part numbers stored for an upload, ascending
    pub fn list_parts(&self, upload_id: &str) -> Result<Vec<u32>> {
        self.upload_record(upload_id)?;

        let prefix = self.part_prefix(upload_id);
        let mut parts = Vec::new();
        for key in self.keys_with_prefix(&prefix)? {
            let number = std::str::from_utf8(&key[prefix.len()..])
                .ok()
                .and_then(|s| s.parse().ok());
            if let Some(number) = number {
                parts.push(number);
            }
        }
        Ok(parts)
    }

    // Private helper methods

    fn write_object(&self, key: &ObjectKey, data: &[u8], etag: String, options: &StoreOptions) -> Result<ObjectMeta> {
        let record = ObjectRecord {
            size: data.len() as u64,
            etag,
            acl: options.acl.as_str().to_string(),
            sse: options.sse.header_value().map(str::to_string),
            signature: options.signature.as_str().to_string(),
            created_at: SystemTime::now(),
        };

        self.partition.insert(self.data_key(key), data)?;
        self.partition
            .insert(self.meta_key(key), serde_json::to_vec(&record)?)?;
        self.engine.persist()?;

        Ok(ObjectMeta {
            key: key.clone(),
            size: record.size,
            etag: record.etag,
        })
    }

    fn upload_record(&self, upload_id: &str) -> Result<UploadRecord> {
        match self.partition.get(self.upload_key(upload_id))? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(StoreError::UploadNotFound {
                upload_id: upload_id.to_string(),
            }),
        }
    }

    fn drop_upload(&self, upload_id: &str) -> Result<()> {
        for key in self.keys_with_prefix(&self.part_prefix(upload_id))? {
            self.partition.remove(key)?;
        }
        self.partition.remove(self.upload_key(upload_id))?;
        self.engine.persist()
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for item in self.partition.range(prefix.to_vec()..) {
            let (key, _value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn meta_key(&self, key: &ObjectKey) -> Vec<u8> {
        format!("meta:{}", key.as_str()).into_bytes()
    }

    fn data_key(&self, key: &ObjectKey) -> Vec<u8> {
        format!("data:{}", key.as_str()).into_bytes()
    }

    fn upload_key(&self, upload_id: &str) -> Vec<u8> {
        format!("upload:{}", upload_id).into_bytes()
    }

    fn part_prefix(&self, upload_id: &str) -> Vec<u8> {
        format!("part:{}:", upload_id).into_bytes()
    }

    fn part_key(&self, upload_id: &str, part_number: u32) -> Vec<u8> {
        format!("part:{}:{:05}", upload_id, part_number).into_bytes()
    }
}

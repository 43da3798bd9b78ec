//! Flush entry point: single PUT or multipart, per file size and plan

use ossfs_core::{
    bind_all, bytes_by_kind, plan, ByteSource, ObjectKey, ObjectMeta, PlanError, PlannedPart,
    ReadAt, Transport, UntreatedRange, UploadConfig,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::coordinator::{AbortHandle, CoordinatorConfig};
use crate::registry::SessionRegistry;
use crate::session::MultipartSession;
use crate::{ClientError, Result};

/// What to persist for one object
pub struct FlushRequest<'a> {
    pub key: &'a ObjectKey,
    /// Local bytes of the whole file
    pub source: &'a dyn ReadAt,
    pub file_size: u64,
    pub untreated: &'a [UntreatedRange],
    /// Whether the store already holds this object, so that clean bytes
    /// may be copied from it
    pub persisted: bool,
    pub abort: Option<AbortHandle>,
}

/// Persists dirty files to the store
pub struct Uploader {
    transport: Arc<dyn Transport>,
    config: UploadConfig,
    registry: SessionRegistry,
}

impl Uploader {
    pub fn new(transport: Arc<dyn Transport>, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Uploader {
            transport,
            config,
            registry: SessionRegistry::new(),
        })
    }

    /// Share leases with other uploaders of the same mount
    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Persist a file. Waits for any other flush of the same key first.
    pub async fn flush(&self, request: FlushRequest<'_>) -> Result<ObjectMeta> {
        let key = request.key;
        let _lease = self.registry.acquire(key).await;

        if request.file_size < self.config.multipart_threshold {
            return self.put_whole(key, request.source, request.file_size).await;
        }

        let mut limits = self.config.part_limits();
        limits.allow_copy &= request.persisted;

        let parts = match plan(request.file_size, request.untreated, &limits) {
            Ok(parts) => parts,
            Err(PlanError::TooManyParts { needed, max })
                if request.file_size <= self.config.max_single_put_size =>
            {
                warn!(%key, needed, max, "too many parts, falling back to single put");
                return self.put_whole(key, request.source, request.file_size).await;
            }
            Err(e) => return Err(e.into()),
        };

        self.run_session(key, &parts, ByteSource::File(request.source), request.abort)
            .await
    }

    /// Persist an in-memory object
    pub async fn upload_buffer(&self, key: &ObjectKey, data: &[u8]) -> Result<ObjectMeta> {
        let _lease = self.registry.acquire(key).await;
        let size = data.len() as u64;

        if size < self.config.multipart_threshold {
            return self.put(key, data).await;
        }

        let mut limits = self.config.part_limits();
        limits.allow_copy = false;

        let parts = match plan(size, &[], &limits) {
            Ok(parts) => parts,
            Err(PlanError::TooManyParts { .. }) if size <= self.config.max_single_put_size => {
                return self.put(key, data).await;
            }
            Err(e) => return Err(e.into()),
        };

        self.run_session(key, &parts, ByteSource::Buffer(data), None).await
    }

    async fn run_session(
        &self,
        key: &ObjectKey,
        parts: &[PlannedPart],
        source: ByteSource<'_>,
        abort: Option<AbortHandle>,
    ) -> Result<ObjectMeta> {
        let (fresh_bytes, copied_bytes) = bytes_by_kind(parts);
        info!(%key, parts = parts.len(), fresh_bytes, copied_bytes, "multipart flush");

        let jobs = bind_all(parts, source, key);
        let mut session = MultipartSession::new(
            key.clone(),
            self.transport.clone(),
            CoordinatorConfig::from(&self.config),
        );
        if let Some(abort) = abort {
            session = session.with_abort_handle(abort);
        }

        Ok(session.execute(&jobs).await?)
    }

    async fn put_whole(&self, key: &ObjectKey, source: &dyn ReadAt, size: u64) -> Result<ObjectMeta> {
        if size > self.config.max_single_put_size {
            return Err(ClientError::Config(format!(
                "{} bytes exceeds the single put limit of {}",
                size, self.config.max_single_put_size
            )));
        }

        let len = usize::try_from(size)
            .map_err(|_| ClientError::Config(format!("{} bytes does not fit in memory", size)))?;
        let mut data = vec![0u8; len];
        source.read_exact_at(&mut data, 0)?;
        self.put(key, &data).await
    }

    async fn put(&self, key: &ObjectKey, data: &[u8]) -> Result<ObjectMeta> {
        info!(%key, size = data.len(), "single put flush");
        let transport = &self.transport;
        let retry = CoordinatorConfig::from(&self.config).retry;
        Ok(retry.run("put_object", || transport.put_object(key, data)).await?)
    }
}

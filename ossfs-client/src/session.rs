//! Multipart transaction state machine

use ossfs_core::{ETagReceipt, ObjectKey, ObjectMeta, PartJob, Transport};
use std::sync::Arc;
use tracing::{info, warn};

use crate::coordinator::{AbortHandle, CoordinatorConfig, PartUploadCoordinator};
use crate::SessionError;

/// Where a session is in its lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initiated,
    Uploading,
    Completing,
    Completed,
    Aborting,
    Aborted,
}

impl SessionState {
    pub fn can_move_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Initiated)
                | (Initiated, Uploading)
                | (Uploading, Completing)
                | (Completing, Completed)
                | (Initiated | Uploading | Completing, Aborting)
                | (Aborting, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

/// One multipart upload of one object
pub struct MultipartSession {
    key: ObjectKey,
    transport: Arc<dyn Transport>,
    coordinator: PartUploadCoordinator,
    state: SessionState,
    upload_id: Option<String>,
    receipts: Vec<ETagReceipt>,
}

impl MultipartSession {
    pub fn new(key: ObjectKey, transport: Arc<dyn Transport>, config: CoordinatorConfig) -> Self {
        let coordinator = PartUploadCoordinator::new(transport.clone(), config);
        MultipartSession {
            key,
            transport,
            coordinator,
            state: SessionState::Idle,
            upload_id: None,
            receipts: Vec::new(),
        }
    }

    /// Cancel through an externally owned handle
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.coordinator = self.coordinator.with_abort_handle(abort);
        self
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn receipts(&self) -> &[ETagReceipt] {
        &self.receipts
    }

    /// Handle that cancels the part uploads from another task
    pub fn abort_handle(&self) -> AbortHandle {
        self.coordinator.abort_handle()
    }

    /// Start the upload with the store
    pub async fn begin(&mut self) -> Result<&str, SessionError> {
        self.check(SessionState::Initiated)?;

        let upload_id = self
            .transport
            .initiate_multipart(&self.key)
            .await
            .map_err(SessionError::InitFailed)?;

        info!(key = %self.key, %upload_id, "multipart session started");
        self.state = SessionState::Initiated;
        Ok(self.upload_id.insert(upload_id).as_str())
    }

    /// Upload every job; receipts are kept for [`finalize`](Self::finalize).
    pub async fn upload(&mut self, jobs: &[PartJob<'_>]) -> Result<(), SessionError> {
        self.check(SessionState::Uploading)?;
        let Some(upload_id) = self.upload_id.as_deref() else {
            return Err(self.invalid(SessionState::Uploading));
        };
        self.state = SessionState::Uploading;

        self.receipts = self.coordinator.run(upload_id, jobs).await?;
        Ok(())
    }

    /// Submit the receipts in part-number order and assemble the object
    pub async fn finalize(&mut self) -> Result<ObjectMeta, SessionError> {
        self.check(SessionState::Completing)?;
        let Some(upload_id) = self.upload_id.as_deref() else {
            return Err(self.invalid(SessionState::Completing));
        };
        self.state = SessionState::Completing;

        let transport = &self.transport;
        let receipts = &self.receipts;
        let meta = self
            .coordinator
            .config()
            .retry
            .run("complete_multipart", || transport.complete_multipart(upload_id, receipts))
            .await
            .map_err(SessionError::CompleteFailed)?;

        info!(key = %self.key, upload_id, parts = receipts.len(), size = meta.size, "multipart session completed");
        self.state = SessionState::Completed;
        Ok(meta)
    }

    /// Discard the upload with the store. Ends in `Aborted` even when the
    /// store rejects the request.
    pub async fn abort(&mut self) -> Result<(), SessionError> {
        self.check(SessionState::Aborting)?;
        let Some(upload_id) = self.upload_id.clone() else {
            return Err(self.invalid(SessionState::Aborting));
        };
        self.state = SessionState::Aborting;
        self.coordinator.abort_handle().abort();

        let result = self.transport.abort_multipart(&upload_id).await;
        self.state = SessionState::Aborted;

        result.map_err(|cause| SessionError::AbortFailed { upload_id, cause })
    }

    /// Run the whole transaction. On failure the upload is aborted and the
    /// first error is returned.
    pub async fn execute(&mut self, jobs: &[PartJob<'_>]) -> Result<ObjectMeta, SessionError> {
        self.begin().await?;

        let result = match self.upload(jobs).await {
            Ok(()) => self.finalize().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(meta) => Ok(meta),
            Err(e) => {
                warn!(key = %self.key, error = %e, "multipart session failed, aborting");
                if let Err(abort_err) = self.abort().await {
                    warn!(key = %self.key, error = %abort_err, "abort failed");
                }
                Err(e)
            }
        }
    }

    fn check(&self, next: SessionState) -> Result<(), SessionError> {
        if self.state.can_move_to(next) {
            Ok(())
        } else {
            Err(self.invalid(next))
        }
    }

    fn invalid(&self, next: SessionState) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state,
            to: next,
        }
    }
}

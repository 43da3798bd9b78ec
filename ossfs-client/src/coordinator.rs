//! Bounded-concurrency execution of part jobs
//!
//! Jobs are dispatched in part-number order onto at most `concurrency_limit`
//! concurrent requests. Transient transport failures are retried with
//! exponential backoff; anything else fails the whole run, dropping requests
//! still in flight and never starting the ones still queued.

use futures::stream::{self, StreamExt};
use ossfs_core::{CopySource, ETagReceipt, PartJob, PartSource, Transport, TransportError, UploadConfig};
use rand::Rng;
use std::borrow::Cow;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, debug_span, warn, Instrument};

use crate::UploadError;

/// Upper bound on a single retry delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How transient failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retry_limit: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut retries = self.retry_limit;
        let mut backoff = self.backoff;

        loop {
            match attempt().await {
                Err(e) if e.retryable() && retries > 0 => {
                    retries -= 1;
                    let delay = jittered(backoff);
                    warn!(
                        operation,
                        error = %e,
                        retries_left = retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    backoff = backoff.saturating_mul(2).min(self.max_backoff);
                }
                result => return result,
            }
        }
    }
}

/// Adds up to half of `base` on top of it
fn jittered(base: Duration) -> Duration {
    let spread = base.as_millis() as u64 / 2;
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    pub part_timeout: Duration,
}

impl From<&UploadConfig> for CoordinatorConfig {
    fn from(config: &UploadConfig) -> Self {
        CoordinatorConfig {
            concurrency_limit: config.concurrency_limit as usize,
            retry: RetryPolicy {
                retry_limit: config.retry_limit,
                backoff: config.retry_backoff(),
                max_backoff: MAX_BACKOFF,
            },
            part_timeout: config.part_timeout(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig::from(&UploadConfig::default())
    }
}

/// Cancels a running upload from another task
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        AbortHandle { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `abort` has been called
    async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of one part within a run
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    Pending = 0,
    InFlight = 1,
    Done = 2,
    Failed = 3,
}

impl PartState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PartState::Pending,
            1 => PartState::InFlight,
            2 => PartState::Done,
            _ => PartState::Failed,
        }
    }
}

/// Per-job state, indexed like the job slice
struct Ledger {
    states: Vec<AtomicU8>,
}

impl Ledger {
    fn new(len: usize) -> Self {
        Ledger {
            states: (0..len).map(|_| AtomicU8::new(PartState::Pending as u8)).collect(),
        }
    }

    /// Move slot `idx` from `from` to `to`; false if it was not in `from`
    fn advance(&self, idx: usize, from: PartState, to: PartState) -> bool {
        self.states[idx]
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn snapshot(&self) -> Vec<PartState> {
        self.states
            .iter()
            .map(|s| PartState::from_u8(s.load(Ordering::Acquire)))
            .collect()
    }
}

enum Payload<'a> {
    Bytes(Cow<'a, [u8]>),
    Copy(&'a CopySource),
}

/// Runs the part jobs of one multipart upload
pub struct PartUploadCoordinator {
    transport: Arc<dyn Transport>,
    config: CoordinatorConfig,
    abort: AbortHandle,
}

impl PartUploadCoordinator {
    pub fn new(transport: Arc<dyn Transport>, config: CoordinatorConfig) -> Self {
        PartUploadCoordinator {
            transport,
            config,
            abort: AbortHandle::new(),
        }
    }

    /// Share an existing cancel signal instead of a private one
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Upload every job and return one receipt per job, sorted by part number.
    pub async fn run(&self, upload_id: &str, jobs: &[PartJob<'_>]) -> Result<Vec<ETagReceipt>, UploadError> {
        self.run_with_states(upload_id, jobs).await.0
    }

    /// Like [`run`](Self::run), also reporting where each job ended up.
    pub async fn run_with_states(
        &self,
        upload_id: &str,
        jobs: &[PartJob<'_>],
    ) -> (Result<Vec<ETagReceipt>, UploadError>, Vec<PartState>) {
        let ledger = Ledger::new(jobs.len());
        let result = self.drive(upload_id, jobs, &ledger).await;
        (result, ledger.snapshot())
    }

    async fn drive(&self, upload_id: &str, jobs: &[PartJob<'_>], ledger: &Ledger) -> Result<Vec<ETagReceipt>, UploadError> {
        if self.abort.is_aborted() {
            return Err(UploadError::Cancelled);
        }

        let mut order: Vec<usize> = (0..jobs.len()).collect();
        order.sort_by_key(|&idx| jobs[idx].part_number);

        let mut uploads = pin!(stream::iter(order)
            .map(|idx| {
                let job = &jobs[idx];
                self.upload_one(upload_id, job, idx, ledger)
                    .instrument(debug_span!("part", part_number = job.part_number))
            })
            .buffer_unordered(self.config.concurrency_limit.max(1)));
        let mut aborted = pin!(self.abort.aborted());

        let mut receipts = Vec::with_capacity(jobs.len());
        loop {
            tokio::select! {
                biased;
                _ = &mut aborted => {
                    debug!(upload_id, completed = receipts.len(), "part uploads cancelled");
                    return Err(UploadError::Cancelled);
                }
                next = uploads.next() => match next {
                    Some(Ok(receipt)) => receipts.push(receipt),
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
            }
        }

        receipts.sort_by_key(|r| r.part_number);
        Ok(receipts)
    }

    async fn upload_one(
        &self,
        upload_id: &str,
        job: &PartJob<'_>,
        slot: usize,
        ledger: &Ledger,
    ) -> Result<ETagReceipt, UploadError> {
        let part_number = job.part_number;
        let claimed = ledger.advance(slot, PartState::Pending, PartState::InFlight);
        debug_assert!(claimed, "part {} dispatched twice", part_number);

        let payload = match &job.source {
            PartSource::Copy(source) => Payload::Copy(source),
            _ => match job.read() {
                Ok(bytes) => Payload::Bytes(bytes),
                Err(e) => {
                    ledger.advance(slot, PartState::InFlight, PartState::Failed);
                    return Err(UploadError::Source {
                        part_number,
                        message: e.to_string(),
                    });
                }
            },
        };

        let transport = &self.transport;
        let payload = &payload;
        let part_timeout = self.config.part_timeout;
        let result = self
            .config
            .retry
            .run("upload_part", move || {
                let request = match payload {
                    Payload::Bytes(bytes) => transport.upload_part(upload_id, part_number, bytes),
                    Payload::Copy(source) => transport.copy_part(upload_id, part_number, source),
                };
                async move {
                    match tokio::time::timeout(part_timeout, request).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout),
                    }
                }
            })
            .await;

        match result {
            Ok(etag) => {
                ledger.advance(slot, PartState::InFlight, PartState::Done);
                debug!(upload_id, part_number, size = job.size, copy = job.is_server_side_copy(), "part done");
                Ok(ETagReceipt::new(part_number, etag))
            }
            Err(cause) => {
                ledger.advance(slot, PartState::InFlight, PartState::Failed);
                warn!(upload_id, part_number, error = %cause, "part failed");
                Err(UploadError::PartFailed { part_number, cause })
            }
        }
    }
}

//! Instrumented in-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ossfs_core::*;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One accepted part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPart {
    Upload { size: usize },
    Copy(CopySource),
}

/// Records every call and can be scripted to fail specific parts
#[derive(Default)]
pub struct MockTransport {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    open_sessions: AtomicUsize,
    max_open_sessions: AtomicUsize,
    next_upload: AtomicUsize,
    scripted: Mutex<HashMap<u32, VecDeque<TransportError>>>,
    attempts: Mutex<HashMap<u32, u32>>,
    accepted: Mutex<HashMap<u32, u32>>,
    parts: Mutex<BTreeMap<u32, StoredPart>>,
    completed: Mutex<Vec<Vec<ETagReceipt>>>,
    aborted: Mutex<Vec<String>>,
    puts: Mutex<Vec<(ObjectKey, usize)>>,
    fail_initiate: Option<TransportError>,
    fail_complete: Option<TransportError>,
    fail_abort: Option<TransportError>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        InFlight(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every part request takes at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next attempts of `part_number` with `errors`, in order
    pub fn fail_part(self, part_number: u32, errors: Vec<TransportError>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(part_number, errors.into());
        self
    }

    pub fn fail_initiate(mut self, error: TransportError) -> Self {
        self.fail_initiate = Some(error);
        self
    }

    pub fn fail_complete(mut self, error: TransportError) -> Self {
        self.fail_complete = Some(error);
        self
    }

    pub fn fail_abort(mut self, error: TransportError) -> Self {
        self.fail_abort = Some(error);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_open_sessions(&self) -> usize {
        self.max_open_sessions.load(Ordering::SeqCst)
    }

    pub fn attempts(&self, part_number: u32) -> u32 {
        self.attempts.lock().unwrap().get(&part_number).copied().unwrap_or(0)
    }

    /// Successful requests per part number
    pub fn accepted(&self, part_number: u32) -> u32 {
        self.accepted.lock().unwrap().get(&part_number).copied().unwrap_or(0)
    }

    pub fn parts(&self) -> BTreeMap<u32, StoredPart> {
        self.parts.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<Vec<ETagReceipt>> {
        self.completed.lock().unwrap().clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<(ObjectKey, usize)> {
        self.puts.lock().unwrap().clone()
    }

    async fn part_request(&self, part_number: u32, part: StoredPart) -> TransportResult<String> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        *self.attempts.lock().unwrap().entry(part_number).or_default() += 1;

        tokio::time::sleep(self.delay).await;

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&part_number)
            .and_then(|errors| errors.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        *self.accepted.lock().unwrap().entry(part_number).or_default() += 1;
        self.parts.lock().unwrap().insert(part_number, part);
        Ok(format!("etag-{}", part_number))
    }

    fn close_session(&self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn initiate_multipart(&self, _key: &ObjectKey) -> TransportResult<String> {
        if let Some(error) = &self.fail_initiate {
            return Err(error.clone());
        }
        let now = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_sessions.fetch_max(now, Ordering::SeqCst);
        let id = self.next_upload.fetch_add(1, Ordering::SeqCst);
        // Let a competing flush run if nothing serializes it
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(format!("upload-{}", id))
    }

    async fn upload_part(&self, _upload_id: &str, part_number: u32, data: &[u8]) -> TransportResult<String> {
        self.part_request(part_number, StoredPart::Upload { size: data.len() })
            .await
    }

    async fn copy_part(&self, _upload_id: &str, part_number: u32, source: &CopySource) -> TransportResult<String> {
        self.part_request(part_number, StoredPart::Copy(source.clone()))
            .await
    }

    async fn complete_multipart(&self, _upload_id: &str, receipts: &[ETagReceipt]) -> TransportResult<ObjectMeta> {
        if let Some(error) = &self.fail_complete {
            return Err(error.clone());
        }
        self.completed.lock().unwrap().push(receipts.to_vec());
        self.close_session();

        let parts = self.parts.lock().unwrap();
        let size = receipts
            .iter()
            .filter_map(|r| parts.get(&r.part_number))
            .map(|p| match p {
                StoredPart::Upload { size } => *size as u64,
                StoredPart::Copy(source) => source.len,
            })
            .sum();
        Ok(ObjectMeta {
            key: ObjectKey::new("mock").unwrap(),
            size,
            etag: format!("mock-{}", receipts.len()),
        })
    }

    async fn abort_multipart(&self, upload_id: &str) -> TransportResult<()> {
        self.aborted.lock().unwrap().push(upload_id.to_string());
        self.close_session();
        match &self.fail_abort {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn put_object(&self, key: &ObjectKey, data: &[u8]) -> TransportResult<ObjectMeta> {
        self.puts.lock().unwrap().push((key.clone(), data.len()));
        Ok(ObjectMeta {
            key: key.clone(),
            size: data.len() as u64,
            etag: "put".to_string(),
        })
    }
}

/// Upload tuning with tiny parts and fast retries
pub fn small_config(min_part_size: u64, max_part_size: u64) -> UploadConfig {
    UploadConfig {
        min_part_size,
        max_part_size,
        retry_backoff_ms: 1,
        multipart_threshold: 1,
        ..Default::default()
    }
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(name).unwrap()
}

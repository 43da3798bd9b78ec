//! Open file handle: cache file, untreated ranges and size under one lock

use ossfs_core::{ObjectKey, ObjectMeta, PlanError, UntreatedRange};
use ossfs_engine::CacheFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::uploader::{FlushRequest, Uploader};
use crate::Result;

struct FileState {
    cache: CacheFile,
    tracker: ossfs_core::UntreatedTracker,
    size: u64,
    /// Size of the object in the store, if it exists there
    remote_size: Option<u64>,
    generation: u64,
}

impl FileState {
    fn next_tag(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn is_dirty(&self) -> bool {
        !self.tracker.is_empty() || self.remote_size != Some(self.size)
    }
}

/// A file opened for writing.
///
/// Writes land in the cache file and are recorded as untreated ranges. Every
/// byte outside those ranges matches the stored object, so a flush can copy
/// it server-side instead of re-uploading it.
pub struct OpenFile {
    key: ObjectKey,
    state: Mutex<FileState>,
}

impl OpenFile {
    /// A file with no stored object behind it yet
    pub fn create(key: ObjectKey, cache: CacheFile) -> Self {
        Self::with_state(key, cache, 0, None)
    }

    /// A file whose cache already holds the `size` stored bytes
    pub fn open_existing(key: ObjectKey, cache: CacheFile, size: u64) -> Self {
        Self::with_state(key, cache, size, Some(size))
    }

    fn with_state(key: ObjectKey, cache: CacheFile, size: u64, remote_size: Option<u64>) -> Self {
        OpenFile {
            key,
            state: Mutex::new(FileState {
                cache,
                tracker: ossfs_core::UntreatedTracker::new(),
                size,
                remote_size,
                generation: 0,
            }),
        }
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub async fn size(&self) -> u64 {
        self.state.lock().await.size
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.is_dirty()
    }

    /// Untreated ranges in offset order
    pub async fn untreated(&self) -> Vec<UntreatedRange> {
        self.state.lock().await.tracker.list().to_vec()
    }

    /// Write `data` at `offset`. A write past the end also dirties the gap.
    pub async fn write(&self, offset: i64, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let len = i64::try_from(data.len()).map_err(|_| PlanError::InvalidRange {
            start: offset,
            size: -1,
        })?;
        // Reject before touching the cache
        let range = UntreatedRange::new(offset, len, 0)?;

        let mut state = self.state.lock().await;
        state.cache.write_at(data, range.start)?;

        let tag = state.next_tag();
        let size = state.size;
        if range.start > size {
            state.tracker.add(size as i64, (range.start - size) as i64, tag)?;
        }
        state.tracker.add(offset, len, tag)?;
        state.size = size.max(range.end());

        Ok(data.len())
    }

    /// Read up to `len` bytes at `offset`, stopping at end of file
    pub async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        let available = state.size.saturating_sub(offset).min(len as u64) as usize;
        let mut buf = vec![0u8; available];
        if available > 0 {
            state.cache.read_at(&mut buf, offset)?;
        }
        Ok(buf)
    }

    /// Resize the file. Growth dirties the new zero-filled region.
    pub async fn truncate(&self, size: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.cache.set_len(size)?;

        let old = state.size;
        if size < old {
            state.tracker.truncate(size);
        } else if size > old {
            let tag = state.next_tag();
            state.tracker.add(old as i64, (size - old) as i64, tag)?;
        }
        state.size = size;
        Ok(())
    }

    /// Persist the file if it changed since the last flush.
    ///
    /// The handle stays locked until the upload reaches a terminal state, so
    /// the cache bytes the parts read cannot change underneath them. On
    /// failure the untreated ranges are kept for the next attempt.
    pub async fn flush(&self, uploader: &Uploader) -> Result<Option<ObjectMeta>> {
        let mut state = self.state.lock().await;
        if !state.is_dirty() {
            return Ok(None);
        }

        let untreated = state.tracker.list().to_vec();
        debug!(key = %self.key, size = state.size, ranges = untreated.len(), "flushing open file");

        let meta = uploader
            .flush(FlushRequest {
                key: &self.key,
                source: &state.cache,
                file_size: state.size,
                untreated: &untreated,
                persisted: state.remote_size.is_some(),
                abort: None,
            })
            .await?;

        state.tracker.clear_all();
        state.remote_size = Some(state.size);
        Ok(Some(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;

    fn file() -> OpenFile {
        OpenFile::create(ObjectKey::new("f").unwrap(), CacheFile::temp().unwrap())
    }

    #[tokio::test]
    async fn test_write_past_end_dirties_gap() {
        let file = file();
        file.write(0, b"abc").await.unwrap();
        file.write(10, b"xyz").await.unwrap();

        assert_eq!(file.size().await, 13);
        let ranges = file.untreated().await;
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].size), (0, 13));
    }

    #[tokio::test]
    async fn test_negative_offset_is_einval() {
        let file = file();
        let err = file.write(-1, b"x").await.unwrap_err();
        assert_eq!(err.errno(), libc::EINVAL);
        assert!(matches!(err, ClientError::Plan(PlanError::InvalidRange { .. })));
        assert_eq!(file.size().await, 0);
    }

    #[tokio::test]
    async fn test_truncate_shrinks_ranges_and_grow_marks_dirty() {
        let cache = CacheFile::temp().unwrap();
        cache.write_at(&[7u8; 100], 0).unwrap();
        let file = OpenFile::open_existing(ObjectKey::new("f").unwrap(), cache, 100);
        assert!(!file.is_dirty().await);

        file.write(40, &[1u8; 20]).await.unwrap();
        file.truncate(50).await.unwrap();
        let ranges = file.untreated().await;
        assert_eq!((ranges[0].start, ranges[0].size), (40, 10));

        file.truncate(80).await.unwrap();
        let ranges = file.untreated().await;
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].size), (40, 40));
        assert_eq!(file.read(75, 10).await.unwrap(), vec![0u8; 5]);
    }

    #[tokio::test]
    async fn test_shrink_alone_is_dirty() {
        let cache = CacheFile::temp().unwrap();
        cache.write_at(&[7u8; 100], 0).unwrap();
        let file = OpenFile::open_existing(ObjectKey::new("f").unwrap(), cache, 100);

        file.truncate(60).await.unwrap();
        assert!(file.untreated().await.is_empty());
        assert!(file.is_dirty().await);
    }
}

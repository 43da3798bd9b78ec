//! Replay dirty ranges of a local file into a store

use anyhow::{bail, Context};
use ossfs_client::{AbortHandle, FlushRequest, Uploader};
use ossfs_core::{Config, ObjectKey, ObjectMeta, UntreatedTracker};
use ossfs_engine::{CacheFile, LocalTransport, StoreEngine};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct SyncOptions {
    pub bucket: String,
    pub key: ObjectKey,
    pub file: PathBuf,
    /// `(start, len)` pairs as given on the command line
    pub dirty: Vec<(i64, i64)>,
    pub config: Config,
}

/// Parse `START:LEN`
pub fn parse_range(arg: &str) -> anyhow::Result<(i64, i64)> {
    let Some((start, len)) = arg.split_once(':') else {
        bail!("expected START:LEN, got '{}'", arg);
    };
    let start = start.trim().parse().with_context(|| format!("bad range start in '{}'", arg))?;
    let len = len.trim().parse().with_context(|| format!("bad range length in '{}'", arg))?;
    Ok((start, len))
}

/// Ranges the flush must upload from the local file.
///
/// Everything is dirty when the store has no copy yet, or when no ranges
/// were given. Bytes past the stored object's end are always dirty.
pub fn dirty_ranges(dirty: &[(i64, i64)], file_size: u64, remote_size: Option<u64>) -> anyhow::Result<UntreatedTracker> {
    let mut tracker = UntreatedTracker::new();

    match remote_size {
        Some(remote) if !dirty.is_empty() => {
            for (tag, &(start, len)) in dirty.iter().enumerate() {
                tracker.add(start, len, tag as u64 + 1)?;
            }
            if file_size > remote {
                tracker.add(remote as i64, (file_size - remote) as i64, 0)?;
            }
        }
        _ if file_size > 0 => {
            tracker.add(0, file_size as i64, 0)?;
        }
        _ => {}
    }

    tracker.truncate(file_size);
    Ok(tracker)
}

pub async fn run(engine: &StoreEngine, options: SyncOptions, abort: AbortHandle) -> anyhow::Result<ObjectMeta> {
    let bucket = engine.bucket(&options.bucket)?;
    let remote_size = bucket.head_object(&options.key)?.map(|meta| meta.size);

    let file = File::open(&options.file)
        .with_context(|| format!("opening {}", options.file.display()))?;
    let file_size = file.metadata()?.len();
    let cache = CacheFile::from_file(file);

    let tracker = dirty_ranges(&options.dirty, file_size, remote_size)?;
    info!(
        key = %options.key,
        file_size,
        remote_size,
        dirty_bytes = tracker.total_bytes(),
        ranges = tracker.len(),
        "syncing file"
    );

    let transport = LocalTransport::new(bucket, options.config.store.clone(), options.config.upload.min_part_size);
    let uploader = Uploader::new(Arc::new(transport), options.config.upload.clone())?;

    let meta = uploader
        .flush(FlushRequest {
            key: &options.key,
            source: &cache,
            file_size,
            untreated: tracker.list(),
            persisted: remote_size.is_some(),
            abort: Some(abort),
        })
        .await?;

    engine.persist()?;
    Ok(meta)
}

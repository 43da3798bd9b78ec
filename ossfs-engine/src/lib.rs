//! Local, disk-backed object store with OSS multipart semantics, plus the
//! cache file that backs open files

use fjall::{Config, Keyspace, PersistMode};
use std::path::Path;
use std::sync::Arc;

pub mod bucket;
pub mod cache;
pub mod error;
pub mod transport;

pub use bucket::*;
pub use cache::CacheFile;
pub use error::StoreError;
pub use transport::LocalTransport;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage engine wrapping a fjall keyspace
#[derive(Clone)]
pub struct StoreEngine {
    keyspace: Arc<Keyspace>,
}

impl StoreEngine {
    /// Open or create a store at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let keyspace = Arc::new(Config::new(path).open()?);
        Ok(StoreEngine { keyspace })
    }

    /// Create temporary store for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir().map_err(|e| StoreError::Storage(e.to_string()))?;
        let engine = Self::new(temp_dir.path())?;
        Ok((engine, temp_dir))
    }

    /// Create or open a bucket
    pub fn bucket(&self, name: &str) -> Result<Bucket> {
        Bucket::new(self.clone(), name)
    }

    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

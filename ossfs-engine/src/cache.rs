//! Local cache file holding the full contents of an open object

use ossfs_core::ReadAt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Positional read/write handle over a cache file.
///
/// All access goes through `pread`/`pwrite`, so a shared reference is enough
/// to read part bytes while an upload runs.
#[derive(Debug)]
pub struct CacheFile {
    file: File,
}

impl CacheFile {
    /// Create or truncate a cache file at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(CacheFile { file })
    }

    /// Open an existing cache file, keeping its contents
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(CacheFile { file })
    }

    /// Anonymous cache file, removed when dropped
    pub fn temp() -> io::Result<Self> {
        Ok(CacheFile {
            file: tempfile::tempfile()?,
        })
    }

    pub fn from_file(file: File) -> Self {
        CacheFile { file }
    }

    pub fn write_at(&self, data: &[u8], offset: u64) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        FileExt::read_exact_at(&self.file, buf, offset)
    }

    /// Grow with zeros or shrink to `size` bytes
    pub fn set_len(&self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush file data to disk
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

impl ReadAt for CacheFile {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        FileExt::read_exact_at(&self.file, buf, offset)
    }
}

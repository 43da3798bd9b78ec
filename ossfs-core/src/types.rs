//! Core data types for ossfs

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io;

/// Longest object name OSS accepts, in bytes
pub const MAX_KEY_LEN: usize = 1023;

/// Object key within a bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new key with validation
    pub fn new(key: &str) -> crate::Result<Self> {
        if key.is_empty() {
            return Err(crate::OssfsError::InvalidKey("empty key".to_string()));
        }

        if key.len() > MAX_KEY_LEN {
            return Err(crate::OssfsError::InvalidKey(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }

        // OSS rejects names starting with a slash or backslash
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(crate::OssfsError::InvalidKey(format!(
                "leading separator in '{}'",
                key
            )));
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(crate::OssfsError::InvalidKey(
                "control characters not allowed".to_string(),
            ));
        }

        Ok(ObjectKey(key.to_string()))
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash used as a part or object digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create hash from data using BLAKE3
    pub fn new(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        ContentHash(hash.into())
    }

    /// Hash of a sequence of part digests, in order.
    ///
    /// Mirrors how multipart ETags are derived from their parts rather than
    /// from the assembled bytes.
    pub fn of_parts<'a>(etags: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for etag in etags {
            hasher.update(etag.as_bytes());
        }
        ContentHash(hasher.finalize().into())
    }

    /// Get hash as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Get hash as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Digest the store returned for one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ETagReceipt {
    pub part_number: u32,
    pub etag: String,
}

impl ETagReceipt {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        ETagReceipt {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Object metadata reported by the store after a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: ObjectKey,
    pub size: u64,
    pub etag: String,
}

/// Already-persisted bytes that a part copies server-side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    pub key: ObjectKey,
    pub offset: u64,
    pub len: u64,
}

impl CopySource {
    /// Inclusive byte range in `x-oss-copy-source-range` form
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.offset + self.len - 1)
    }
}

/// Positional reads over a stable local byte source
pub trait ReadAt: Send + Sync {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

impl ReadAt for std::fs::File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }
}

impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "read past end"))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Where fresh part bytes come from
#[derive(Clone, Copy)]
pub enum ByteSource<'a> {
    /// A local file read positionally
    File(&'a dyn ReadAt),
    /// An in-memory buffer holding the whole object
    Buffer(&'a [u8]),
}

/// What a single part uploads
#[derive(Clone)]
pub enum PartSource<'a> {
    File { file: &'a dyn ReadAt, offset: u64 },
    Buffer { data: &'a [u8], cursor: usize },
    Copy(CopySource),
}

impl fmt::Debug for PartSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartSource::File { offset, .. } => f.debug_struct("File").field("offset", offset).finish(),
            PartSource::Buffer { data, cursor } => f
                .debug_struct("Buffer")
                .field("len", &data.len())
                .field("cursor", cursor)
                .finish(),
            PartSource::Copy(source) => f.debug_tuple("Copy").field(source).finish(),
        }
    }
}

/// One unit of upload work. Borrows its byte source.
#[derive(Debug, Clone)]
pub struct PartJob<'a> {
    pub part_number: u32,
    pub size: u64,
    pub source: PartSource<'a>,
}

impl<'a> PartJob<'a> {
    pub fn is_server_side_copy(&self) -> bool {
        matches!(self.source, PartSource::Copy(_))
    }

    /// Materialize the part's bytes. Buffers are borrowed, files are read.
    pub fn read(&self) -> io::Result<Cow<'a, [u8]>> {
        let len = usize::try_from(self.size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "part too large"))?;

        match &self.source {
            PartSource::File { file, offset } => {
                let mut buf = vec![0u8; len];
                file.read_exact_at(&mut buf, *offset)?;
                Ok(Cow::Owned(buf))
            }
            PartSource::Buffer { data, cursor } => {
                let data: &'a [u8] = *data;
                cursor
                    .checked_add(len)
                    .and_then(|end| data.get(*cursor..end))
                    .map(Cow::Borrowed)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "buffer too short"))
            }
            PartSource::Copy(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "copy parts carry no local bytes",
            )),
        }
    }
}

mod hex {
    use std::fmt::Write;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut output, b| {
            let _ = write!(output, "{:02x}", b);
            output
        })
    }
}

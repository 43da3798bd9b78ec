//! Core data models, range tracking and part planning for ossfs

pub mod config;
pub mod error;
pub mod planner;
pub mod transport;
pub mod types;
pub mod untreated;

pub use config::*;
pub use error::*;
pub use planner::{bind_all, bytes_by_kind, plan, PartKind, PartLimits, PlannedPart};
pub use transport::*;
pub use types::*;
pub use untreated::*;

/// Result type alias for ossfs operations
pub type Result<T> = std::result::Result<T, OssfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_creation() {
        let key = ObjectKey::new("photos/2024/a.jpg").unwrap();
        assert_eq!(key.as_str(), "photos/2024/a.jpg");
        assert_eq!(key.to_string(), "photos/2024/a.jpg");
    }

    #[test]
    fn test_object_key_validation() {
        assert!(ObjectKey::new("file").is_ok());
        assert!(ObjectKey::new("dir/sub dir/file").is_ok());

        assert!(ObjectKey::new("").is_err());
        assert!(ObjectKey::new("/absolute").is_err());
        assert!(ObjectKey::new("bad\nname").is_err());
        assert!(ObjectKey::new(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_content_hash_hex() {
        let a = ContentHash::new(b"part data");
        let b = ContentHash::new(b"part data");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert_ne!(ContentHash::of_parts(["a", "b"]), ContentHash::of_parts(["b", "a"]));
    }

    #[test]
    fn test_file_source_reads_positionally() {
        use std::io::Write;

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();

        let job = PartJob {
            part_number: 1,
            size: 4,
            source: PartSource::File { file: &file, offset: 3 },
        };
        assert_eq!(&*job.read().unwrap(), b"3456");

        let short = PartJob {
            part_number: 2,
            size: 20,
            source: PartSource::File { file: &file, offset: 0 },
        };
        assert!(short.read().is_err());
    }
}

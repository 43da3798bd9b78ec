//! Upload tuning and store-facing option values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{OssfsError, PartLimits};

const MB: u64 = 1024 * 1024;

/// Tuning knobs for planning and running multipart uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub min_part_size: u64,
    pub max_part_size: u64,
    pub max_parts: u32,
    /// Parts in flight at once
    pub concurrency_limit: u32,
    /// Retries after the first attempt for transient failures
    pub retry_limit: u32,
    /// First retry delay; doubles on each further retry
    pub retry_backoff_ms: u64,
    pub part_timeout_ms: u64,
    /// Files below this size are written with a single PUT
    pub multipart_threshold: u64,
    /// Largest object a single PUT may carry
    pub max_single_put_size: u64,
    /// Copy unchanged ranges server-side instead of re-uploading them
    pub copy_part: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            min_part_size: 5 * MB,
            max_part_size: 10 * MB,
            max_parts: 10_000,
            concurrency_limit: 5,
            retry_limit: 5,
            retry_backoff_ms: 100,
            part_timeout_ms: 120_000,
            multipart_threshold: 20 * MB,
            max_single_put_size: 5 * 1024 * MB,
            copy_part: true,
        }
    }
}

impl UploadConfig {
    pub fn part_limits(&self) -> PartLimits {
        PartLimits {
            min_part_size: self.min_part_size,
            max_part_size: self.max_part_size,
            max_parts: self.max_parts,
            allow_copy: self.copy_part,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn part_timeout(&self) -> Duration {
        Duration::from_millis(self.part_timeout_ms)
    }

    /// Check internal consistency
    pub fn validate(&self) -> crate::Result<()> {
        self.part_limits()
            .validate()
            .map_err(|e| OssfsError::Config(e.to_string()))?;

        if self.concurrency_limit == 0 {
            return Err(OssfsError::Config("concurrency_limit must be positive".into()));
        }
        if self.part_timeout_ms == 0 {
            return Err(OssfsError::Config("part_timeout_ms must be positive".into()));
        }
        if self.max_single_put_size == 0 {
            return Err(OssfsError::Config("max_single_put_size must be positive".into()));
        }

        Ok(())
    }
}

/// Canned object ACL as OSS names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Acl {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "public-read")]
    PublicRead,
    #[serde(rename = "public-read-write")]
    PublicReadWrite,
    /// Inherit the bucket ACL
    #[default]
    #[serde(rename = "default")]
    BucketDefault,
}

impl Acl {
    /// Value of the `x-oss-object-acl` header
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
            Acl::PublicReadWrite => "public-read-write",
            Acl::BucketDefault => "default",
        }
    }
}

impl FromStr for Acl {
    type Err = OssfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Acl::Private),
            "public-read" => Ok(Acl::PublicRead),
            "public-read-write" => Ok(Acl::PublicReadWrite),
            "default" => Ok(Acl::BucketDefault),
            other => Err(OssfsError::Config(format!("unknown acl '{}'", other))),
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side encryption mode
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SseType {
    #[default]
    Disabled,
    /// OSS-managed keys
    Oss,
    /// Customer-provided key, identified by its MD5
    Custom { key_md5: String },
    /// KMS-managed key, optionally a specific one
    Kms { key_id: Option<String> },
}

impl SseType {
    /// Value of the `x-oss-server-side-encryption` header, if any
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            SseType::Disabled | SseType::Custom { .. } => None,
            SseType::Oss => Some("AES256"),
            SseType::Kms { .. } => Some("KMS"),
        }
    }
}

/// Request signing scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureVersion {
    #[serde(rename = "v1")]
    V1Only,
    #[serde(rename = "v4")]
    V4Only,
    /// Try V4 and fall back to V1
    #[default]
    #[serde(rename = "auto")]
    V1OrV4,
}

impl SignatureVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureVersion::V1Only => "v1",
            SignatureVersion::V4Only => "v4",
            SignatureVersion::V1OrV4 => "auto",
        }
    }
}

impl FromStr for SignatureVersion {
    type Err = OssfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(SignatureVersion::V1Only),
            "v4" => Ok(SignatureVersion::V4Only),
            "auto" => Ok(SignatureVersion::V1OrV4),
            other => Err(OssfsError::Config(format!("unknown signature version '{}'", other))),
        }
    }
}

/// Immutable per-mount options handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub acl: Acl,
    pub sse: SseType,
    pub signature: SignatureVersion,
}

/// Everything a mount reads from its configuration file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upload: UploadConfig,
    pub store: StoreOptions,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.upload.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = UploadConfig::default();
        config.validate().unwrap();
        assert_eq!(config.part_limits().min_part_size, 5 * MB);
        assert_eq!(config.retry_backoff(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let config = UploadConfig {
            max_part_size: MB,
            min_part_size: 2 * MB,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(OssfsError::Config(_))));

        let config = UploadConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_acl_strings() {
        for acl in [Acl::Private, Acl::PublicRead, Acl::PublicReadWrite, Acl::BucketDefault] {
            assert_eq!(acl.as_str().parse::<Acl>().unwrap(), acl);
        }
        assert!("world-writable".parse::<Acl>().is_err());

        for signature in [SignatureVersion::V1Only, SignatureVersion::V4Only, SignatureVersion::V1OrV4] {
            assert_eq!(signature.as_str().parse::<SignatureVersion>().unwrap(), signature);
        }
    }

    #[test]
    fn test_sse_headers() {
        assert_eq!(SseType::Disabled.header_value(), None);
        assert_eq!(SseType::Oss.header_value(), Some("AES256"));
        assert_eq!(SseType::Kms { key_id: None }.header_value(), Some("KMS"));
    }

    #[test]
    fn test_config_file_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ossfs.json");
        std::fs::write(
            &path,
            r#"{
                "upload": { "concurrency_limit": 8, "copy_part": false },
                "store": { "acl": "public-read", "sse": { "mode": "kms", "key_id": "k-1" }, "signature": "v4" }
            }"#,
        )
        .unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.upload.concurrency_limit, 8);
        assert!(!config.upload.copy_part);
        assert_eq!(config.upload.max_parts, 10_000);
        assert_eq!(config.store.acl, Acl::PublicRead);
        assert_eq!(config.store.sse, SseType::Kms { key_id: Some("k-1".into()) });
        assert_eq!(config.store.signature, SignatureVersion::V4Only);
    }
}

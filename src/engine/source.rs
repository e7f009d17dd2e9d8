//! Mapping document sources and change detection.
//!
//! A mapping can come from a packaged file or a remote object store. Remote
//! change detection is two-phase: a cheap entity-tag probe first, then a
//! base-64 SHA-256 content hash whenever either tag is absent or the tags are
//! equal (periodic verification). File sources have no entity tag and always
//! take the hash path.

use crate::engine::config::{EngineConfig, MappingSourceKind};
use crate::engine::error::{ReshapeError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::info;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

/// A fetched mapping document plus the identities used for change detection
#[derive(Debug, Clone)]
pub struct MappingDocument {
    pub body: String,
    pub etag: Option<String>,
    pub hash: String,
}

/// Where mapping documents are fetched from
pub enum MappingSource {
    File {
        path: PathBuf,
    },
    Remote {
        store: Arc<dyn ObjectStore>,
        location: ObjectPath,
        descriptor: String,
    },
}

impl MappingSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        MappingSource::File { path: path.into() }
    }

    /// Wrap an already-built object store client. Long-lived; dropped on
    /// teardown with the controller that owns it.
    pub fn remote(store: Arc<dyn ObjectStore>, key: &str) -> Self {
        MappingSource::Remote {
            store,
            location: ObjectPath::from(key),
            descriptor: key.to_string(),
        }
    }

    /// Build a source from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        match config.source {
            MappingSourceKind::File => Ok(Self::file(&config.mapping_location)),
            MappingSourceKind::S3 => {
                let s3 = config.s3.as_ref().ok_or_else(|| {
                    ReshapeError::Config("s3 source selected but no s3 settings given".to_string())
                })?;
                let store = AmazonS3Builder::new()
                    .with_endpoint(&s3.endpoint)
                    .with_bucket_name(&s3.bucket)
                    .with_region(&s3.region)
                    .with_access_key_id(&s3.access_key)
                    .with_secret_access_key(&s3.secret_key)
                    .with_allow_http(true)
                    .build()
                    .map_err(|e| ReshapeError::Config(format!("cannot build s3 client: {e}")))?;
                info!(
                    "Mapping source: s3 endpoint={} bucket={} key={}",
                    s3.endpoint, s3.bucket, config.mapping_location
                );
                Ok(Self::remote(Arc::new(store), &config.mapping_location))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MappingSource::File { path } => format!("file:{}", path.display()),
            MappingSource::Remote { descriptor, .. } => format!("remote:{descriptor}"),
        }
    }

    /// Fetch the full document body.
    pub async fn fetch(&self) -> Result<MappingDocument> {
        match self {
            MappingSource::File { path } => {
                let body = tokio::fs::read_to_string(path).await?;
                let hash = content_hash(&body);
                Ok(MappingDocument {
                    body,
                    etag: None,
                    hash,
                })
            }
            MappingSource::Remote {
                store, location, ..
            } => {
                let result = store.get(location).await?;
                let etag = result.meta.e_tag.clone();
                let bytes = result.bytes().await?;
                let body = String::from_utf8(bytes.to_vec())
                    .map_err(|e| ReshapeError::Source(format!("mapping is not UTF-8: {e}")))?;
                let hash = content_hash(&body);
                Ok(MappingDocument { body, etag, hash })
            }
        }
    }

    /// Cheap metadata probe: the current entity tag, if the source has one.
    pub async fn probe_etag(&self) -> Result<Option<String>> {
        match self {
            MappingSource::File { .. } => Ok(None),
            MappingSource::Remote {
                store, location, ..
            } => {
                let meta = store.head(location).await?;
                Ok(meta.e_tag)
            }
        }
    }
}

/// Base-64 SHA-256 of a document body
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Both entity tags present and different.
pub fn etag_changed(prev: Option<&str>, curr: Option<&str>) -> bool {
    matches!((prev, curr), (Some(p), Some(c)) if p != c)
}

/// The hash fallback applies when either tag is absent, or both are present
/// and equal (conservative re-check).
pub fn needs_hash_check(prev: Option<&str>, curr: Option<&str>) -> bool {
    match (prev, curr) {
        (Some(p), Some(c)) => p == c,
        _ => true,
    }
}

/// Both hashes present and different.
pub fn hash_changed(prev: Option<&str>, curr: Option<&str>) -> bool {
    matches!((prev, curr), (Some(p), Some(c)) if p != c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    #[test]
    fn test_etag_changes_detected_when_both_present() {
        assert!(etag_changed(Some("etag-a"), Some("etag-b")));
        assert!(!etag_changed(Some("etag-a"), Some("etag-a")));
        assert!(!etag_changed(None, Some("etag-b")));
        assert!(!etag_changed(Some("etag-a"), None));
    }

    #[test]
    fn test_hash_fallback_when_etag_missing_or_unchanged() {
        assert!(needs_hash_check(Some("same"), Some("same")));
        assert!(needs_hash_check(None, Some("new")));
        assert!(needs_hash_check(Some("old"), None));
        assert!(!needs_hash_check(Some("old"), Some("new")));
    }

    #[test]
    fn test_hash_changes_detected_when_both_present() {
        assert!(hash_changed(Some("hash-a"), Some("hash-b")));
        assert!(!hash_changed(Some("hash-a"), Some("hash-a")));
        assert!(!hash_changed(None, Some("hash-b")));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("body"), content_hash("body"));
        assert_ne!(content_hash("body"), content_hash("other"));
    }

    #[tokio::test]
    async fn test_remote_fetch_and_probe() {
        let store = Arc::new(InMemory::new());
        store
            .put(
                &ObjectPath::from("mappings.json"),
                PutPayload::from_static(b"{\"v\":1}"),
            )
            .await
            .unwrap();

        let source = MappingSource::remote(store, "mappings.json");
        let doc = source.fetch().await.unwrap();
        assert_eq!(doc.body, "{\"v\":1}");
        assert_eq!(doc.hash, content_hash("{\"v\":1}"));
        assert!(doc.etag.is_some());
        assert_eq!(source.probe_etag().await.unwrap(), doc.etag);
    }

    #[tokio::test]
    async fn test_remote_fetch_missing_object_errors() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let source = MappingSource::remote(store, "absent.json");
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_file_fetch_has_no_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        tokio::fs::write(&path, "{}").await.unwrap();

        let source = MappingSource::file(&path);
        let doc = source.fetch().await.unwrap();
        assert_eq!(doc.body, "{}");
        assert!(doc.etag.is_none());
        assert!(source.probe_etag().await.unwrap().is_none());
    }
}

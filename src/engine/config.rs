//! Engine configuration.
//!
//! Deserialized from the host's connector configuration with defaults for
//! every key. When the `RESHAPE_S3_ENDPOINT` environment variable is present
//! it overrides the configured source, switching mapping loads to the remote
//! object store.

use crate::engine::record::FramingMode;
use serde::Deserialize;

/// Where the mapping document is loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSourceKind {
    /// A file packaged with the deployment
    File,
    /// An object in a remote store
    S3,
}

/// Remote object-store connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Connector name used for mapping lookup (topic lookup when empty)
    #[serde(default)]
    pub connector_name: String,

    #[serde(default = "default_source")]
    pub source: MappingSourceKind,

    /// File path or remote object key of the mapping document
    #[serde(default = "default_mapping_location")]
    pub mapping_location: String,

    #[serde(default)]
    pub s3: Option<RemoteStoreConfig>,

    #[serde(default)]
    pub hot_reload_enabled: bool,

    #[serde(default = "default_hot_reload_interval")]
    pub hot_reload_interval_secs: u64,

    /// Elevate mapping-miss logging from warn to error
    #[serde(default)]
    pub fail_on_missing_mapping: bool,

    /// Emit the `_source` metadata side-channel (wrapped framing only)
    #[serde(default = "default_true")]
    pub attach_source_metadata: bool,

    /// Emit the `_raw` verbatim-input side-channel (wrapped framing only)
    #[serde(default)]
    pub store_raw_payload: bool,

    #[serde(default = "default_framing")]
    pub framing: FramingMode,
}

fn default_source() -> MappingSourceKind {
    MappingSourceKind::File
}

fn default_mapping_location() -> String {
    "mappings/topic-mappings.json".to_string()
}

fn default_hot_reload_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_framing() -> FramingMode {
    FramingMode::Wrapped
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connector_name: String::new(),
            source: default_source(),
            mapping_location: default_mapping_location(),
            s3: None,
            hot_reload_enabled: false,
            hot_reload_interval_secs: default_hot_reload_interval(),
            fail_on_missing_mapping: false,
            attach_source_metadata: true,
            store_raw_payload: false,
            framing: default_framing(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> crate::engine::error::Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| crate::engine::error::ReshapeError::Config(e.to_string()))
    }

    /// Apply `RESHAPE_S3_*` environment overrides. An endpoint in the
    /// environment switches the source to the remote store.
    pub fn apply_env_overrides(&mut self) {
        let Ok(endpoint) = std::env::var("RESHAPE_S3_ENDPOINT") else {
            return;
        };
        let existing = self.s3.take();
        let var = |name: &str, fallback: Option<String>| {
            std::env::var(name).ok().or(fallback).unwrap_or_default()
        };
        self.source = MappingSourceKind::S3;
        self.s3 = Some(RemoteStoreConfig {
            endpoint,
            bucket: var("RESHAPE_S3_BUCKET", existing.as_ref().map(|c| c.bucket.clone())),
            region: {
                let r = var("RESHAPE_S3_REGION", existing.as_ref().map(|c| c.region.clone()));
                if r.is_empty() { default_region() } else { r }
            },
            access_key: var(
                "RESHAPE_S3_ACCESS_KEY",
                existing.as_ref().map(|c| c.access_key.clone()),
            ),
            secret_key: var(
                "RESHAPE_S3_SECRET_KEY",
                existing.as_ref().map(|c| c.secret_key.clone()),
            ),
        });
    }
}

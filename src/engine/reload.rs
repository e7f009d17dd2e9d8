//! # Reload Controller
//!
//! A single background task that polls the mapping source for change and
//! swaps validated documents into the [`MappingStore`]. The per-record path
//! never blocks on any of this.
//!
//! Change detection is two-phase: an entity-tag probe first; when either tag
//! is absent or the tags are equal, a SHA-256 content-hash comparison over a
//! fresh body. Every failure leaves the current mapping in place
//! (last-known-good).

use crate::engine::error::{codes, ErrorInfo, ReshapeError, Result};
use crate::engine::metrics::EngineMetrics;
use crate::engine::retry::{with_retry, RetryConfig};
use crate::engine::source::{
    etag_changed, hash_changed, needs_hash_check, MappingDocument, MappingSource,
};
use crate::engine::store::MappingStore;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Timing knobs for the reload loop
#[derive(Debug, Clone)]
pub struct ReloadSettings {
    /// Poll interval
    pub interval: Duration,
    /// Retry policy for metadata and body fetches
    pub retry: RetryConfig,
    /// Bound on a single fetch attempt
    pub attempt_timeout: Duration,
    /// Bound on one whole fetch call including retries
    pub call_timeout: Duration,
    /// Grace window for shutdown before outstanding work is abandoned
    pub shutdown_grace: Duration,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            retry: RetryConfig::default(),
            attempt_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(15),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ReloadSettings {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }
}

/// Last observed document identities, updated on every successful adoption
#[derive(Debug, Default, Clone)]
struct DetectionState {
    last_etag: Option<String>,
    last_hash: Option<String>,
}

struct ReloadInner {
    source: MappingSource,
    store: Arc<MappingStore>,
    settings: ReloadSettings,
    state: Mutex<DetectionState>,
    /// Most recent reload failure event; cleared on successful adoption
    last_failure: Mutex<Option<ErrorInfo>>,
}

pub struct ReloadController {
    inner: Arc<ReloadInner>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReloadController {
    pub fn new(source: MappingSource, store: Arc<MappingStore>, settings: ReloadSettings) -> Self {
        Self {
            inner: Arc::new(ReloadInner {
                source,
                store,
                settings,
                state: Mutex::new(DetectionState::default()),
                last_failure: Mutex::new(None),
            }),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Record the identities of an already-adopted document (the bootstrap
    /// load) so the first poll compares against it.
    pub fn seed(&self, document: &MappingDocument) {
        let mut state = self.inner.state.lock().unwrap();
        state.last_etag = document.etag.clone();
        state.last_hash = Some(document.hash.clone());
    }

    /// Start the background poll loop. Idempotent.
    pub fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let shutdown = Arc::clone(&self.shutdown);
        let running = Arc::clone(&self.running);
        let period = inner.settings.interval;

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    () = shutdown.notified() => {
                        debug!("Reload controller stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        inner.check_and_reload().await;
                    }
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
        info!(
            "Reload controller started for {} - polling every {:?}",
            self.inner.source.describe(),
            period
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The most recent reload failure event, or `None` when the last cycle
    /// adopted (or detected nothing). A populated value means the engine is
    /// serving last-known-good rules.
    pub fn last_failure(&self) -> Option<ErrorInfo> {
        self.inner.last_failure.lock().unwrap().clone()
    }

    /// Run one poll cycle immediately, outside the timer.
    pub async fn poll_once(&self) {
        self.inner.check_and_reload().await;
    }

    /// Bypass change detection entirely: fetch, validate, swap or fail.
    pub async fn force_reload(&self) -> Result<()> {
        match self.inner.fetch_document().await {
            Ok(document) => self.inner.adopt(document),
            Err(e) => {
                EngineMetrics::global().record_reload_failure();
                self.inner.record_failure_event(&e);
                Err(e)
            }
        }
    }

    /// Stop the poll loop, waiting up to the configured grace window before
    /// abandoning outstanding work.
    pub async fn shutdown(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.shutdown.notify_one();
        let handle = self.handle.lock().unwrap().take();
        if let Some(mut handle) = handle {
            let grace = self.inner.settings.shutdown_grace;
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("Reload task did not stop within {grace:?}, abandoning it");
                handle.abort();
            }
        }
        info!("Reload controller stopped");
    }
}

impl ReloadInner {
    async fn check_and_reload(&self) {
        match self.detect_change().await {
            Ok(Some(document)) => {
                info!("Mapping change detected, reloading");
                if let Err(e) = self.adopt(document) {
                    error!("Failed to adopt new mapping, keeping last known good: {e}");
                }
            }
            Ok(None) => debug!("Mapping unchanged"),
            Err(e) => {
                warn!("Mapping change check failed, keeping last known good: {e}");
                EngineMetrics::global().record_reload_failure();
                self.record_failure_event(&e);
            }
        }
    }

    fn record_failure_event(&self, error: &ReshapeError) {
        *self.last_failure.lock().unwrap() = Some(ErrorInfo::new(
            codes::RELOAD_ERROR,
            format!("keeping last known good mapping: {error}"),
        ));
    }

    /// Two-phase change detection. Returns the fetched document when a swap
    /// should happen.
    async fn detect_change(&self) -> Result<Option<MappingDocument>> {
        let previous = self.state.lock().unwrap().clone();

        let current_etag = with_retry(
            &self.settings.retry,
            self.settings.attempt_timeout,
            "metadata probe",
            || self.source.probe_etag(),
        )
        .await?;

        if etag_changed(previous.last_etag.as_deref(), current_etag.as_deref()) {
            return Ok(Some(self.fetch_document().await?));
        }

        if needs_hash_check(previous.last_etag.as_deref(), current_etag.as_deref()) {
            let document = self.fetch_document().await?;
            if hash_changed(previous.last_hash.as_deref(), Some(&document.hash)) {
                return Ok(Some(document));
            }
        }
        Ok(None)
    }

    async fn fetch_document(&self) -> Result<MappingDocument> {
        let fetch = with_retry(
            &self.settings.retry,
            self.settings.attempt_timeout,
            "mapping fetch",
            || self.source.fetch(),
        );
        tokio::time::timeout(self.settings.call_timeout, fetch)
            .await
            .map_err(|_| {
                ReshapeError::Timeout(format!(
                    "mapping fetch exceeded {:?}",
                    self.settings.call_timeout
                ))
            })?
    }

    fn adopt(&self, document: MappingDocument) -> Result<()> {
        match self.store.try_adopt(&document.body) {
            Ok(()) => {
                let mut state = self.state.lock().unwrap();
                state.last_etag = document.etag.clone();
                state.last_hash = Some(document.hash.clone());
                drop(state);
                *self.last_failure.lock().unwrap() = None;
                EngineMetrics::global().record_reload_success();
                info!(
                    "Mapping reloaded from {} ({} bytes, etag={:?})",
                    self.source.describe(),
                    document.body.len(),
                    document.etag
                );
                Ok(())
            }
            Err(e) => {
                EngineMetrics::global().record_reload_failure();
                self.record_failure_event(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::{ObjectStore, PutPayload};

    const MAPPING_A: &str =
        r#"{"topics": {"a": {"root": "ra", "output": {"id": {"paths": ["$.id"]}}}}}"#;
    const MAPPING_B: &str =
        r#"{"topics": {"b": {"root": "rb", "output": {"id": {"paths": ["$.id"]}}}}}"#;

    fn quick_settings() -> ReloadSettings {
        ReloadSettings {
            interval: Duration::from_millis(10),
            retry: RetryConfig {
                max_attempts: 1,
                base_delay_ms: 1,
                jitter_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn put(store: &InMemory, body: &str) {
        store
            .put(
                &ObjectPath::from("mappings.json"),
                PutPayload::from(body.as_bytes().to_vec()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_etag_change_triggers_swap() {
        let remote = Arc::new(InMemory::new());
        put(&remote, MAPPING_A).await;

        let source = MappingSource::remote(remote.clone(), "mappings.json");
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        controller.seed(&initial);

        // overwrite gives the object a new etag
        put(&remote, MAPPING_B).await;
        controller.poll_once().await;

        assert!(store.snapshot().lookup("", "b").is_some());
    }

    #[tokio::test]
    async fn test_unchanged_content_does_not_swap() {
        let remote = Arc::new(InMemory::new());
        put(&remote, MAPPING_A).await;

        let source = MappingSource::remote(remote, "mappings.json");
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        controller.seed(&initial);

        let before = store.snapshot();
        controller.poll_once().await;
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_equal_etags_with_differing_hash_swaps() {
        let remote = Arc::new(InMemory::new());
        put(&remote, MAPPING_A).await;

        let source = MappingSource::remote(remote, "mappings.json");
        let current = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(MAPPING_B).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        // same etag as the remote object, but a stale content hash
        controller.seed(&MappingDocument {
            body: String::new(),
            etag: current.etag.clone(),
            hash: "stale-hash".to_string(),
        });

        controller.poll_once().await;
        // the hash fallback caught the difference and adopted the remote body
        assert!(store.snapshot().lookup("", "a").is_some());
    }

    #[tokio::test]
    async fn test_hash_fallback_without_etag() {
        // file sources have no entity tag, so change detection rides the hash
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        tokio::fs::write(&path, MAPPING_A).await.unwrap();

        let source = MappingSource::file(&path);
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        controller.seed(&initial);

        // unchanged body: hash equal, no swap
        let before = store.snapshot();
        controller.poll_once().await;
        assert!(Arc::ptr_eq(&before, &store.snapshot()));

        // changed body: hash differs, swap
        tokio::fs::write(&path, MAPPING_B).await.unwrap();
        controller.poll_once().await;
        assert!(store.snapshot().lookup("", "b").is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_last_known_good() {
        let remote = Arc::new(InMemory::new());
        // nothing stored remotely
        let source = MappingSource::remote(remote, "mappings.json");
        let store = Arc::new(MappingStore::from_json(MAPPING_A).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());

        let before = store.snapshot();
        controller.poll_once().await;
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        let failure = controller.last_failure().expect("failure recorded");
        assert_eq!(failure.code, "RELOAD_ERROR");
    }

    #[tokio::test]
    async fn test_invalid_document_keeps_last_known_good() {
        let remote = Arc::new(InMemory::new());
        put(&remote, MAPPING_A).await;

        let source = MappingSource::remote(remote.clone(), "mappings.json");
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        controller.seed(&initial);

        put(&remote, "{broken json").await;
        let before = store.snapshot();
        controller.poll_once().await;
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(
            controller.last_failure().expect("failure recorded").code,
            "RELOAD_ERROR"
        );

        // a good document clears the failure on the next cycle
        put(&remote, MAPPING_B).await;
        controller.poll_once().await;
        assert!(store.snapshot().lookup("", "b").is_some());
        assert!(controller.last_failure().is_none());
    }

    #[tokio::test]
    async fn test_force_reload_bypasses_detection() {
        let remote = Arc::new(InMemory::new());
        put(&remote, MAPPING_A).await;

        let source = MappingSource::remote(remote, "mappings.json");
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        controller.seed(&initial);

        // same content, but force reload still fetches and swaps
        let before = store.snapshot();
        controller.force_reload().await.unwrap();
        assert!(!Arc::ptr_eq(&before, &store.snapshot()));
        assert!(store.snapshot().lookup("", "a").is_some());
    }

    #[tokio::test]
    async fn test_force_reload_raises_on_failure() {
        let remote = Arc::new(InMemory::new());
        let source = MappingSource::remote(remote, "absent.json");
        let store = Arc::new(MappingStore::from_json(MAPPING_A).unwrap());
        let controller = ReloadController::new(source, store, quick_settings());
        assert!(controller.force_reload().await.is_err());
        assert_eq!(
            controller.last_failure().expect("failure recorded").code,
            "RELOAD_ERROR"
        );
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let remote = Arc::new(InMemory::new());
        put(&remote, MAPPING_A).await;

        let source = MappingSource::remote(remote.clone(), "mappings.json");
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(source, store.clone(), quick_settings());
        controller.seed(&initial);

        controller.start();
        assert!(controller.is_running());

        put(&remote, MAPPING_B).await;
        // a few poll intervals
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.snapshot().lookup("", "b").is_some());

        controller.shutdown().await;
        assert!(!controller.is_running());
    }
}

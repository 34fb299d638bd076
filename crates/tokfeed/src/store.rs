//! Settings persistence and the feed store built on it.
//!
//! [`KeyValueStore`] is the raw backend: string keys mapped to JSON values.
//! [`Settings`] adds typed access on top, and [`FeedStore`] keeps the last
//! synchronized feed plus the time it was produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::write_atomic;
use crate::error::StoreError;
use crate::model::FeedSnapshot;

pub const SIGN_ENDPOINT_KEY: &str = "settings.signEndpoint";
pub const LAST_REFRESH_KEY: &str = "settings.lastRefresh";
pub const FEED_KEY: &str = "settings.tiktoks";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set_raw(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory backend; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// A single JSON document on disk, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file starts empty; an unreadable
    /// document is logged and replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable settings file");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        Ok(Self {
            path,
            entries: tokio::sync::Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.path, &data)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.persist(&entries).await {
            // keep memory and disk in agreement
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

/// Typed access to a [`KeyValueStore`].
#[derive(Clone)]
pub struct Settings {
    backend: Arc<dyn KeyValueStore>,
}

impl Settings {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Reads `key`. Values that no longer decode as `T` read as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(value) = self.backend.get_raw(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable setting");
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.backend.set_raw(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(key).await
    }
}

/// Persists the last successfully synchronized feed.
#[derive(Clone)]
pub struct FeedStore {
    settings: Settings,
}

impl FeedStore {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The stored snapshot; absent, unreadable or undecodable data yields `None`.
    pub async fn load(&self) -> Option<FeedSnapshot> {
        match self.settings.get(FEED_KEY).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to read stored feed");
                None
            }
        }
    }

    /// Stores `snapshot` and records its production time as the last sync.
    ///
    /// Either both values are written or the previous feed is put back.
    pub async fn save(&self, snapshot: &FeedSnapshot) -> Result<(), StoreError> {
        let backend = &self.settings.backend;
        let previous = backend.get_raw(FEED_KEY).await?;
        self.settings.set(FEED_KEY, snapshot).await?;

        if let Err(e) = self
            .settings
            .set(LAST_REFRESH_KEY, &snapshot.produced_at)
            .await
        {
            let restored = match previous {
                Some(previous) => backend.set_raw(FEED_KEY, previous).await,
                None => backend.remove(FEED_KEY).await,
            };
            if let Err(restore_err) = restored {
                warn!(error = %restore_err, "Failed to restore previous feed");
            }
            return Err(e);
        }

        debug!(items = snapshot.len(), "Stored feed snapshot");
        Ok(())
    }

    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.settings.get(LAST_REFRESH_KEY).await.ok().flatten()
    }
}

/// Resolves the remote signing endpoint.
///
/// A non-empty `env_value` (from `SIGN_ENDPOINT`) wins and is persisted so
/// later runs without the variable keep using it.
pub async fn resolve_sign_endpoint(
    settings: &Settings,
    env_value: Option<String>,
) -> Result<Option<String>, StoreError> {
    match env_value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(endpoint) => {
            settings.set(SIGN_ENDPOINT_KEY, &endpoint).await?;
            Ok(Some(endpoint))
        }
        None => settings.get(SIGN_ENDPOINT_KEY).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::item;

    #[tokio::test]
    async fn test_settings_typed_roundtrip() {
        let settings = Settings::in_memory();
        assert_eq!(settings.get::<u32>("answer").await.unwrap(), None);

        settings.set("answer", &42u32).await.unwrap();
        assert_eq!(settings.get::<u32>("answer").await.unwrap(), Some(42));

        // wrong type reads as absent
        assert_eq!(settings.get::<Vec<String>>("answer").await.unwrap(), None);

        settings.remove("answer").await.unwrap();
        assert_eq!(settings.get::<u32>("answer").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store
            .set_raw("settings.signEndpoint", Value::from("http://sign"))
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get_raw("settings.signEndpoint").await.unwrap(),
            Some(Value::from("http://sign"))
        );
    }

    #[tokio::test]
    async fn test_json_file_store_discards_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get_raw("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_feed_store_roundtrip() {
        let store = FeedStore::new(Settings::in_memory());
        assert!(store.load().await.is_none());
        assert!(store.last_synced_at().await.is_none());

        let produced_at = Utc::now();
        let snapshot =
            FeedSnapshot::from_unordered(vec![item("a", "u1", 100), item("b", "u2", 200)], produced_at);
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(store.last_synced_at().await, Some(produced_at));
    }

    /// Memory backend that refuses writes to one key once armed.
    struct FlakyStore {
        inner: MemoryStore,
        fail_key: &'static str,
        armed: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn new(fail_key: &'static str) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_key,
                armed: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn arm(&self) {
            self.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get_raw(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get_raw(key).await
        }

        async fn set_raw(&self, key: &str, value: Value) -> Result<(), StoreError> {
            if key == self.fail_key && self.armed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::io(
                    Path::new("settings.json"),
                    std::io::Error::other("disk full"),
                ));
            }
            self.inner.set_raw(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_write_keeps_previous_feed() {
        let backend = Arc::new(FlakyStore::new(LAST_REFRESH_KEY));
        let store = FeedStore::new(Settings::new(backend.clone()));

        let old = FeedSnapshot::from_unordered(vec![item("old", "u1", 100)], Utc::now());
        store.save(&old).await.unwrap();

        backend.arm();
        let new = FeedSnapshot::from_unordered(vec![item("new", "u1", 200)], Utc::now());
        assert!(store.save(&new).await.is_err());

        assert_eq!(store.load().await, Some(old.clone()));
        assert_eq!(store.last_synced_at().await, Some(old.produced_at));
    }

    #[tokio::test]
    async fn test_failed_first_save_leaves_no_feed() {
        let backend = Arc::new(FlakyStore::new(LAST_REFRESH_KEY));
        backend.arm();
        let store = FeedStore::new(Settings::new(backend));

        let snapshot = FeedSnapshot::from_unordered(vec![item("a", "u1", 100)], Utc::now());
        assert!(store.save(&snapshot).await.is_err());
        assert!(store.load().await.is_none());
        assert!(store.last_synced_at().await.is_none());
    }

    #[tokio::test]
    async fn test_feed_store_undecodable_is_none() {
        let settings = Settings::in_memory();
        settings.set(FEED_KEY, "not a feed").await.unwrap();
        assert!(FeedStore::new(settings).load().await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_sign_endpoint() {
        let settings = Settings::in_memory();
        assert_eq!(resolve_sign_endpoint(&settings, None).await.unwrap(), None);
        assert_eq!(
            resolve_sign_endpoint(&settings, Some("  ".to_string()))
                .await
                .unwrap(),
            None
        );

        let resolved = resolve_sign_endpoint(&settings, Some("http://sign/".to_string()))
            .await
            .unwrap();
        assert_eq!(resolved.as_deref(), Some("http://sign/"));

        // persisted for later runs without the variable
        assert_eq!(
            resolve_sign_endpoint(&settings, None).await.unwrap().as_deref(),
            Some("http://sign/")
        );
    }
}

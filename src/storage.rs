use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::Config;
use crate::paths;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait Store: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;
    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

pub async fn get_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    let Some(value) = store.get(key).await? else {
        return Ok(None);
    };
    let parsed = serde_json::from_value(value)
        .with_context(|| format!("invalid stored value for '{}'", key))?;
    Ok(Some(parsed))
}

pub async fn set_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
        .with_context(|| format!("failed to serialize value for '{}'", key))?;
    store.set(key, value).await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    pub total_bytes: Option<usize>,
    pub bytes_per_item: Option<usize>,
}

impl Quota {
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn check(&self, key: &str, items: &BTreeMap<String, Value>) -> Result<()> {
        let mut total = 0usize;
        for (item_key, value) in items {
            let size = item_size(item_key, value);
            if item_key == key
                && let Some(limit) = self.bytes_per_item
                && size > limit
            {
                return Err(anyhow!(
                    "quota exceeded: '{}' needs {} bytes (limit per item {})",
                    key,
                    size,
                    limit
                ));
            }
            total += size;
        }
        if let Some(limit) = self.total_bytes
            && total > limit
        {
            return Err(anyhow!(
                "quota exceeded: storage needs {} bytes (limit {})",
                total,
                limit
            ));
        }
        Ok(())
    }
}

fn item_size(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

pub struct JsonFileStore {
    path: PathBuf,
    quota: Quota,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, quota: Quota) -> Self {
        Self {
            path: path.into(),
            quota,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read store: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let map: Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse store: {}", self.path.display()))?;
        Ok(map.into_iter().collect())
    }

    fn write_all(&self, items: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory: {}", parent.display())
            })?;
        }
        let content = serde_json::to_string_pretty(items)
            .with_context(|| "failed to serialize store")?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write store: {}", self.path.display()))
    }

    fn update<F>(&self, key: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, Value>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("store lock poisoned: {}", self.path.display()))?;
        let mut items = self.read_all()?;
        apply(&mut items);
        self.quota.check(key, &items)?;
        self.write_all(&items)
    }
}

impl Store for JsonFileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let _guard = self
                .lock
                .lock()
                .map_err(|_| anyhow!("store lock poisoned: {}", self.path.display()))?;
            Ok(self.read_all()?.remove(key))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.update(key, |items| {
                items.insert(key.to_string(), value);
            })
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.update(key, |items| {
                items.remove(key);
            })
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, Value>>,
    quota: Quota,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: Quota) -> Self {
        Self {
            quota,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn items(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("storage area unavailable"));
        }
        self.items
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl Store for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.items()?.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut items = self.items()?;
            let mut next = items.clone();
            next.insert(key.to_string(), value);
            self.quota.check(key, &next)?;
            *items = next;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.items()?.remove(key);
            Ok(())
        })
    }
}

// Prefers the synced area and falls back to the local one when the synced area
// is unavailable or over quota.
pub struct TieredStore {
    sync: Arc<dyn Store>,
    local: Arc<dyn Store>,
}

impl TieredStore {
    pub fn new(sync: Arc<dyn Store>, local: Arc<dyn Store>) -> Self {
        Self { sync, local }
    }
}

impl Store for TieredStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            match self.sync.get(key).await {
                Ok(Some(value)) => Ok(Some(value)),
                Ok(None) => self.local.get(key).await,
                Err(err) => {
                    warn!("sync storage read of '{}' failed, using local: {}", key, err);
                    self.local.get(key).await
                }
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            match self.sync.set(key, value.clone()).await {
                Ok(()) => {
                    if let Err(err) = self.local.remove(key).await {
                        debug!("failed to drop local copy of '{}': {}", key, err);
                    }
                    Ok(())
                }
                Err(err) => {
                    warn!("sync storage write of '{}' failed, using local: {}", key, err);
                    if let Err(err) = self.sync.remove(key).await {
                        debug!("failed to drop stale sync copy of '{}': {}", key, err);
                    }
                    self.local.set(key, value).await
                }
            }
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if let Err(err) = self.sync.remove(key).await {
                warn!("sync storage remove of '{}' failed: {}", key, err);
            }
            self.local.remove(key).await
        })
    }
}

#[derive(Clone)]
pub struct Stores {
    pub sync: Arc<dyn Store>,
    pub local: Arc<dyn Store>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            sync: Arc::new(MemoryStore::new()),
            local: Arc::new(MemoryStore::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let dir = paths::storage_dir(config.storage_dir.as_deref());
        let quota = Quota {
            total_bytes: config.sync_quota_bytes,
            bytes_per_item: config.sync_quota_bytes_per_item,
        };
        Self {
            sync: Arc::new(JsonFileStore::new(paths::sync_store_path(&dir), quota)),
            local: Arc::new(JsonFileStore::new(
                paths::local_store_path(&dir),
                Quota::unlimited(),
            )),
        }
    }

    pub fn tiered(&self) -> Arc<dyn Store> {
        Arc::new(TieredStore::new(self.sync.clone(), self.local.clone()))
    }
}

//! Named-value persistence for the activity ledger.
//!
//! Each collection lives under one [`StoreKey`]. Loads never fail: a missing,
//! empty, or unparsable resource falls back to the caller's default and is
//! logged. Saves serialize the full value and overwrite the resource; IO
//! failures are logged and reported to the caller as `false` so the in-memory
//! copy stays authoritative for the running process.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::atomic_io::write_text_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Enumerates the durable collections owned by the activity ledger.
pub enum StoreKey {
    SeenUsers,
    ActiveUsers,
    UserDetails,
    AdminUsers,
}

impl StoreKey {
    pub const ALL: [StoreKey; 4] = [
        StoreKey::SeenUsers,
        StoreKey::ActiveUsers,
        StoreKey::UserDetails,
        StoreKey::AdminUsers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SeenUsers => "seen_users",
            Self::ActiveUsers => "active_users",
            Self::UserDetails => "user_details",
            Self::AdminUsers => "admin_users",
        }
    }

    /// File name used by [`JsonFileStore`]; kept compatible with existing state directories.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::SeenUsers => "all_seen_users.json",
            Self::ActiveUsers => "writing_users.json",
            Self::UserDetails => "user_details.json",
            Self::AdminUsers => "admin_ids.json",
        }
    }
}

/// Raw backing medium for named values.
///
/// `read` returns `Ok(None)` when the resource does not exist.
pub trait DurableStore: Send + Sync {
    fn read(&self, key: StoreKey) -> Result<Option<String>>;
    fn write(&self, key: StoreKey, payload: &str) -> Result<()>;
}

/// Loads `key`, falling back to `default` when the resource is absent, empty, or corrupt.
pub fn load_or_default<T>(store: &dyn DurableStore, key: StoreKey, default: T) -> T
where
    T: DeserializeOwned,
{
    let raw = match store.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::info!(key = key.as_str(), "durable value not found, using default");
            return default;
        }
        Err(error) => {
            tracing::error!(
                key = key.as_str(),
                error = %format!("{error:#}"),
                "failed to read durable value, using default"
            );
            return default;
        }
    };
    if raw.trim().is_empty() {
        tracing::warn!(key = key.as_str(), "durable value is empty, using default");
        return default;
    }
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(
                key = key.as_str(),
                error = %error,
                "failed to parse durable value, using default"
            );
            default
        }
    }
}

/// Serializes `value` and overwrites `key`. Returns `false` when the write was dropped.
pub fn save_or_log<T>(store: &dyn DurableStore, key: StoreKey, value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    let payload = match serde_json::to_string_pretty(value) {
        Ok(mut payload) => {
            payload.push('\n');
            payload
        }
        Err(error) => {
            tracing::error!(key = key.as_str(), error = %error, "failed to encode durable value");
            return false;
        }
    };
    match store.write(key, &payload) {
        Ok(()) => {
            tracing::debug!(key = key.as_str(), bytes = payload.len(), "durable value saved");
            true
        }
        Err(error) => {
            tracing::error!(
                key = key.as_str(),
                error = %format!("{error:#}"),
                "failed to save durable value; latest mutation is memory-only"
            );
            false
        }
    }
}

#[derive(Debug, Clone)]
/// One JSON file per [`StoreKey`] inside a state directory.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path_for(&self, key: StoreKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl DurableStore for JsonFileStore {
    fn read(&self, key: StoreKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => {
                Err(error).with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }

    fn write(&self, key: StoreKey, payload: &str) -> Result<()> {
        write_text_atomic(&self.path_for(key), payload)
    }
}

#[derive(Debug, Default)]
/// In-process store that counts writes; used by tests and dry runs.
pub struct MemoryStore {
    entries: Mutex<BTreeMap<StoreKey, String>>,
    write_counts: Mutex<BTreeMap<StoreKey, usize>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, key: StoreKey, payload: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, payload.into());
        }
    }

    pub fn raw(&self, key: StoreKey) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).cloned())
    }

    pub fn write_count(&self, key: StoreKey) -> usize {
        self.write_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(&key).copied())
            .unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.write_counts
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    /// Makes every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl DurableStore for MemoryStore {
    fn read(&self, key: StoreKey) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store mutex is poisoned"))?;
        Ok(entries.get(&key).cloned())
    }

    fn write(&self, key: StoreKey, payload: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated write failure for {}", key.as_str()));
        }
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store mutex is poisoned"))?
            .insert(key, payload.to_string());
        *self
            .write_counts
            .lock()
            .map_err(|_| anyhow!("memory store mutex is poisoned"))?
            .entry(key)
            .or_insert(0) += 1;
        Ok(())
    }
}

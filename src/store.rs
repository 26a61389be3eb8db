use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::EngineError;

pub const DEMO_USAGE_KEY: &str = "psia_demo_usage";
pub const MONTHLY_USAGE_KEY: &str = "psia_monthly_usage";
pub const USAGE_ANCHOR_KEY: &str = "psia_usage_anchor";
pub const RENEWAL_AT_KEY: &str = "psia_renewal_at";
pub const LAST_RESET_KEY: &str = "psia_last_reset";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), EngineError>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON object on disk, rewritten in full on every `set`.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Store file {} is corrupt, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened store {} with {} keys", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), EngineError> {
        let body = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
            .map_err(|e| EngineError::Store(format!("write {} failed: {}", key, e)))
    }
}

/// Reads an integer entry. Missing or unparsable values read as zero.
pub fn read_seconds(store: &dyn KeyValueStore, key: &str) -> u64 {
    match store.get(key) {
        Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
            warn!("Ignoring corrupt value {:?} under {}", raw, key);
            0
        }),
        None => 0,
    }
}

pub fn open_store(path: &str) -> Result<SharedStore, EngineError> {
    if path.trim().is_empty() {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(FileStore::open(path)?))
    }
}

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use tempfile::NamedTempFile;
use tracing::{trace, warn};

use super::errors::{StorageError, StorageResult};
use crate::models::{ConversationId, Timestamp};

/// Synchronous string key-value storage that survives restarts.
///
/// This is the seam for the client's durable storage; tests use
/// [`MemoryStore`] and the CLI uses [`FileStore`].
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    ///
    /// # Errors
    /// Returns the storage error when the backing medium cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns the storage error when the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by one JSON object on disk (`{"key": "value", ...}`).
///
/// Every write rewrites the document through a uniquely named temporary file
/// and a rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Store persisted at `path`; the file is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StorageResult<BTreeMap<String, String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(StorageError::io(&self.path, err)),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            key: self.path.display().to_string(),
            source,
        })
    }

    fn write_document(&self, document: &BTreeMap<String, String>) -> StorageResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
        let serialized =
            serde_json::to_string_pretty(document).map_err(|source| StorageError::Encode {
                key: self.path.display().to_string(),
                source,
            })?;
        // Each write gets its own temporary file, so concurrent writers never
        // share one.
        let mut tmp = NamedTempFile::new_in(parent).map_err(|err| StorageError::io(parent, err))?;
        tmp.write_all(serialized.as_bytes())
            .map_err(|err| StorageError::io(tmp.path(), err))?;
        tmp.persist(&self.path)
            .map_err(|err| StorageError::io(&self.path, err.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_document()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.read_document()?;
        document.insert(key.to_string(), value.to_string());
        self.write_document(&document)?;
        trace!(path = %self.path.display(), key, "persisted storage entry");
        Ok(())
    }
}

/// Last-read instants per conversation.
pub type WatermarkMap = BTreeMap<ConversationId, Timestamp>;

/// Storage key holding `user_id`'s watermark map.
#[must_use]
pub fn watermark_key(user_id: &str) -> String {
    format!("sidechat:last_read:{user_id}")
}

/// One user's watermark map inside a [`KeyValueStore`].
///
/// The map is serialised as a JSON object of conversation id to RFC 3339
/// instant under [`watermark_key`], so users sharing a store never see each
/// other's watermarks.
#[derive(Clone)]
pub struct WatermarkStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for WatermarkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkStore").field("key", &self.key).finish_non_exhaustive()
    }
}

impl WatermarkStore {
    pub fn new(store: Arc<dyn KeyValueStore>, user_id: &str) -> Self {
        Self {
            store,
            key: watermark_key(user_id),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the current map. Undecodable data is logged and treated as an
    /// empty map so the next write replaces it.
    pub fn load(&self) -> StorageResult<WatermarkMap> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(WatermarkMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(err) => {
                warn!(key = %self.key, error = %err, "ignoring corrupt watermark map");
                Ok(WatermarkMap::new())
            }
        }
    }

    pub fn save(&self, map: &WatermarkMap) -> StorageResult<()> {
        let serialized = serde_json::to_string(map).map_err(|source| StorageError::Encode {
            key: self.key.clone(),
            source,
        })?;
        self.store.set(&self.key, &serialized)
    }
}

//! Whole-document key/value persistence.
//!
//! Every store in the engine is a single JSON document under a fixed key. A
//! backend only has to read, replace and delete those documents; there are no
//! partial writes.

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

/// Reads `key` and parses it, falling back to `T::default()` when the key is
/// absent or anything goes wrong.
pub fn load_or_default<T, S>(storage: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: Storage + ?Sized,
{
    match storage.get(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(key, %err, "discarding unreadable document");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(err) => {
            warn!(key, %err, "failed to read document");
            T::default()
        }
    }
}

/// Serializes and writes `value`. Failures are logged and otherwise ignored.
pub fn save_or_log<T, S>(storage: &S, key: &str, value: &T)
where
    T: Serialize + ?Sized,
    S: Storage + ?Sized,
{
    let result = serde_json::to_string(value)
        .map_err(StorageError::from)
        .and_then(|raw| storage.set(key, &raw));
    if let Err(err) = result {
        warn!(key, %err, "failed to write document");
    }
}

pub fn remove_or_log<S: Storage + ?Sized>(storage: &S, key: &str) {
    if let Err(err) = storage.remove(key) {
        warn!(key, %err, "failed to remove document");
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys may contain `/` and `:`; keep everything in one flat directory.
        let file_name: String = key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// In-process storage. Can be told to fail so callers can exercise the
/// best-effort paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".into()));
        }
        Ok(())
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check()?;
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check()?;
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check()?;
        self.entries().remove(key);
        Ok(())
    }
}

/// Namespaces every key under `profile/<id>/` so several child profiles can
/// share one backend.
#[derive(Debug, Clone)]
pub struct ProfileStorage<S> {
    inner: S,
    prefix: String,
}

impl<S: Storage> ProfileStorage<S> {
    pub fn new(inner: S, profile_id: &str) -> Self {
        Self {
            inner,
            prefix: format!("profile/{profile_id}/"),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl<S: Storage> Storage for ProfileStorage<S> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(&self.scoped(key))
    }
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(&self.scoped(key), value)
    }
    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(&self.scoped(key))
    }
}

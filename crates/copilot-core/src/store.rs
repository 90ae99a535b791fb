//! Flat key/value persistence for the session.
//!
//! Values are JSON documents. The whole message list and the whole project
//! list are each stored under one key and rewritten on every change.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;

pub const MESSAGES_KEY: &str = "copilot_messages";
pub const API_KEY_KEY: &str = "copilot_api_key";
pub const PROJECTS_KEY: &str = "copilot_projects";

pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    fn remove(&self, key: &str) -> Result<(), Error>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        (**self).remove(key)
    }
}

pub fn load_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, Error> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<(), Error> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// One `<key>.json` file per key inside a data directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Store for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::storage(format!(
                "Failed to create directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        // Readers never observe a partially written document.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, used when nothing should touch disk.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, Error> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("Memory store lock poisoned"))
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));

        assert_eq!(store.get(MESSAGES_KEY).unwrap(), None);
        save_json(&store, PROJECTS_KEY, &vec!["a", "b"]).unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, PROJECTS_KEY).unwrap();
        assert_eq!(loaded, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(dir.path().join("data/copilot_projects.json").exists());
    }

    #[test]
    fn test_file_store_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.remove(MESSAGES_KEY).unwrap();

        store.set(MESSAGES_KEY, "[]").unwrap();
        store.remove(MESSAGES_KEY).unwrap();
        assert_eq!(store.get(MESSAGES_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_document_is_serialization_error() {
        let store = MemoryStore::new();
        store.set(MESSAGES_KEY, "{not json").unwrap();
        let result: Result<Option<Vec<String>>, Error> = load_json(&store, MESSAGES_KEY);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}

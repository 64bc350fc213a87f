//! Persisted client state.
//!
//! A tiny key-value abstraction for the few things the client remembers
//! across runs (chat history, accessibility preferences). Values are JSON
//! strings under fixed per-feature keys. Reading is forgiving: anything
//! that fails to parse is discarded with a warning and the caller gets
//! the type's default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::StorageError;

/// Key holding the support chat state.
pub const CHAT_STATE_KEY: &str = "hdtickets_chat_state";

/// Key holding accessibility preferences.
pub const ACCESSIBILITY_KEY: &str = "hd_tickets_accessibility";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Load `key` as `T`, falling back to `T::default()` when the key is
/// missing, unreadable or holds something that does not parse.
pub fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!(key, error = %e, "failed to read stored state, using defaults");
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "discarding unparsable stored state");
            T::default()
        }
    }
}

pub fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_owned(),
        source,
    })?;
    store.set(key, &raw)
}

// ── FileStore ────────────────────────────────────────────────────────

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_owned(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Write-then-rename so a crash never leaves a torn file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        debug!(key, path = %path.display(), "state saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_owned(),
                source,
            }),
        }
    }
}

// ── MemoryStore ──────────────────────────────────────────────────────

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

// ── Accessibility preferences ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessibilitySettings {
    pub high_contrast: bool,
    pub reduced_motion: bool,
    /// Percent of the base font size.
    pub font_size: u16,
    pub screen_reader_announcements: bool,
    pub show_floating_button: bool,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            high_contrast: false,
            reduced_motion: false,
            font_size: 100,
            screen_reader_announcements: true,
            show_floating_button: true,
        }
    }
}

impl AccessibilitySettings {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_or_default(store, ACCESSIBILITY_KEY)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        save(store, ACCESSIBILITY_KEY, self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_key_gives_default() {
        let store = MemoryStore::new();
        assert_eq!(
            AccessibilitySettings::load(&store),
            AccessibilitySettings::default()
        );
    }

    #[test]
    fn garbage_is_discarded() {
        let store = MemoryStore::new();
        store.set(ACCESSIBILITY_KEY, "{not json").unwrap();
        assert_eq!(
            AccessibilitySettings::load(&store),
            AccessibilitySettings::default()
        );
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let store = MemoryStore::new();
        store
            .set(ACCESSIBILITY_KEY, r#"{"highContrast": true, "fontSize": 125}"#)
            .unwrap();
        let settings = AccessibilitySettings::load(&store);
        assert!(settings.high_contrast);
        assert_eq!(settings.font_size, 125);
        assert!(settings.screen_reader_announcements);
        assert!(settings.show_floating_button);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AccessibilitySettings {
            reduced_motion: true,
            ..AccessibilitySettings::default()
        };
        settings.save(&FileStore::new(dir.path())).unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(AccessibilitySettings::load(&reopened), settings);
        assert!(dir.path().join("hd_tickets_accessibility.json").exists());

        reopened.remove(ACCESSIBILITY_KEY).unwrap();
        assert!(reopened.get(ACCESSIBILITY_KEY).unwrap().is_none());
    }

    #[test]
    fn file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}

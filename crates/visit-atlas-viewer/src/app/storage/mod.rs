//! Storage abstraction used by the app.
//!
//! A single trait, `StorageBackend`, with two implementations:
//!
//! - `WebLocalStorage` (compiled for `wasm32`) uses `window.localStorage`.
//! - `FileStorage` (native) keeps one JSON file mapping string keys to string
//!   values, in a per-user configuration directory unless `--storage-path` says
//!   otherwise. It is read once and rewritten synchronously on every change.
//!
//! Structured values go through the free `save_json_backend` / `load_json_backend`
//! helpers so the trait stays object-safe.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    #[cfg(not(target_arch = "wasm32"))]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Platform storage error: {0}")]
    Platform(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value store
pub trait StorageBackend {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Ok(None) when the key is missing
    fn get_string(&self, key: &str) -> StorageResult<Option<String>>;
}

pub fn save_json_backend<T: Serialize>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    match serde_json::to_string(value) {
        Ok(s) => backend.set_string(key, &s),
        Err(e) => Err(StorageError::Json(e.to_string())),
    }
}

pub fn load_json_backend<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get_string(key)? {
        Some(s) => match serde_json::from_str::<T>(&s) {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(StorageError::Json(e.to_string())),
        },
        None => Ok(None),
    }
}

/// Backend that forgets everything, used when the platform storage is unusable
#[derive(Default)]
pub struct MemoryStorage {
    inner: std::cell::RefCell<std::collections::HashMap<String, String>>,
}

impl StorageBackend for MemoryStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.inner.borrow().get(key).cloned())
    }
}

//
// Web implementation (localStorage)
//
#[cfg(target_arch = "wasm32")]
mod web_storage {
    use super::*;
    use wasm_bindgen::JsValue;
    use web_sys::Storage;

    fn local_storage() -> Result<Storage, StorageError> {
        web_sys::window()
            .ok_or_else(|| StorageError::Platform("no window".into()))?
            .local_storage()
            .map_err(|e| StorageError::Platform(format!("local_storage() failed: {:?}", e)))?
            .ok_or_else(|| StorageError::Platform("local_storage not available".into()))
    }

    /// Browser-backed localStorage implementation, keys are namespaced
    pub struct WebLocalStorage {
        prefix: &'static str,
    }

    impl WebLocalStorage {
        pub fn new() -> Self {
            WebLocalStorage {
                prefix: "visit-atlas.",
            }
        }

        fn key(&self, key: &str) -> String {
            format!("{}{}", self.prefix, key)
        }
    }

    impl StorageBackend for WebLocalStorage {
        fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
            let storage = local_storage()?;
            storage.set_item(&self.key(key), value).map_err(|e| {
                StorageError::Platform(format!("set_item error: {:?}", JsValue::from(e)))
            })?;
            Ok(())
        }

        fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
            let storage = local_storage()?;
            storage.get_item(&self.key(key)).map_err(|e| {
                StorageError::Platform(format!("get_item error: {:?}", JsValue::from(e)))
            })
        }
    }

    /// The path override has no meaning in the browser
    pub fn default_backend(
        _path: Option<std::path::PathBuf>,
    ) -> Result<Box<dyn StorageBackend>, StorageError> {
        local_storage()?;
        Ok(Box::new(WebLocalStorage::new()))
    }
}

//
// Native file-backed implementation
//
#[cfg(not(target_arch = "wasm32"))]
mod file_storage {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    pub struct FileStorage {
        path: PathBuf,
        inner: Mutex<BTreeMap<String, String>>,
    }

    impl FileStorage {
        /// - Windows: %APPDATA%/VisitAtlas/storage.json
        /// - Else: $HOME/.config/visit-atlas/storage.json
        fn default_storage_path() -> PathBuf {
            if cfg!(windows)
                && let Ok(appdata) = std::env::var("APPDATA")
            {
                return Path::new(&appdata).join("VisitAtlas").join("storage.json");
            }

            if let Ok(home) = std::env::var("HOME") {
                return Path::new(&home)
                    .join(".config")
                    .join("visit-atlas")
                    .join("storage.json");
            }

            Path::new(".").join("visit-atlas-storage.json")
        }

        pub fn new_with_path(path: Option<PathBuf>) -> Result<Self, StorageError> {
            let path = path.unwrap_or_else(Self::default_storage_path);

            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = fs::create_dir_all(parent)
            {
                return Err(StorageError::Io(format!(
                    "Failed to create storage parent directory: {}",
                    e
                )));
            }

            let mut map = BTreeMap::new();
            if path.exists() {
                let s = fs::read_to_string(&path)
                    .map_err(|e| StorageError::Io(format!("Failed to read storage file: {}", e)))?;
                if !s.trim().is_empty() {
                    map = serde_json::from_str(&s).map_err(|e| {
                        StorageError::Json(format!("Failed to parse storage JSON: {}", e))
                    })?;
                }
            }

            Ok(FileStorage {
                path,
                inner: Mutex::new(map),
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn flush_locked(&self, locked: &BTreeMap<String, String>) -> StorageResult<()> {
            let s = serde_json::to_string_pretty(locked)
                .map_err(|e| StorageError::Json(e.to_string()))?;
            fs::write(&self.path, s).map_err(|e| StorageError::Io(format!("write failed: {}", e)))
        }
    }

    impl StorageBackend for FileStorage {
        fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
            let mut guard = self
                .inner
                .lock()
                .map_err(|e| StorageError::Platform(format!("mutex poisoned: {:?}", e)))?;
            guard.insert(key.to_string(), value.to_string());
            self.flush_locked(&guard)
        }

        fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
            let guard = self
                .inner
                .lock()
                .map_err(|e| StorageError::Platform(format!("mutex poisoned: {:?}", e)))?;
            Ok(guard.get(key).cloned())
        }
    }

    pub fn default_backend(path: Option<PathBuf>) -> Result<Box<dyn StorageBackend>, StorageError> {
        let storage = FileStorage::new_with_path(path)?;
        tracing::info!("Persisting state to {}", storage.path().display());
        Ok(Box::new(storage))
    }
}

#[cfg(target_arch = "wasm32")]
pub use web_storage::default_backend as default_storage_backend;

#[cfg(not(target_arch = "wasm32"))]
pub use file_storage::default_backend as default_storage_backend;

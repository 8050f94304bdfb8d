use serde::{de::DeserializeOwned, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

pub const TOKEN_KEY: &str = "article_composer_token";
pub const VIEW_MODE_KEY: &str = "article_composer_view_mode";

/// Local durable storage failures. These never interrupt editing; callers log and move on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("local storage is unavailable")]
    Unavailable,
    #[error("local storage write failed: {0}")]
    Write(String),
    #[error("could not serialize draft: {0}")]
    Serialize(String),
}

/// A string key/value store with `localStorage` semantics.
pub trait DurableStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove_item(&self, key: &str) -> Result<(), PersistenceError>;
}

/// `window.localStorage`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserStorage;

impl BrowserStorage {
    fn storage() -> Result<web_sys::Storage, PersistenceError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or(PersistenceError::Unavailable)
    }
}

fn js_error_message(e: wasm_bindgen::JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{e:?}"))
}

impl DurableStorage for BrowserStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let storage = Self::storage()?;
        Ok(storage.get_item(key).ok().flatten())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let storage = Self::storage()?;
        // Quota errors surface here as a DOMException.
        storage
            .set_item(key, value)
            .map_err(|e| PersistenceError::Write(js_error_message(e)))
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        let storage = Self::storage()?;
        storage
            .remove_item(key)
            .map_err(|e| PersistenceError::Write(js_error_message(e)))
    }
}

/// In-process storage for hosts without `localStorage` and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<BTreeMap<String, String>>,
    writes: RefCell<usize>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes whose value exceeds `bytes`, like a full browser quota.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Default::default()
        }
    }

    /// Number of successful `set_item` calls.
    pub fn write_count(&self) -> usize {
        *self.writes.borrow()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }
}

impl DurableStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if let Some(limit) = self.quota_bytes {
            if value.len() > limit {
                return Err(PersistenceError::Write("QuotaExceededError".to_string()));
            }
        }
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        *self.writes.borrow_mut() += 1;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

impl<S: DurableStorage + ?Sized> DurableStorage for std::rc::Rc<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        (**self).remove_item(key)
    }
}

/// Unparseable entries read as absent.
pub fn load_json_from_storage<T: DeserializeOwned>(
    storage: &impl DurableStorage,
    key: &str,
) -> Option<T> {
    let json = storage.get_item(key).ok().flatten()?;
    match serde_json::from_str(&json) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring unparseable storage entry");
            None
        }
    }
}

pub fn save_json_to_storage<T: Serialize>(
    storage: &impl DurableStorage,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json =
        serde_json::to_string(value).map_err(|e| PersistenceError::Serialize(e.to_string()))?;
    storage.set_item(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip_json() {
        let storage = MemoryStorage::new();
        save_json_to_storage(&storage, "k", &vec![1, 2, 3]).expect("should save");
        let loaded: Option<Vec<i32>> = load_json_from_storage(&storage, "k");
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn test_memory_storage_quota() {
        let storage = MemoryStorage::with_quota(4);
        let err = storage.set_item("k", "too long").unwrap_err();
        assert!(matches!(err, PersistenceError::Write(_)));
        assert!(!storage.contains("k"));
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn test_load_json_ignores_garbage() {
        let storage = MemoryStorage::new();
        storage.set_item("k", "{not json").expect("should save");
        let loaded: Option<Vec<i32>> = load_json_from_storage(&storage, "k");
        assert!(loaded.is_none());
    }
}

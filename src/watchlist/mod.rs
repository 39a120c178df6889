//! Persisted watchlist of coin ids
//!
//! The application root constructs one [`WatchlistStore`] and hands out
//! references (`Arc<WatchlistStore>`) to whatever needs it. Every mutation
//! is written to storage before the call returns.

pub mod storage;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

use crate::{constants::WATCHLIST_STORAGE_KEY, error::StorageError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of coin ids the user follows
///
/// Ids are unique and keep their insertion order for the lifetime of the
/// store.
pub struct WatchlistStore {
    ids: Mutex<Vec<String>>,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl WatchlistStore {
    /// Loads the watchlist saved under the default key
    ///
    /// A missing, unreadable or corrupt value yields an empty watchlist.
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::load_with_key(storage, WATCHLIST_STORAGE_KEY)
    }

    /// Loads the watchlist saved under `key`
    pub fn load_with_key(storage: Arc<dyn KeyValueStorage>, key: &str) -> Self {
        let ids = match storage.load(key) {
            Ok(Some(raw)) => parse_ids(&raw).unwrap_or_else(|e| {
                tracing::warn!(key, error = %e, "Corrupt watchlist in storage, starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read watchlist, starting empty");
                Vec::new()
            }
        };

        tracing::info!(key, count = ids.len(), "Loaded watchlist");

        Self {
            ids: Mutex::new(ids),
            storage,
            key: key.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.ids.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Watchlist mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Adds `id`; returns false if it was already present
    pub fn add(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(false);
        }

        let mut ids = self.lock();
        if ids.iter().any(|existing| existing == id) {
            return Ok(false);
        }

        let mut next = ids.clone();
        next.push(id.to_string());
        self.persist(&next)?;
        *ids = next;

        tracing::debug!(id, "Added to watchlist");
        Ok(true)
    }

    /// Removes `id`; returns false if it was not present
    pub fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.trim();
        let mut ids = self.lock();
        if !ids.iter().any(|existing| existing == id) {
            return Ok(false);
        }

        let next: Vec<String> = ids.iter().filter(|existing| *existing != id).cloned().collect();
        self.persist(&next)?;
        *ids = next;

        tracing::debug!(id, "Removed from watchlist");
        Ok(true)
    }

    /// Adds `id` if absent, removes it otherwise; returns whether it is now watched
    ///
    /// The check and the write happen under one lock, so concurrent toggles
    /// alternate rather than both adding.
    pub fn toggle(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(false);
        }

        let mut ids = self.lock();
        let watched = ids.iter().any(|existing| existing == id);

        let next: Vec<String> = if watched {
            ids.iter().filter(|existing| *existing != id).cloned().collect()
        } else {
            ids.iter().cloned().chain(std::iter::once(id.to_string())).collect()
        };
        self.persist(&next)?;
        *ids = next;

        tracing::debug!(id, watched = !watched, "Toggled watchlist entry");
        Ok(!watched)
    }

    /// True if `id` is watched
    pub fn contains(&self, id: &str) -> bool {
        let id = id.trim();
        self.lock().iter().any(|existing| existing == id)
    }

    /// Watched ids in insertion order
    pub fn all(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of watched ids
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn persist(&self, ids: &[String]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(ids)?;
        self.storage.save(&self.key, &raw).map_err(|e| {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist watchlist");
            e
        })
    }
}

/// Parses a stored id array, dropping blanks and duplicates
fn parse_ids(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    let stored: Vec<String> = serde_json::from_str(raw)?;
    let mut seen = HashSet::new();
    Ok(stored
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnlyStorage;

    impl KeyValueStorage for ReadOnlyStorage {
        fn load(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(Some(r#"["bitcoin"]"#.to_string()))
        }

        fn save(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = WatchlistStore::load(Arc::new(MemoryStorage::new()));

        assert!(store.add("bitcoin").unwrap());
        assert!(!store.add("bitcoin").unwrap());

        assert_eq!(store.len(), 1);
        assert!(store.contains("bitcoin"));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let store = WatchlistStore::load(Arc::new(MemoryStorage::new()));
        store.add("bitcoin").unwrap();

        assert!(!store.remove("ethereum").unwrap());
        assert_eq!(store.all(), vec!["bitcoin"]);

        assert!(store.remove("bitcoin").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_round_trips_through_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let store = WatchlistStore::load(storage.clone());
        store.add("bitcoin").unwrap();
        store.add("solana").unwrap();
        store.add("ethereum").unwrap();
        store.remove("solana").unwrap();

        assert_eq!(
            storage.load(WATCHLIST_STORAGE_KEY).unwrap().as_deref(),
            Some(r#"["bitcoin","ethereum"]"#)
        );

        let reloaded = WatchlistStore::load(storage);
        assert_eq!(reloaded.all(), store.all());
    }

    #[test]
    fn test_file_backed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatchlistStore::load(Arc::new(FileStorage::new(dir.path())));
        store.add("cardano").unwrap();
        store.add("polkadot").unwrap();

        let reloaded = WatchlistStore::load(Arc::new(FileStorage::new(dir.path())));
        assert_eq!(reloaded.all(), vec!["cardano", "polkadot"]);
    }

    #[test]
    fn test_corrupt_or_missing_value_loads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        assert!(WatchlistStore::load(storage.clone()).is_empty());

        storage.save(WATCHLIST_STORAGE_KEY, "{not json").unwrap();
        assert!(WatchlistStore::load(storage.clone()).is_empty());

        storage.save(WATCHLIST_STORAGE_KEY, r#"{"ids":["bitcoin"]}"#).unwrap();
        assert!(WatchlistStore::load(storage).is_empty());
    }

    #[test]
    fn test_duplicates_in_storage_are_dropped() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save(WATCHLIST_STORAGE_KEY, r#"["bitcoin"," bitcoin","","solana"]"#)
            .unwrap();

        let store = WatchlistStore::load(storage);
        assert_eq!(store.all(), vec!["bitcoin", "solana"]);
    }

    #[test]
    fn test_failed_write_leaves_set_unchanged() {
        let store = WatchlistStore::load(Arc::new(ReadOnlyStorage));

        assert!(store.add("solana").is_err());
        assert!(store.remove("bitcoin").is_err());
        assert_eq!(store.all(), vec!["bitcoin"]);
    }

    #[test]
    fn test_concurrent_toggles_alternate() {
        let store = Arc::new(WatchlistStore::load(Arc::new(MemoryStorage::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.toggle("bitcoin").unwrap())
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|now_watched| **now_watched).count(), 4);
        assert!(!store.contains("bitcoin"));
    }

    #[test]
    fn test_failed_toggle_leaves_set_unchanged() {
        let store = WatchlistStore::load(Arc::new(ReadOnlyStorage));

        assert!(store.toggle("bitcoin").is_err());
        assert!(store.toggle("solana").is_err());
        assert_eq!(store.all(), vec!["bitcoin"]);
    }

    #[test]
    fn test_toggle() {
        let store = WatchlistStore::load(Arc::new(MemoryStorage::new()));
        assert!(store.toggle("dogecoin").unwrap());
        assert!(store.contains("dogecoin"));
        assert!(!store.toggle("dogecoin").unwrap());
        assert!(!store.contains("dogecoin"));
    }
}

//! Host-side key/value stores that repository backends sit on.
//!
//! Defines [`NativeStore`], the innermost storage layer: whatever the host
//! actually persists to (a browser object store, a SQL table, a plugin
//! database). Values are serialized JSON documents. [`MemoryStore`] is the
//! in-process implementation used by headless hosts and tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

/// Synchronous string key/value store provided by the host environment.
///
/// Wrapped in `Arc<dyn NativeStore>` and shared by the repository backend
/// built on top of it.
pub trait NativeStore: Send + Sync + 'static {
    /// Retrieve a value by key, or `None` if not present.
    ///
    /// # Errors
    ///
    /// Host I/O failure.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Insert or replace a value. Returns the previous value if any.
    ///
    /// # Errors
    ///
    /// Host I/O failure or quota exhaustion.
    fn put(&self, key: &str, value: String) -> anyhow::Result<Option<String>>;

    /// Remove a value, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Host I/O failure.
    fn remove(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// All keys starting with `prefix`, in no particular order.
    ///
    /// # Errors
    ///
    /// Host I/O failure.
    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Check if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`NativeStore`] backed by [`DashMap`].
///
/// An optional entry quota makes inserts of new keys fail once reached,
/// which is how hosts with bounded storage report exhaustion.
pub struct MemoryStore {
    entries: DashMap<String, String>,
    quota: Option<usize>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Creates a new, empty, unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            quota: None,
            writes: AtomicUsize::new(0),
        }
    }

    /// Creates a store that refuses new keys beyond `max_entries`.
    #[must_use]
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            quota: Some(max_entries),
            ..Self::new()
        }
    }

    /// Number of successful `put` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    fn put(&self, key: &str, value: String) -> anyhow::Result<Option<String>> {
        if let Some(quota) = self.quota {
            if !self.entries.contains_key(key) && self.entries.len() >= quota {
                anyhow::bail!("storage quota of {quota} entries exceeded");
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.insert(key.to_string(), value))
    }

    fn remove(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.remove(key).map(|(_, v)| v))
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_round_trip() {
        let store = MemoryStore::new();
        assert!(store.put("db/User/1", "{}".to_string()).unwrap().is_none());
        assert_eq!(store.get("db/User/1").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.remove("db/User/1").unwrap().as_deref(), Some("{}"));
        assert!(store.get("db/User/1").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn keys_with_prefix_filters() {
        let store = MemoryStore::new();
        store.put("db/User/1", "a".into()).unwrap();
        store.put("db/User/2", "b".into()).unwrap();
        store.put("db/Order/1", "c".into()).unwrap();

        let mut keys = store.keys_with_prefix("db/User/").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["db/User/1", "db/User/2"]);
    }

    #[test]
    fn quota_refuses_new_keys_only() {
        let store = MemoryStore::with_quota(1);
        store.put("a", "1".into()).unwrap();
        assert!(store.put("b", "2".into()).is_err());
        assert!(store.put("a", "3".into()).is_ok());
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 2);
    }
}

//! In-memory index of cached entries
//!
//! The store itself is not synchronised; [`crate::ImageCache`] keeps it behind
//! the same lock that serialises writes to the cache directory.

use crate::types::CacheEntry;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct EntryStore {
    entries: HashMap<String, CacheEntry>,
}

impl EntryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite, returning the previous entry for the key
    pub(crate) fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.key.clone(), entry)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Bump the last access time. Returns false if the key is gone.
    pub(crate) fn touch(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = now;
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
pub(crate) fn test_entry(key: &str, last_access: DateTime<Utc>) -> CacheEntry {
    CacheEntry {
        key: key.to_string(),
        path: std::path::PathBuf::from(format!("/cache/{}.cache", key)),
        content_type: "image/jpeg".to_string(),
        size: 4,
        created_at: last_access,
        last_access,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_insert_and_get() {
        let mut store = EntryStore::new();
        let now = Utc::now();
        assert!(store.insert(test_entry("1", now)).is_none());

        let entry = store.get("1").unwrap();
        assert_eq!(entry.key, "1");
        assert_eq!(store.len(), 1);
        assert!(store.get("2").is_none());
    }

    #[test]
    fn test_insert_overwrites_existing_key() {
        let mut store = EntryStore::new();
        let now = Utc::now();
        store.insert(test_entry("1", now));

        let mut replacement = test_entry("1", now + Duration::seconds(5));
        replacement.size = 99;
        let previous = store.insert(replacement).unwrap();

        assert_eq!(previous.size, 4);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").unwrap().size, 99);
        assert_eq!(store.total_size(), 99);
    }

    #[test]
    fn test_touch_updates_last_access_only() {
        let mut store = EntryStore::new();
        let created = Utc::now();
        store.insert(test_entry("1", created));

        let later = created + Duration::minutes(3);
        assert!(store.touch("1", later));

        let entry = store.get("1").unwrap();
        assert_eq!(entry.last_access, later);
        assert_eq!(entry.created_at, created);
        assert!(!store.touch("missing", later));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = EntryStore::new();
        store.insert(test_entry("1", Utc::now()));

        assert!(store.remove("1").is_some());
        assert!(store.remove("1").is_none());
        assert!(!store.contains("1"));
        assert_eq!(store.len(), 0);
    }
}

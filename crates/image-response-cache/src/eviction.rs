//! Eviction policy: capacity-bounded LRU and idle-time expiration

use crate::store::EntryStore;
use crate::types::CacheEntry;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether admitting `key` requires evicting a victim first.
///
/// Overwriting an existing key never grows the store, so it never evicts.
pub(crate) fn needs_eviction(store: &EntryStore, key: &str, capacity: usize) -> bool {
    !store.contains(key) && store.len() >= capacity
}

/// The least recently accessed entry. Ties go to the smallest key.
pub(crate) fn lru_victim(store: &EntryStore) -> Option<String> {
    store
        .iter()
        .min_by(|a, b| {
            a.last_access
                .cmp(&b.last_access)
                .then_with(|| a.key.cmp(&b.key))
        })
        .map(|e| e.key.clone())
}

/// Whether `entry` has been idle for strictly longer than `ttl` as of `now`
pub(crate) fn is_expired(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(entry.last_access)
        .to_std()
        .is_ok_and(|idle| idle > ttl)
}

/// Keys of expired entries, in key order
pub(crate) fn expired_keys(store: &EntryStore, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
    let mut keys: Vec<String> = store
        .iter()
        .filter(|e| is_expired(e, now, ttl))
        .map(|e| e.key.clone())
        .collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_entry;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_lru_victim_picks_oldest_access() {
        let mut store = EntryStore::new();
        let now = Utc::now();
        store.insert(test_entry("a", now));
        store.insert(test_entry("b", now - ChronoDuration::seconds(30)));
        store.insert(test_entry("c", now - ChronoDuration::seconds(10)));

        assert_eq!(lru_victim(&store).as_deref(), Some("b"));
    }

    #[test]
    fn test_lru_victim_tie_breaks_by_key() {
        let mut store = EntryStore::new();
        let now = Utc::now();
        store.insert(test_entry("zeta", now));
        store.insert(test_entry("alpha", now));
        store.insert(test_entry("mid", now));

        assert_eq!(lru_victim(&store).as_deref(), Some("alpha"));
    }

    #[test]
    fn test_lru_victim_empty_store() {
        assert!(lru_victim(&EntryStore::new()).is_none());
    }

    #[test]
    fn test_needs_eviction_only_for_new_keys_at_capacity() {
        let mut store = EntryStore::new();
        let now = Utc::now();
        store.insert(test_entry("a", now));
        store.insert(test_entry("b", now));

        assert!(needs_eviction(&store, "c", 2));
        assert!(!needs_eviction(&store, "a", 2));
        assert!(!needs_eviction(&store, "c", 3));
    }

    #[test]
    fn test_expired_keys_uses_strict_ttl_boundary() {
        let mut store = EntryStore::new();
        let now = Utc::now();
        let ttl = Duration::from_secs(600);
        store.insert(test_entry("stale", now - ChronoDuration::seconds(601)));
        store.insert(test_entry("fresh", now - ChronoDuration::seconds(599)));
        store.insert(test_entry("older", now - ChronoDuration::hours(2)));

        assert_eq!(expired_keys(&store, now, ttl), vec!["older", "stale"]);
    }

    #[test]
    fn test_future_access_is_not_expired() {
        let now = Utc::now();
        let entry = test_entry("a", now + ChronoDuration::seconds(5));
        assert!(!is_expired(&entry, now, Duration::ZERO));
    }
}

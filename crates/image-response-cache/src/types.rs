//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metadata for a cached image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Bumped on every hit; drives both LRU eviction and TTL expiration.
    pub last_access: DateTime<Utc>,
}

/// A cache hit: the stored bytes plus the content type they were served with
#[derive(Debug, Clone, PartialEq)]
pub struct CachedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Configuration for the image cache
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub cache_dir: PathBuf,
    pub max_cached_images: usize,
    /// Maximum idle time since last access before an entry is swept.
    pub cache_expiration: Duration,
    /// Responses larger than this are forwarded without being cached.
    pub max_body_bytes: usize,
    /// Matched as case-insensitive prefixes of the response `Content-Type`.
    pub cacheable_content_types: Vec<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("ImageCache"),
            max_cached_images: 100,
            cache_expiration: Duration::from_secs(30 * 60),
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            cacheable_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/bmp".to_string(),
            ],
        }
    }
}

impl CacheOptions {
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_max_cached_images(mut self, max_cached_images: usize) -> Self {
        self.max_cached_images = max_cached_images;
        self
    }

    pub fn with_cache_expiration(mut self, cache_expiration: Duration) -> Self {
        self.cache_expiration = cache_expiration;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Whether a response with this `Content-Type` should be cached
    pub fn is_cacheable(&self, content_type: &str) -> bool {
        let content_type = content_type.trim();
        self.cacheable_content_types.iter().any(|prefix| {
            content_type
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CacheOptions::default();
        assert_eq!(options.cache_dir, PathBuf::from("ImageCache"));
        assert_eq!(options.max_cached_images, 100);
        assert_eq!(options.cache_expiration, Duration::from_secs(1800));
        assert_eq!(options.cacheable_content_types.len(), 3);
    }

    #[test]
    fn test_is_cacheable_matches_prefix_case_insensitively() {
        let options = CacheOptions::default();
        assert!(options.is_cacheable("image/jpeg"));
        assert!(options.is_cacheable("IMAGE/PNG"));
        assert!(options.is_cacheable("image/bmp; charset=binary"));
        assert!(!options.is_cacheable("text/html; charset=utf-8"));
        assert!(!options.is_cacheable("image/gif"));
        assert!(!options.is_cacheable("image"));
        assert!(!options.is_cacheable(""));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 0);
    }

    #[test]
    fn test_cache_entry_serialization() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "42".to_string(),
            path: PathBuf::from("/cache/abc123.cache"),
            content_type: "image/jpeg".to_string(),
            size: 12345,
            created_at: now,
            last_access: now,
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("image/jpeg"));
        assert!(json.contains("12345"));

        let deserialized: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, entry);
    }
}

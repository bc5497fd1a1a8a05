//! The image cache service: index, eviction and file storage behind one lock

use crate::disk::DiskStore;
use crate::error::{CacheError, Result};
use crate::eviction;
use crate::store::EntryStore;
use crate::types::{CacheEntry, CacheOptions, CacheStats, CachedImage};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Disk-backed image cache with in-memory metadata.
///
/// The index lock also covers the cache directory: every mutation of the
/// directory happens while the write lock is held, and hits read their file
/// under the read lock, so an eviction can never delete a file mid-read.
pub struct ImageCache {
    options: CacheOptions,
    disk: DiskStore,
    index: RwLock<EntryStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

pub type SharedCache = Arc<ImageCache>;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of the shared-lock half of a lookup
enum Probe {
    Missing,
    Expired(DateTime<Utc>),
    Unreadable(DateTime<Utc>, CacheError),
    Found(CachedImage),
}

impl ImageCache {
    /// Create a new image cache. Call [`ImageCache::init`] before use.
    pub fn new(options: CacheOptions) -> Self {
        let disk = DiskStore::new(options.cache_dir.clone());
        Self {
            options,
            disk,
            index: RwLock::new(EntryStore::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Validate options, create the cache directory and drop orphaned files.
    ///
    /// Any failure here is a configuration error and should stop startup.
    pub async fn init(&self) -> Result<()> {
        if self.options.max_cached_images == 0 {
            return Err(CacheError::Config(
                "max_cached_images must be at least 1".to_string(),
            ));
        }

        self.disk.init().await.map_err(|e| {
            CacheError::Config(format!(
                "cannot create cache directory {:?}: {}",
                self.disk.dir(),
                e
            ))
        })?;

        let index = self.index.write().await;
        let owned: HashSet<PathBuf> = index.iter().map(|e| e.path.clone()).collect();
        match self.disk.purge_orphans(&owned).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed orphaned cache files"),
            Err(e) => warn!(error = %e, "Failed to scan cache directory for orphans"),
        }
        drop(index);

        info!(
            cache_dir = ?self.disk.dir(),
            max_cached_images = self.options.max_cached_images,
            expiration_secs = self.options.cache_expiration.as_secs(),
            "Image cache initialized"
        );
        Ok(())
    }

    /// Serve a cached image and mark it as recently used
    pub async fn lookup(&self, key: &str) -> Option<CachedImage> {
        self.lookup_at(key, Utc::now()).await
    }

    pub(crate) async fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> Option<CachedImage> {
        let index = self.index.read().await;
        let probe = match index.get(key) {
            None => Probe::Missing,
            Some(entry) if eviction::is_expired(entry, now, self.options.cache_expiration) => {
                Probe::Expired(entry.created_at)
            }
            Some(entry) => match self.disk.read(&entry.path).await {
                Ok(bytes) => Probe::Found(CachedImage {
                    bytes,
                    content_type: entry.content_type.clone(),
                }),
                Err(e) => Probe::Unreadable(entry.created_at, e),
            },
        };
        drop(index);

        match probe {
            Probe::Found(image) => {
                // The entry may have been evicted since the read; the bytes
                // are still a complete copy, so serve them regardless.
                self.index.write().await.touch(key, now);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, size = image.bytes.len(), "Cache hit");
                Some(image)
            }
            Probe::Expired(created_at) => {
                debug!(key, "Cache entry expired");
                if self.evict_if_same(key, created_at).await {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Probe::Unreadable(created_at, e) => {
                match e {
                    CacheError::NotFound(_) => {
                        debug!(key, "Cached file missing, removing stale entry")
                    }
                    e => warn!(key, error = %e, "Failed to read cached file, removing entry"),
                }
                self.evict_if_same(key, created_at).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Probe::Missing => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an image, evicting the least recently used entry when full
    pub async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<CacheEntry> {
        self.put_at(key, data, content_type, Utc::now()).await
    }

    pub(crate) async fn put_at(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let mut index = self.index.write().await;

        if eviction::needs_eviction(&index, key, self.options.max_cached_images) {
            if let Some(victim) = eviction::lru_victim(&index) {
                self.evict_locked(&mut index, &victim).await?;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %victim, "Evicted least recently used cache entry");
            }
        }

        let path = self.disk.write(key, data).await?;
        let entry = CacheEntry {
            key: key.to_string(),
            path,
            content_type: content_type.to_string(),
            size: data.len() as u64,
            created_at: now,
            last_access: now,
        };
        index.insert(entry.clone());

        debug!(key, size = entry.size, entries = index.len(), "Cached image");
        Ok(entry)
    }

    /// Remove an entry and its file. Returns false if there was nothing to remove.
    pub async fn evict(&self, key: &str) -> bool {
        let mut index = self.index.write().await;
        match self.evict_locked(&mut index, key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "Failed to evict cache entry");
                false
            }
        }
    }

    /// Remove every entry idle for longer than the configured expiration
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut index = self.index.write().await;
        let expired = eviction::expired_keys(&index, now, self.options.cache_expiration);

        let mut removed = 0;
        for key in &expired {
            match self.evict_locked(&mut index, key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to remove expired cache entry"),
            }
        }

        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, remaining = index.len(), "Swept expired cache entries");
        }
        removed
    }

    /// Run [`ImageCache::sweep_expired`] on a fixed interval.
    ///
    /// The task ends on its own once the last handle to the cache is dropped.
    /// Periods below one millisecond are raised to one millisecond.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let every = every.max(MIN_SWEEP_INTERVAL);
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Image cache dropped, stopping sweeper");
                    break;
                };
                cache.sweep_expired().await;
            }
        })
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.index.read().await.contains(key)
    }

    /// Entry metadata, without counting as an access
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.index.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;
        CacheStats {
            entries: index.len(),
            total_size: index.total_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    /// Evict `key` only if it is still the entry observed under the read lock
    async fn evict_if_same(&self, key: &str, created_at: DateTime<Utc>) -> bool {
        let mut index = self.index.write().await;
        if index.get(key).map(|e| e.created_at) != Some(created_at) {
            return false;
        }
        match self.evict_locked(&mut index, key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "Failed to evict stale cache entry");
                false
            }
        }
    }

    /// Delete the file, then drop the entry. The entry stays if the delete fails.
    async fn evict_locked(&self, index: &mut EntryStore, key: &str) -> Result<bool> {
        let Some(path) = index.get(key).map(|e| e.path.clone()) else {
            return Ok(false);
        };
        self.disk.delete(&path).await?;
        index.remove(key);
        Ok(true)
    }
}

//! Disk-backed image response cache
//!
//! Caches image-bearing HTTP responses on local disk, keyed by the final
//! segment of the request path. The in-memory index and the cache directory
//! are guarded by one lock so that an indexed entry always has its file.
//! Capacity is bounded with least-recently-accessed eviction and idle entries
//! expire after a configurable TTL.
//!
//! The [`middleware`] module exposes the cache as an axum middleware that
//! answers hits straight from disk without running the downstream handler.

mod cache;
mod disk;
mod error;
mod eviction;
pub mod middleware;
mod store;
mod types;

pub use cache::{ImageCache, SharedCache};
pub use error::{CacheError, Result};
pub use types::{CacheEntry, CacheOptions, CacheStats, CachedImage};

//! Catalog Image Server - category pictures behind a disk image cache
//!
//! Serves category pictures and a small category listing. Image responses
//! are cached on local disk so repeated fetches skip picture loading.

mod error;
mod pictures;
mod server;
mod types;

use crate::error::{Result, ServerError};
use crate::pictures::PictureStore;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServerConfig;
use image_response_cache::{CacheOptions, ImageCache};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("catalog_image_server=info".parse()?)
        .add_directive("image_response_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Catalog Image Server...");

    // Load configuration from environment
    let config = load_config();
    info!("Port: {}", config.port);
    info!("Picture dir: {:?}", config.picture_dir);
    info!("Cache dir: {:?}", config.cache.cache_dir);
    info!("Max cached images: {}", config.cache.max_cached_images);
    info!(
        "Cache expiration: {} seconds",
        config.cache.cache_expiration.as_secs()
    );

    // A cache that cannot be set up is fatal
    let cache = Arc::new(ImageCache::new(config.cache));
    cache.init().await?;
    let _sweeper = cache.spawn_sweeper(config.sweep_interval);

    let pictures = PictureStore::new(config.picture_dir);

    // Create shared state
    let state: SharedState = Arc::new(ServerState::new(cache, pictures));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ServerError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> ServerConfig {
    let defaults = ServerConfig::default();

    let port = env_parse("PORT").unwrap_or(defaults.port);

    let picture_dir = std::env::var("PICTURE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.picture_dir);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache.cache_dir);

    let max_cached_images =
        env_parse("MAX_CACHED_IMAGES").unwrap_or(defaults.cache.max_cached_images);

    let cache_expiration = env_parse("CACHE_EXPIRATION_SECS")
        .map(Duration::from_secs)
        .unwrap_or(defaults.cache.cache_expiration);

    let max_body_bytes = env_parse("CACHE_MAX_BODY_BYTES").unwrap_or(defaults.cache.max_body_bytes);

    let sweep_interval = env_parse("CACHE_SWEEP_INTERVAL_SECS")
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(defaults.sweep_interval);

    ServerConfig {
        port,
        picture_dir,
        cache: CacheOptions {
            cache_dir,
            max_cached_images,
            cache_expiration,
            max_body_bytes,
            ..defaults.cache
        },
        sweep_interval,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

//! Core types for the catalog image server

use image_response_cache::{CacheOptions, CacheStats};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub picture_dir: PathBuf,
    pub cache: CacheOptions,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            picture_dir: PathBuf::from("./pictures"),
            cache: CacheOptions::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.picture_dir, PathBuf::from("./pictures"));
        assert_eq!(config.cache.cache_dir, PathBuf::from("ImageCache"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            cache: CacheStats {
                entries: 12,
                total_size: 50_000,
                hits: 500,
                misses: 50,
                evictions: 3,
                expirations: 7,
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("3600"));
        assert!(json.contains("\"evictions\":3"));
    }
}

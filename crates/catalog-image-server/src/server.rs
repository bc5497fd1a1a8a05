//! HTTP server for the catalog
//!
//! Provides /health, /categories and /images/:id. Only the image route sits
//! behind the image response cache.

use crate::pictures::PictureStore;
use crate::types::HealthResponse;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use image_response_cache::{middleware::intercept, SharedCache};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: SharedCache,
    pub pictures: PictureStore,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: SharedCache, pictures: PictureStore) -> Self {
        Self {
            cache,
            pictures,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/images/{id}", get(category_image))
        .route_layer(from_fn_with_state(Arc::clone(&state.cache), intercept))
        .route("/health", get(health))
        .route("/categories", get(categories))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache_stats,
    })
}

/// Category picture by id
async fn category_image(State(state): State<SharedState>, Path(id): Path<u32>) -> Response {
    match state.pictures.load(id).await {
        Ok(Some(picture)) => (
            [(header::CONTENT_TYPE, picture.content_type)],
            picture.bytes,
        )
            .into_response(),
        Ok(None) => not_found("Image not found"),
        Err(e) => {
            error!(id, error = %e, "Failed to load category picture");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Categories that have pictures, linking to their images
async fn categories(State(state): State<SharedState>) -> Response {
    let ids = match state.pictures.ids().await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Failed to list category pictures");
            Vec::new()
        }
    };

    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                "<li><a href=\"/images/{0}\" target=\"_blank\">Category {0}</a></li>",
                id
            )
        })
        .collect();

    Html(format!(
        "<!DOCTYPE html><html><body><h1>Categories</h1><ul>{}</ul></body></html>",
        items
    ))
    .into_response()
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

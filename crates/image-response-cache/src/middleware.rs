//! Axum middleware that serves and captures cached image responses
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/images/{id}", get(category_image))
//!     .layer(axum::middleware::from_fn_with_state(cache, intercept));
//! ```

use crate::cache::SharedCache;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::{stream, StreamExt};
use tracing::{debug, warn};

pub const X_CACHE: &str = "x-cache";

/// Cache key for a request path: its last non-empty segment.
///
/// The query string is not part of the path, so `/images/42?w=100` and
/// `/images/42` share a key. Route prefixes are ignored too: `/other/42`
/// maps to the same key as `/images/42` and is served its cached image.
pub fn cache_key(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

/// Serve hits from disk, otherwise run downstream and cache image responses
pub async fn intercept(
    State(cache): State<SharedCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }
    let Some(key) = cache_key(request.uri().path()).map(str::to_owned) else {
        return next.run(request).await;
    };

    if let Some(image) = cache.lookup(&key).await {
        let mut response = (
            StatusCode::OK,
            [(header::CONTENT_TYPE, image.content_type)],
            image.bytes,
        )
            .into_response();
        response
            .headers_mut()
            .insert(X_CACHE, HeaderValue::from_static("HIT"));
        return response;
    }

    let response = next.run(request).await;
    if !response.status().is_success() || response.headers().contains_key(header::CONTENT_ENCODING)
    {
        return response;
    }

    let Some(content_type) = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| cache.options().is_cacheable(ct))
        .map(str::to_owned)
    else {
        return response;
    };

    let limit = cache.options().max_body_bytes;
    let (mut parts, body) = response.into_parts();
    parts
        .headers
        .insert(X_CACHE, HeaderValue::from_static("MISS"));

    if declared_length(&parts.headers).is_some_and(|len| len > limit) {
        debug!(key = %key, limit, "Image too large to cache");
        return Response::from_parts(parts, body);
    }

    match buffer_body(body, limit).await {
        Buffered::Complete(bytes) => {
            match cache.put(&key, &bytes, &content_type).await {
                Ok(_) => {
                    cache.sweep_expired().await;
                }
                Err(e) => warn!(key = %key, error = %e, "Failed to cache image"),
            }
            Response::from_parts(parts, Body::from(bytes))
        }
        Buffered::Passthrough(body) => {
            debug!(key = %key, limit, "Image body exceeded buffer limit, not caching");
            Response::from_parts(parts, body)
        }
    }
}

fn declared_length(headers: &axum::http::HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

enum Buffered {
    Complete(Bytes),
    /// Over the limit or failed mid-stream; replays what was read, then the rest
    Passthrough(Body),
}

async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = data.next().await {
        match chunk {
            Ok(chunk) => {
                total += chunk.len();
                chunks.push(chunk);
                if total > limit {
                    let head = stream::iter(chunks.into_iter().map(Ok));
                    return Buffered::Passthrough(Body::from_stream(head.chain(data)));
                }
            }
            Err(e) => {
                warn!(error = %e, "Downstream body failed while buffering");
                let head = stream::iter(chunks.into_iter().map(Ok));
                let tail = stream::once(async move { Err::<Bytes, _>(e) });
                return Buffered::Passthrough(Body::from_stream(head.chain(tail)));
            }
        }
    }

    let mut buf = Vec::with_capacity(total);
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    Buffered::Complete(Bytes::from(buf))
}

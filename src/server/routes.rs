//! Request handling for the session directory.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hlscast_common::paths::{content_type_for, is_segment_file};
use hlscast_common::SegmentLayout;
use std::io::SeekFrom;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::watch::is_segment_complete;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(Debug)]
struct ServeRoot {
    root: PathBuf,
    layout: SegmentLayout,
}

/// Router serving the manifest and segments found directly inside `root`.
///
/// `root` should already be canonical; anything that resolves outside it is
/// answered with 404.
pub fn create_router(root: PathBuf, layout: SegmentLayout) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any);

    let state = Arc::new(ServeRoot { root, layout });

    Router::new()
        .route("/:file", get(serve_file).options(preflight))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::CACHE_CONTROL, NO_CACHE)])
}

/// Resolve a request path to a file inside the root, or `None`.
async fn resolve_file(state: &ServeRoot, file: &str) -> Option<(PathBuf, &'static str)> {
    // Exactly one plain component: no separators, no `..`, no absolute paths
    let requested = std::path::Path::new(file);
    let mut components = requested.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return None,
    }

    let content_type = content_type_for(requested)?;

    if is_segment_file(requested) && !is_segment_complete(&state.root, &state.layout, file).await {
        return None;
    }

    let canonical = tokio::fs::canonicalize(state.root.join(file)).await.ok()?;
    if !canonical.starts_with(&state.root) {
        tracing::warn!(file, "Rejected request resolving outside the session directory");
        return None;
    }

    Some((canonical, content_type))
}

async fn serve_file(
    State(state): State<Arc<ServeRoot>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let (path, content_type) = resolve_file(&state, &file)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    // Size from the open handle so an atomically replaced manifest stays consistent
    let mut file = File::open(&path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    let metadata = file.metadata().await.map_err(|_| StatusCode::NOT_FOUND)?;
    if !metadata.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }
    let file_size = metadata.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| parse_range_header(s, file_size));

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, HeaderValue::from_static(content_type))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, NO_CACHE);

    match range {
        Some((start, end)) => {
            let length = end - start + 1;

            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            let body = Body::from_stream(ReaderStream::new(file.take(length)));

            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                )
                .body(body)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        }
        None => {
            let body = Body::from_stream(ReaderStream::new(file.take(file_size)));

            builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, file_size.to_string())
                .body(body)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Parse an HTTP Range header into an inclusive byte range.
///
/// Supports `bytes=0-499`, `bytes=500-` and `bytes=-500`. Multi-range and
/// unsatisfiable requests yield `None` and are served in full.
fn parse_range_header(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let header = header.strip_prefix("bytes=")?;
    if file_size == 0 {
        return None;
    }

    let (start, end) = header.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, false) => {
            let suffix_len: u64 = end.parse().ok()?;
            if suffix_len == 0 {
                return None;
            }
            Some((file_size.saturating_sub(suffix_len), file_size - 1))
        }
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            (start < file_size).then_some((start, file_size - 1))
        }
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            let end = end.min(file_size - 1);
            (start < file_size && start <= end).then_some((start, end))
        }
        (true, true) => None,
    }
}

//! Route handlers: the listing page, direct file serving and the expansion
//! API.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use listing::{Breadcrumb, ListingError, ScanResult, Target};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use super::render;
use super::SharedState;

/// Body of every expansion API response.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn ok(data: ScanResult) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// HTTP status for a listing failure.
pub fn status_for(error: &ListingError) -> StatusCode {
    match error {
        ListingError::PathEscape(_) | ListingError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ListingError::NotFound(_) | ListingError::NotADirectory(_) => StatusCode::NOT_FOUND,
        ListingError::InvalidPattern { .. } | ListingError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Message shown to the client. Filesystem paths stay in the server log.
fn public_message(error: &ListingError) -> &'static str {
    match error {
        ListingError::PathEscape(_) => "Access denied",
        ListingError::PermissionDenied(_) => "Permission denied",
        ListingError::NotFound(_) => "Directory not found",
        ListingError::NotADirectory(_) => "Not a directory",
        ListingError::InvalidPattern { .. } | ListingError::Io { .. } => "Internal error",
    }
}

/// Pull the raw, still percent-encoded `path` value out of a query string.
///
/// The resolver decodes exactly once, so only the form encoding of a space
/// (`+`) is rewritten here, to `%20`.
pub fn raw_path_param(query: Option<&str>) -> String {
    query
        .unwrap_or("")
        .split('&')
        .find_map(|pair| pair.strip_prefix("path="))
        .unwrap_or("")
        .replace('+', "%20")
}

/// `GET /_lister/api?path=<p>`
pub async fn api(State(state): State<SharedState>, RawQuery(query): RawQuery) -> Response {
    let requested = raw_path_param(query.as_deref());
    tracing::debug!("Expansion request for {:?}", requested);

    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<ScanResult, ListingError> {
        let lister = &worker.lister;
        let dir = lister.resolve(&requested)?;
        if lister.is_path_hidden(dir.as_path()) {
            return Err(ListingError::NotFound(dir.into_path_buf()));
        }
        lister.scan(&dir)
    })
    .await;

    match result {
        Ok(Ok(scan)) => Json(ApiResponse::ok(scan)).into_response(),
        Ok(Err(e)) => {
            tracing::debug!("Expansion failed: {}", e);
            (StatusCode::BAD_REQUEST, Json(ApiResponse::err(public_message(&e)))).into_response()
        }
        Err(e) => {
            tracing::error!("Scan task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("Internal error")),
            )
                .into_response()
        }
    }
}

/// What the fallback route resolved to.
enum Page {
    Listing(ScanResult, Vec<Breadcrumb>),
    File(PathBuf),
}

/// `GET /<path>`: a listing page, or the file itself.
pub async fn page(State(state): State<SharedState>, uri: Uri) -> Response {
    let requested = uri.path().to_string();

    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<Page, ListingError> {
        let lister = &worker.lister;
        match lister.locate(&requested)? {
            Target::File { path, .. } => {
                if lister.is_path_hidden(path.as_path()) {
                    return Err(ListingError::NotFound(path.into_path_buf()));
                }
                Ok(Page::File(path.into_path_buf()))
            }
            Target::Directory(dir) => {
                if lister.is_path_hidden(dir.as_path()) {
                    return Err(ListingError::NotFound(dir.into_path_buf()));
                }
                let scan = lister.scan(&dir)?;
                let crumbs = lister.breadcrumbs(&dir);
                Ok(Page::Listing(scan, crumbs))
            }
        }
    })
    .await;

    match result {
        Ok(Ok(Page::Listing(scan, crumbs))) => {
            render::listing_page(&state.title, &scan, &crumbs).into_response()
        }
        Ok(Ok(Page::File(path))) => serve_file(&state, path).await,
        Ok(Err(e)) => {
            tracing::debug!("Listing {:?} failed: {}", uri.path(), e);
            let status = status_for(&e);
            (
                status,
                render::error_page(&state.title, status, public_message(&e)),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Scan task failed: {}", e);
            internal_error(&state)
        }
    }
}

async fn serve_file(state: &SharedState, path: PathBuf) -> Response {
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Failed to open {:?}: {}", path, e);
            let error = match e.kind() {
                std::io::ErrorKind::PermissionDenied => ListingError::PermissionDenied(path),
                _ => ListingError::NotFound(path),
            };
            let status = status_for(&error);
            return (
                status,
                render::error_page(&state.title, status, public_message(&error)),
            )
                .into_response();
        }
    };

    let length = match file.metadata().await {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!("Failed to stat {:?}: {}", path, e);
            return internal_error(state);
        }
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream().to_string();
    tracing::debug!("Serving {:?} ({} bytes, {})", path, length, mime);

    let body = Body::from_stream(ReaderStream::new(file));
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_str(&mime)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        body,
    )
        .into_response()
}

fn internal_error(state: &SharedState) -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    (status, render::error_page(&state.title, status, "Internal error")).into_response()
}

//! HTTP surface: router, shared state and the admission gate.

pub mod handlers;
pub mod render;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use listing::{DirectoryLister, API_SEGMENT};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::admission::{client_ip, AdmissionFilter, Decision, RequestInfo};

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    pub lister: DirectoryLister,
    pub title: String,
    /// `None` when the admission gate is disabled.
    pub admission: Option<Arc<AdmissionFilter>>,
}

pub type SharedState = Arc<AppState>;

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route(&format!("/{}/api", API_SEGMENT), get(handlers::api))
        .fallback(handlers::page);

    if state.admission.is_some() {
        app = app.layer(middleware::from_fn_with_state(state.clone(), admission_gate));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: SharedState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read listener address")?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server error")
}

fn header_str(request: &Request, name: header::HeaderName) -> String {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Middleware running the admission filter in front of every route.
async fn admission_gate(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let filter = match &state.admission {
        Some(f) => f.clone(),
        None => return next.run(request).await,
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let info = RequestInfo {
        ip: client_ip(request.headers(), peer).to_string(),
        user_agent: header_str(&request, header::USER_AGENT),
        uri: request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string()),
        referer: header_str(&request, header::REFERER),
    };

    match tokio::task::spawn_blocking(move || filter.check(&info)).await {
        Ok(Ok(Decision::Allow)) => next.run(request).await,
        Ok(Ok(Decision::Deny(reason))) => {
            (StatusCode::FORBIDDEN, render::denied_page(reason.message())).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!("Admission check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                render::error_page(&state.title, StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Admission task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

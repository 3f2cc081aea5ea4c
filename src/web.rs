//! Read-only HTTP API over the published poll results

use crate::model::SystemSnapshot;
use crate::poller::PollerHandles;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub handles: PollerHandles,
    pub version: &'static str,
}

impl AppState {
    pub fn new(handles: PollerHandles) -> Self {
        Self {
            handles,
            version: env!("APP_VERSION"),
        }
    }

    fn latest(&self) -> Option<Arc<SystemSnapshot>> {
        self.handles.snapshot.borrow().clone()
    }
}

fn not_yet(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("no {} available yet", what) })),
    )
        .into_response()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": state.version }))
}

/// Last good snapshot; 404 until the first successful poll
pub async fn snapshot(State(state): State<AppState>) -> Response {
    match state.latest() {
        Some(snap) => Json(snap.as_ref().clone()).into_response(),
        None => not_yet("snapshot"),
    }
}

/// Last good snapshot as flat `system.*` / `module.<id>.*` records
pub async fn snapshot_records(State(state): State<AppState>) -> Response {
    match state.latest() {
        Some(snap) => Json(snap.to_records()).into_response(),
        None => not_yet("snapshot"),
    }
}

pub async fn device(State(state): State<AppState>) -> Response {
    let info = state.handles.device_info.borrow().clone();
    match info {
        Some(info) => Json(info.as_ref().clone()).into_response(),
        None => not_yet("device info"),
    }
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.handles.status.borrow().clone();
    Json(status)
}

/// Server-sent `snapshot` event for every newly published snapshot
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let stream = WatchStream::new(state.handles.snapshot.clone()).filter_map(|snap| {
        let snap = snap?;
        Event::default()
            .event("snapshot")
            .json_data(snap.as_ref())
            .ok()
            .map(Ok::<Event, std::convert::Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/snapshot", get(snapshot))
        .route("/api/snapshot/records", get(snapshot_records))
        .route("/api/device", get(device))
        .route("/api/status", get(status))
        .route("/api/events", get(events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(handles: PollerHandles, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(AppState::new(handles));
    let logger = crate::logging::get_logger("web");

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    logger.info("Web server stopped");
    Ok(())
}

//! API Server (Cold Path)
//!
//! Read-only REST view of the feed: connection status, the latest price per
//! symbol and counters. Reads the status channel, price board and metrics
//! through shared state; never touches the session task.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::cors::CorsLayer;

use crate::client::StatusHandle;
use crate::core::PriceBoard;
use crate::infrastructure::metrics::{FeedMetrics, MetricsSnapshot};
use crate::FeedError;

/// Connection status DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDto {
    pub is_connected: bool,
    pub is_reconnecting: bool,
    pub latency_ms: Option<u64>,
    pub state: &'static str,
    pub retry_attempt: u32,
}

/// Latest prices DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesDto {
    pub prices: BTreeMap<String, f64>,
    /// Unix millis of the last applied batch
    pub last_updated: Option<u64>,
}

/// Counters DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDto {
    pub frames_received: u64,
    pub batches_delivered: u64,
    pub malformed_frames: u64,
    pub rejected_entries: u64,
    pub probes_sent: u64,
    pub reconnects: u64,
    pub message_rate: f64,
    pub uptime_seconds: u64,
    pub idle_ms: u64,
}

impl MetricsDto {
    fn new(snapshot: MetricsSnapshot, idle_ms: u64) -> Self {
        Self {
            frames_received: snapshot.frames_received,
            batches_delivered: snapshot.batches_delivered,
            malformed_frames: snapshot.malformed_frames,
            rejected_entries: snapshot.rejected_entries,
            probes_sent: snapshot.probes_sent,
            reconnects: snapshot.reconnects,
            message_rate: snapshot.message_rate,
            uptime_seconds: snapshot.uptime_seconds,
            idle_ms,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub status: StatusHandle,
    pub board: Arc<PriceBoard>,
    pub metrics: Arc<FeedMetrics>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/prices", get(get_prices))
        .route("/api/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: AppState, port: u16) -> Result<(), FeedError> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Handler for /api/status
async fn get_status(State(state): State<AppState>) -> Json<StatusDto> {
    let status = state.status.snapshot();
    Json(StatusDto {
        is_connected: status.is_connected(),
        is_reconnecting: status.is_reconnecting(),
        latency_ms: status.latency_ms,
        state: status.state.as_str(),
        retry_attempt: status.retry_attempt,
    })
}

/// Handler for /api/prices
async fn get_prices(State(state): State<AppState>) -> Json<PricesDto> {
    Json(PricesDto {
        prices: state.board.snapshot(),
        last_updated: state.board.last_updated().and_then(unix_millis),
    })
}

/// Handler for /api/metrics
async fn get_metrics(State(state): State<AppState>) -> Json<MetricsDto> {
    Json(MetricsDto::new(state.metrics.snapshot(), state.metrics.idle_ms()))
}

fn unix_millis(t: SystemTime) -> Option<u64> {
    t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_millis() as u64)
}

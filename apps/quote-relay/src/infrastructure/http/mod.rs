//! Query and Health HTTP Surface
//!
//! Read-only queries over the sample history, a manual refresh hook, and
//! the usual probe and metrics endpoints.
//!
//! # Endpoints
//!
//! - `GET /latest?symbol=` - Latest price, market cap and 24h change
//! - `GET /stats?symbol=` - Same as `/latest`
//! - `GET /deviation?symbol=&window=` - Population stddev of recent prices
//! - `POST /refresh` - Request a refresh outside the timer
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the transport)
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! `coin` is accepted in place of `symbol`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConnectionState, TransportPort};
use crate::application::services::{StatisticsService, StatsError, TriggerError, TriggerHandle};
use crate::domain::statistics::DEFAULT_DEVIATION_WINDOW;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Query string shared by the statistics endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SymbolQuery {
    symbol: Option<String>,
    coin: Option<String>,
    window: Option<String>,
}

impl SymbolQuery {
    fn symbol(&self) -> Result<&str, ApiError> {
        self.symbol
            .as_deref()
            .or(self.coin.as_deref())
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::MissingSymbol)
    }

    fn window(&self) -> Result<usize, ApiError> {
        self.window.as_deref().map_or(Ok(DEFAULT_DEVIATION_WINDOW), |raw| {
            raw.parse()
                .map_err(|_| ApiError::BadWindow(raw.to_string()))
        })
    }
}

/// Deviation response body.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeviationResponse {
    /// Rounded population standard deviation.
    pub deviation: f64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Transport connection state.
    pub transport: String,
    /// Whether this process runs the producer.
    pub producer: bool,
    /// Symbols accepted by the query endpoints.
    pub tracked_symbols: Vec<String>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Transport connected.
    Healthy,
    /// Transport connecting or reconnecting.
    Degraded,
    /// Transport down for good.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting => Self::Degraded,
            ConnectionState::Disconnected | ConnectionState::Closed => Self::Unhealthy,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Request-level failure, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Neither `symbol` nor `coin` was given.
    #[error("symbol parameter is required")]
    MissingSymbol,

    /// `window` is not a non-negative integer.
    #[error("invalid window '{0}'")]
    BadWindow(String),

    /// Statistics query failed.
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// No producer in this process.
    #[error("refresh unavailable: producer not running")]
    RefreshUnavailable,

    /// Scheduler rejected the request.
    #[error("refresh unavailable: {0}")]
    Refresh(#[from] TriggerError),
}

impl ApiError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSymbol
            | Self::BadWindow(_)
            | Self::Stats(StatsError::InvalidSymbol(_) | StatsError::InvalidWindow) => {
                StatusCode::BAD_REQUEST
            }
            Self::Stats(StatsError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Stats(StatsError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RefreshUnavailable | Self::Refresh(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn into_response_for(self, production: bool) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Query failed");
            if production {
                "internal server error".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP handlers.
pub struct HttpState {
    version: String,
    started_at: Instant,
    stats: StatisticsService,
    transport: Arc<dyn TransportPort>,
    refresh: Option<TriggerHandle>,
    production: bool,
}

impl HttpState {
    /// Create state for a process without a producer.
    #[must_use]
    pub fn new(
        version: String,
        stats: StatisticsService,
        transport: Arc<dyn TransportPort>,
        production: bool,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            stats,
            transport,
            refresh: None,
            production,
        }
    }

    /// Enable `POST /refresh` through `handle`.
    #[must_use]
    pub fn with_refresh(mut self, handle: TriggerHandle) -> Self {
        self.refresh = Some(handle);
        self
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("version", &self.version)
            .field("refresh", &self.refresh.is_some())
            .field("production", &self.production)
            .finish_non_exhaustive()
    }
}

/// Build the router over `state`.
pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/latest", get(latest_handler))
        .route("/stats", get(latest_handler))
        .route("/deviation", get(deviation_handler))
        .route("/refresh", post(refresh_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// Query HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn latest_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SymbolQuery>,
) -> Response {
    let result = async {
        let symbol = query.symbol()?;
        Ok::<_, ApiError>(state.stats.latest(symbol).await?)
    }
    .await;

    match result {
        Ok(latest) => Json(latest).into_response(),
        Err(e) => e.into_response_for(state.production),
    }
}

async fn deviation_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SymbolQuery>,
) -> Response {
    let result = async {
        let symbol = query.symbol()?;
        let window = query.window()?;
        Ok::<_, ApiError>(state.stats.deviation(symbol, window).await?)
    }
    .await;

    match result {
        Ok(deviation) => Json(DeviationResponse { deviation }).into_response(),
        Err(e) => e.into_response_for(state.production),
    }
}

async fn refresh_handler(State(state): State<Arc<HttpState>>) -> Response {
    let result = state
        .refresh
        .as_ref()
        .ok_or(ApiError::RefreshUnavailable)
        .and_then(|handle| handle.trigger().map_err(ApiError::from));

    match result {
        Ok(()) => {
            tracing::info!("Manual refresh requested");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "status": "accepted" })),
            )
                .into_response()
        }
        Err(e) => e.into_response_for(state.production),
    }
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    if state.transport.state() == ConnectionState::Connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HttpState) -> HealthResponse {
    let transport = state.transport.state();

    HealthResponse {
        status: HealthStatus::from(transport),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        transport: transport.as_str().to_string(),
        producer: state.refresh.is_some(),
        tracked_symbols: state
            .stats
            .tracked()
            .symbols()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use test_case::test_case;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{MockQuoteStorePort, StoreError};
    use crate::domain::quote::TrackedSet;
    use crate::infrastructure::broker::InMemoryBroker;
    use crate::infrastructure::store::MemoryQuoteStore;

    fn state_with_store(
        store: Arc<dyn crate::application::ports::QuoteStorePort>,
        production: bool,
    ) -> Arc<HttpState> {
        let stats = StatisticsService::new(store, TrackedSet::default());
        Arc::new(HttpState::new(
            "test".into(),
            stats,
            Arc::new(InMemoryBroker::new()),
            production,
        ))
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test_case(ConnectionState::Connected, HealthStatus::Healthy)]
    #[test_case(ConnectionState::Reconnecting, HealthStatus::Degraded)]
    #[test_case(ConnectionState::Connecting, HealthStatus::Degraded)]
    #[test_case(ConnectionState::Closed, HealthStatus::Unhealthy)]
    #[test_case(ConnectionState::Disconnected, HealthStatus::Unhealthy)]
    fn health_follows_transport(state: ConnectionState, expected: HealthStatus) {
        assert_eq!(HealthStatus::from(state), expected);
    }

    #[test_case("/latest" ; "latest")]
    #[test_case("/deviation" ; "deviation")]
    #[tokio::test]
    async fn missing_symbol_is_bad_request(path: &str) {
        let app = router(state_with_store(Arc::new(MemoryQuoteStore::new()), false));
        let (status, body) = send(app, "GET", path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "symbol parameter is required");
    }

    #[tokio::test]
    async fn unknown_symbol_lists_supported() {
        let app = router(state_with_store(Arc::new(MemoryQuoteStore::new()), false));
        let (status, body) = send(app, "GET", "/latest?coin=dogecoin").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("bitcoin, ethereum, matic-network"));
    }

    #[tokio::test]
    async fn no_data_is_not_found() {
        let app = router(state_with_store(Arc::new(MemoryQuoteStore::new()), false));
        let (status, _) = send(app, "GET", "/stats?symbol=bitcoin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test_case("abc" ; "not a number")]
    #[test_case("-1" ; "negative")]
    #[test_case("0" ; "zero")]
    #[tokio::test]
    async fn bad_window_is_bad_request(window: &str) {
        let app = router(state_with_store(Arc::new(MemoryQuoteStore::new()), false));
        let uri = format!("/deviation?symbol=bitcoin&window={window}");
        let (status, _) = send(app, "GET", &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn store_failure_message_depends_on_env() {
        let mut store = MockQuoteStorePort::new();
        store
            .expect_recent()
            .returning(|_, _| Err(StoreError::Query("relation missing".into())));
        let store: Arc<dyn crate::application::ports::QuoteStorePort> = Arc::new(store);

        let (status, body) = send(
            router(state_with_store(store.clone(), false)),
            "GET",
            "/latest?symbol=bitcoin",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("relation missing"));

        let (status, body) = send(
            router(state_with_store(store, true)),
            "GET",
            "/latest?symbol=bitcoin",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn refresh_without_producer_is_unavailable() {
        let app = router(state_with_store(Arc::new(MemoryQuoteStore::new()), false));
        let (status, _) = send(app, "POST", "/refresh").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_transport() {
        let app = router(state_with_store(Arc::new(MemoryQuoteStore::new()), false));
        let (status, body) = send(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["transport"], "connected");
        assert_eq!(body["producer"], false);
    }
}

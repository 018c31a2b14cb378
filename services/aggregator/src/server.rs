//! HTTP surface of the request protocol.
//!
//! Every route builds a [`WeatherRequest`], hands it to the dispatcher and
//! waits at most `request_timeout` for the reply. A timeout is reported as
//! an unknown outcome: the worker may still finish and discard the result.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use workers::{Dispatcher, WeatherRequest, WeatherResponse};

/// Shared state for the HTTP server.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub request_timeout: Duration,
    /// Absent when no recorder is installed (tests)
    pub prometheus: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    /// `ok`, `no_data` or `not_found`
    status: &'static str,
    #[serde(flatten)]
    response: WeatherResponse,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
    retryable: bool,
}

#[derive(Debug, Serialize)]
struct TimeoutResponse {
    status: &'static str,
    outcome: &'static str,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

async fn answer(state: &AppState, request: WeatherRequest) -> Response {
    let station = request.station().to_string();

    match tokio::time::timeout(state.request_timeout, state.dispatcher.ask(request)).await {
        Ok(Ok(response)) => {
            let status = response.status();
            let code = if status == "not_found" {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            (code, Json(QueryResponse { status, response })).into_response()
        }
        Ok(Err(e)) => {
            let code = StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if code.is_server_error() {
                warn!(station = %station, error = %e, "Query failed");
            }
            let body = ErrorResponse {
                status: "error",
                error: e.to_string(),
                retryable: e.is_retryable(),
            };
            (code, Json(body)).into_response()
        }
        Err(_) => {
            warn!(station = %station, "Query timed out");
            let body = TimeoutResponse {
                status: "timeout",
                outcome: "unknown",
                timeout_ms: state.request_timeout.as_millis() as u64,
            };
            (StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response()
        }
    }
}

/// GET /temperature/daily/:station/:year/:day
async fn daily_temperature_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((station, year, day)): Path<(String, i32, u32)>,
) -> Response {
    answer(&state, WeatherRequest::GetDailyTemperature { station, day, year }).await
}

/// GET /temperature/monthly/:station/:year/:month
async fn monthly_temperature_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((station, year, month)): Path<(String, i32, u32)>,
) -> Response {
    answer(
        &state,
        WeatherRequest::GetMonthlyTemperature {
            station,
            month,
            year,
        },
    )
    .await
}

/// GET /precipitation/:station/:year
async fn precipitation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((station, year)): Path<(String, i32)>,
) -> Response {
    answer(&state, WeatherRequest::GetPrecipitation { station, year }).await
}

/// GET /precipitation/:station/:year/top/:k
async fn top_precipitation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((station, year, k)): Path<(String, i32, usize)>,
) -> Response {
    answer(&state, WeatherRequest::GetTopKPrecipitation { station, year, k }).await
}

/// GET /stations/:station
async fn station_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(station): Path<String>,
) -> Response {
    answer(&state, WeatherRequest::GetWeatherStation { station }).await
}

/// POST /query - any protocol request as JSON
async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<WeatherRequest>,
) -> Response {
    answer(&state, request).await
}

/// GET /health - Health check
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "aggregator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics - Prometheus metrics
async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::OK, String::new()),
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/temperature/daily/:station/:year/:day",
            get(daily_temperature_handler),
        )
        .route(
            "/temperature/monthly/:station/:year/:month",
            get(monthly_temperature_handler),
        )
        .route("/precipitation/:station/:year", get(precipitation_handler))
        .route(
            "/precipitation/:station/:year/top/:k",
            get(top_precipitation_handler),
        )
        .route("/stations/:station", get(station_handler))
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

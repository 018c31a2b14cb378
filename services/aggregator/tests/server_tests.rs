//! HTTP routes of the aggregation service against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use storage::MemoryStore;
use test_utils::{hourly_temperatures, populated_store, record, stations};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use workers::{AggregationConfig, WorkerSet};

use aggregator::{build_router, AppState};

async fn app_with(store: Arc<MemoryStore>, timeout: Duration) -> (Router, WorkerSet) {
    let config = AggregationConfig {
        daily_years: vec![2024],
        ..AggregationConfig::default()
    };
    let workers = WorkerSet::spawn(
        store,
        &config,
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        &CancellationToken::new(),
    )
    .unwrap();
    let state = Arc::new(AppState {
        dispatcher: workers.dispatcher(),
        request_timeout: timeout,
        prometheus: None,
    });
    (build_router(state), workers)
}

async fn scenario_app() -> (Router, WorkerSet) {
    let mut records = hourly_temperatures("S1", 2024, 3, 1, &[10.0, 20.0, 15.0]);
    records.extend(hourly_temperatures("S1", 2024, 3, 2, &[5.0, 25.0, 18.0]));
    records.extend(hourly_temperatures("S1", 2024, 3, 3, &[12.0, 22.0, 17.0]));
    let mut wet = record("S1", 2024, 3, 2, 12);
    wet.temperature = 15.0;
    wet.one_hour_precip = 4.5;
    records.push(wet);

    app_with(populated_store(&records).await, Duration::from_secs(5)).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_monthly_temperature() {
    let (app, workers) = scenario_app().await;

    let (status, body) = get(app, "/temperature/monthly/S1/2024/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["type"], "Temperature");
    assert_eq!(body["result"]["value"]["high"], 25.0);
    assert_eq!(body["result"]["value"]["low"], 5.0);
    assert_eq!(body["result"]["value"]["readings"], 10);

    workers.stop().await;
}

#[tokio::test]
async fn test_daily_temperature_no_data() {
    let (app, workers) = scenario_app().await;

    // Day 200 of 2024 has no readings
    let (status, body) = get(app, "/temperature/daily/S1/2024/200").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_data");

    workers.stop().await;
}

#[tokio::test]
async fn test_precipitation_and_top_k() {
    let (app, workers) = scenario_app().await;

    let (status, body) = get(app.clone(), "/precipitation/S1/2024").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["value"]["total"], 4.5);

    let (status, body) = get(app, "/precipitation/S1/2024/top/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "TopKPrecipitation");
    assert_eq!(body["result"]["value"]["days"][0]["date"], "2024-03-02");

    workers.stop().await;
}

#[tokio::test]
async fn test_station_found_and_not_found() {
    let (app, workers) = scenario_app().await;

    let uri = format!("/stations/{}", stations::LAGUARDIA);
    let (status, body) = get(app.clone(), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["station"]["call_sign"], "KLGA");

    let (status, body) = get(app, &format!("/stations/{}", stations::UNKNOWN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");

    workers.stop().await;
}

#[tokio::test]
async fn test_invalid_requests_are_bad_requests() {
    let (app, workers) = scenario_app().await;

    let (status, body) = get(app.clone(), "/temperature/monthly/S1/2024/13").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["retryable"], false);

    let (status, _) = get(app.clone(), "/temperature/daily/S1/2023/366").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(app, "/precipitation/S1/2024/top/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    workers.stop().await;
}

#[tokio::test]
async fn test_post_query() {
    let (app, workers) = scenario_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"type": "GetDailyTemperature", "station": "S1", "day": 61, "year": 2024}"#,
        ))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["value"]["mean"], 15.0);

    workers.stop().await;
}

#[tokio::test]
async fn test_store_outage_is_service_unavailable() {
    let store = populated_store(&[]).await;
    let (app, workers) = app_with(store.clone(), Duration::from_secs(5)).await;
    store.set_available(false);

    let (status, body) = get(app, "/precipitation/S1/2024").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    workers.stop().await;
}

#[tokio::test]
async fn test_slow_query_times_out_with_unknown_outcome() {
    let store = populated_store(&[]).await;
    store.set_query_delay(Duration::from_millis(500));
    let (app, workers) = app_with(store, Duration::from_millis(50)).await;

    let (status, body) = get(app, "/temperature/monthly/S1/2024/3").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["outcome"], "unknown");

    workers.stop().await;
}

#[tokio::test]
async fn test_health() {
    let (app, workers) = app_with(Arc::new(MemoryStore::new()), Duration::from_secs(1)).await;

    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "aggregator");

    workers.stop().await;
}

//! Tests for the ingester HTTP server.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use storage::{MemoryQueue, MemoryStore};
use test_utils::{observation_line, record};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use workers::{IngestionWorker, RetryPolicy};

use ingester::{build_router, ServerState};

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let state = Arc::new(ServerState::new(Default::default(), None));
    let (status, body) = get_json(build_router(state), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "ingester");
}

#[tokio::test]
async fn test_status_reports_worker_counters() {
    let (feed, queue) = MemoryQueue::channel(8);
    feed.publish(observation_line(&record("S1", 2024, 1, 1, 0)))
        .await
        .unwrap();
    feed.publish("garbage").await.unwrap();
    drop(feed);

    let mut worker = IngestionWorker::new(queue, Arc::new(MemoryStore::new()), RetryPolicy::default());
    let state = Arc::new(ServerState::new(worker.stats(), None));
    worker.run(CancellationToken::new()).await;

    let (status, body) = get_json(build_router(state), "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 2);
    assert_eq!(body["written"], 1);
    assert_eq!(body["dropped"], 1);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn test_metrics_without_recorder_is_empty() {
    let state = Arc::new(ServerState::new(Default::default(), None));
    let response = build_router(state)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
}

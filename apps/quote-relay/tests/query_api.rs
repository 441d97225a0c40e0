//! Query API Integration Tests
//!
//! Drives the axum router in-process with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use quote_relay::application::services::RefreshHandler;
use quote_relay::{
    HttpState, InMemoryBroker, MemoryQuoteStore, QuoteSample, QuoteStorePort, Scheduler,
    StatisticsService, TrackedSet, Trigger, router,
};

async fn seeded_store(prices: &[(&str, f64)]) -> Arc<MemoryQuoteStore> {
    let store = Arc::new(MemoryQuoteStore::new());
    let tracked = TrackedSet::default();
    for (i, (symbol, price)) in prices.iter().enumerate() {
        let observed_at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(i64::try_from(i).unwrap());
        let sample = QuoteSample::new(
            tracked.resolve(symbol).unwrap(),
            *price,
            price * 19_000_000.0,
            1.25,
            observed_at,
        )
        .unwrap();
        store.append(&sample).await.unwrap();
    }
    store
}

fn state(store: Arc<MemoryQuoteStore>) -> HttpState {
    HttpState::new(
        "test".to_string(),
        StatisticsService::new(store, TrackedSet::default()),
        Arc::new(InMemoryBroker::new()),
        false,
    )
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn latest_returns_most_recent_sample() {
    let store = seeded_store(&[("bitcoin", 100.0), ("bitcoin", 101.5), ("ethereum", 5.0)]).await;
    let router = router(Arc::new(state(store)));

    let (status, body) = get(router.clone(), "/latest?symbol=bitcoin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "price": 101.5, "marketCap": 101.5 * 19_000_000.0, "change24h": 1.25 })
    );

    let (status, body) = get(router, "/stats?coin=ethereum").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 5.0);
}

#[tokio::test]
async fn deviation_uses_window() {
    let store = seeded_store(&[
        ("bitcoin", 100.0),
        ("bitcoin", 102.0),
        ("bitcoin", 98.0),
        ("bitcoin", 100.0),
        ("bitcoin", 100.0),
    ])
    .await;
    let router = router(Arc::new(state(store)));

    let (status, body) = get(router.clone(), "/deviation?symbol=bitcoin").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "deviation": 1.55 }));

    let (_, body) = get(router.clone(), "/deviation?symbol=bitcoin&window=2").await;
    assert_eq!(body["deviation"], 0.0);

    let (_, body) = get(router, "/deviation?coin=bitcoin&window=1").await;
    assert_eq!(body["deviation"], 0.0);
}

#[tokio::test]
async fn errors_use_json_body() {
    let router = router(Arc::new(state(Arc::new(MemoryQuoteStore::new()))));

    let (status, body) = get(router.clone(), "/latest").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = get(router.clone(), "/latest?symbol=solana").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("solana"));

    let (status, body) = get(router, "/deviation?symbol=ethereum").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no data found for ethereum");
}

/// Refresh handler that reports each trigger it receives.
struct Recorder(mpsc::UnboundedSender<Trigger>);

#[async_trait]
impl RefreshHandler for Recorder {
    async fn refresh(&self, trigger: Trigger) {
        let _ = self.0.send(trigger);
    }
}

#[tokio::test]
async fn refresh_reaches_scheduler() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(15, Arc::new(Recorder(tx)));
    let handle = scheduler.trigger_handle();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));

    assert_eq!(rx.recv().await, Some(Trigger::Startup));

    let state = state(Arc::new(MemoryQuoteStore::new())).with_refresh(handle);
    let router = router(Arc::new(state));

    let (status, body) = send(
        router.clone(),
        Request::post("/refresh").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");

    let manual = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(manual, Some(Trigger::Manual));

    let (_, body) = get(router, "/health").await;
    assert_eq!(body["producer"], true);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn probes_respond() {
    let router = router(Arc::new(state(Arc::new(MemoryQuoteStore::new()))));

    let response = router
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

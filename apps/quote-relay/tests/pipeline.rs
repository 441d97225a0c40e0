//! Pipeline Integration Tests
//!
//! Producer → in-process broker → consumer group → store → statistics,
//! wired the same way the binary wires them with `memory://` endpoints.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_test::assert_ok;

use quote_relay::application::services::ConsumerMember;
use quote_relay::{
    ConsumerGroup, FetchError, InMemoryBroker, LatestQuote, MemoryQuoteStore, Producer,
    QuoteSample, QuoteSourcePort, QuoteStorePort, StatisticsService, TrackedSet, TrackedSymbol,
    TransportPort, Trigger, UpdateEventCodec,
};

const SUBJECT: &str = "quotes.update";
const GROUP: &str = "quote-consumers";

fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

fn sample(symbol: &str, price: f64, offset_secs: i64) -> QuoteSample {
    let symbol = TrackedSet::default().resolve(symbol).unwrap();
    QuoteSample::new(symbol, price, price * 1_000.0, 0.5, at(offset_secs)).unwrap()
}

async fn publish(broker: &InMemoryBroker, codec: &UpdateEventCodec, sample: &QuoteSample) {
    let payload = Bytes::from(codec.encode(sample).unwrap());
    assert_ok!(broker.publish(SUBJECT, payload).await);
}

/// Quote source that returns the same samples on every fetch.
struct FixedSource(Vec<QuoteSample>);

#[async_trait]
impl QuoteSourcePort for FixedSource {
    async fn fetch(&self, symbols: &[TrackedSymbol]) -> Result<Vec<QuoteSample>, FetchError> {
        if symbols.is_empty() {
            return Err(FetchError::NoSymbols);
        }
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn every_event_is_stored_once() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(MemoryQuoteStore::new());
    let codec = UpdateEventCodec::new(TrackedSet::default());

    let group = ConsumerGroup::start(&broker, store.clone(), &codec, SUBJECT, GROUP, 1)
        .await
        .unwrap();

    for (i, symbol) in ["bitcoin", "ethereum", "matic-network"].iter().enumerate() {
        publish(&broker, &codec, &sample(symbol, 10.0, i64::try_from(i).unwrap())).await;
    }

    broker.drain().await.unwrap();
    let stats = group.join().await;

    assert_eq!(stats.consumed, 3);
    assert_eq!(stats.stored, 3);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn malformed_event_does_not_stop_consumer() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(MemoryQuoteStore::new());
    let codec = UpdateEventCodec::new(TrackedSet::default());

    let group = ConsumerGroup::start(&broker, store.clone(), &codec, SUBJECT, GROUP, 1)
        .await
        .unwrap();

    broker
        .publish(SUBJECT, Bytes::from_static(b"not json"))
        .await
        .unwrap();
    broker
        .publish(SUBJECT, Bytes::from_static(br#"{"price":1.0,"marketCap":2.0}"#))
        .await
        .unwrap();
    publish(&broker, &codec, &sample("bitcoin", 42.0, 0)).await;

    broker.drain().await.unwrap();
    let stats = group.join().await;

    assert_eq!(stats.consumed, 3);
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.stored, 1);

    let stats_service = StatisticsService::new(store, TrackedSet::default());
    assert_eq!(stats_service.latest("bitcoin").await.unwrap().price, 42.0);
}

#[tokio::test]
async fn queue_members_split_the_stream() {
    let broker = InMemoryBroker::new();
    let codec = UpdateEventCodec::new(TrackedSet::default());
    let store_a = Arc::new(MemoryQuoteStore::new());
    let store_b = Arc::new(MemoryQuoteStore::new());

    let member_a = ConsumerMember::new(
        1,
        broker.subscribe(SUBJECT, Some(GROUP)).await.unwrap(),
        store_a.clone(),
        codec.clone(),
    );
    let member_b = ConsumerMember::new(
        2,
        broker.subscribe(SUBJECT, Some(GROUP)).await.unwrap(),
        store_b.clone(),
        codec.clone(),
    );
    let task_a = tokio::spawn(member_a.run());
    let task_b = tokio::spawn(member_b.run());

    for i in 0..10 {
        publish(&broker, &codec, &sample("bitcoin", f64::from(i), i64::from(i))).await;
    }
    broker.drain().await.unwrap();
    let stats_a = task_a.await.unwrap();
    let stats_b = task_b.await.unwrap();

    assert_eq!(stats_a.stored + stats_b.stored, 10);
    assert!(stats_a.stored > 0 && stats_b.stored > 0);

    let bitcoin = TrackedSet::default().resolve("bitcoin").unwrap();
    let mut prices: Vec<f64> = store_a
        .recent(&bitcoin, 100)
        .await
        .unwrap()
        .into_iter()
        .chain(store_b.recent(&bitcoin, 100).await.unwrap())
        .map(|stored| stored.sample.price())
        .collect();
    prices.sort_by(f64::total_cmp);
    let expected: Vec<f64> = (0..10).map(f64::from).collect();
    assert_eq!(prices, expected);
}

#[tokio::test]
async fn deviation_and_latest_after_five_events() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(MemoryQuoteStore::new());
    let codec = UpdateEventCodec::new(TrackedSet::default());

    let group = ConsumerGroup::start(&broker, store.clone(), &codec, SUBJECT, GROUP, 2)
        .await
        .unwrap();

    let prices = [100.0, 102.0, 98.0, 100.0, 100.0];
    for (i, price) in prices.iter().enumerate() {
        publish(&broker, &codec, &sample("bitcoin", *price, i64::try_from(i).unwrap())).await;
    }
    let last = QuoteSample::new(
        TrackedSet::default().resolve("ethereum").unwrap(),
        3_000.25,
        3.6e11,
        -2.5,
        at(10),
    )
    .unwrap();
    publish(&broker, &codec, &last).await;

    broker.drain().await.unwrap();
    group.join().await;

    let stats = StatisticsService::new(store, TrackedSet::default());
    assert_eq!(stats.deviation("bitcoin", 100).await.unwrap(), 1.55);
    assert_eq!(stats.deviation("ethereum", 100).await.unwrap(), 0.0);
    assert_eq!(
        stats.latest("ethereum").await.unwrap(),
        LatestQuote {
            price: 3_000.25,
            market_cap: 3.6e11,
            change_24h: -2.5,
        }
    );
}

#[tokio::test]
async fn producer_cycle_reaches_store() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(MemoryQuoteStore::new());
    let tracked = TrackedSet::default();
    let codec = UpdateEventCodec::new(tracked.clone());

    let group = ConsumerGroup::start(broker.as_ref(), store.clone(), &codec, SUBJECT, GROUP, 3)
        .await
        .unwrap();

    let source = FixedSource(vec![
        sample("bitcoin", 64_000.0, 0),
        sample("ethereum", 3_000.0, 0),
        sample("matic-network", 0.7, 0),
    ]);
    let producer = Producer::new(Arc::new(source), broker.clone(), tracked.clone(), SUBJECT);

    let report = producer.run_cycle(Trigger::Manual).await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.published, 3);
    assert_eq!(report.failed, 0);

    broker.drain().await.unwrap();
    assert_eq!(group.join().await.stored, 3);

    let stats = StatisticsService::new(store, tracked);
    assert_eq!(stats.latest("matic-network").await.unwrap().price, 0.7);
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use busline_core::BookingRepository;
use busline_feed::source::parse_vehicle_positions;
use busline_feed::{CycleOutcome, FeedError, RawFeed, Refresher, SnapshotCache, TransitSource};
use busline_store::app_config::RefreshConfig;
use busline_store::InMemoryBookingRepository;
use tokio::time::Instant;

/// Replays scripted results; once the script runs out it keeps failing.
struct ScriptedSource {
    script: Mutex<VecDeque<Result<RawFeed, FeedError>>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedSource {
    fn new(script: Vec<Result<RawFeed, FeedError>>) -> Arc<Self> {
        Self::with_latency(script, Duration::ZERO)
    }

    fn with_latency(script: Vec<Result<RawFeed, FeedError>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            latency,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransitSource for ScriptedSource {
    async fn fetch(&self) -> Result<RawFeed, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }
}

/// Always succeeds with the same two vehicles.
struct SteadySource {
    calls: AtomicUsize,
}

#[async_trait]
impl TransitSource for SteadySource {
    async fn fetch(&self) -> Result<RawFeed, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(feed())
    }
}

fn unavailable() -> FeedError {
    FeedError::SourceUnavailable("connection refused".to_string())
}

fn feed() -> RawFeed {
    parse_vehicle_positions(
        r#"{"entity": [
            {"id": "1", "vehicle": {"trip": {"route_id": "243"}, "vehicle": {"label": "1101"},
                "position": {"latitude": 41.31, "longitude": -72.92}}},
            {"id": "2", "vehicle": {"trip": {"route_id": "212"}, "vehicle": {"label": "1102"},
                "position": {"latitude": 41.30, "longitude": -72.93}}},
            {"id": "3", "vehicle": {"vehicle": {"label": "bad"}}}
        ]}"#,
    )
    .unwrap()
}

fn config() -> RefreshConfig {
    RefreshConfig {
        interval_secs: 30,
        max_attempts: 3,
        initial_backoff_ms: 500,
        max_backoff_ms: 8_000,
        degraded_after: 3,
    }
}

#[tokio::test]
async fn test_refresh_once_publishes() {
    let cache = SnapshotCache::new(3);
    let refresher = Refresher::new(ScriptedSource::new(vec![Ok(feed())]), cache.clone(), config());

    let outcome = refresher.refresh_once().await;

    assert_eq!(
        outcome,
        CycleOutcome::Published { version: 1, vehicles: 2, skipped: 1 }
    );
    let snapshot = cache.current().unwrap();
    assert_eq!(snapshot.version(), 1);
    assert!(snapshot.vehicle("1101").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retries_with_exponential_backoff() {
    let cache = SnapshotCache::new(3);
    let source = ScriptedSource::new(vec![Err(unavailable()), Err(unavailable()), Ok(feed())]);
    let refresher = Refresher::new(source.clone(), cache.clone(), config());

    let started = Instant::now();
    let outcome = refresher.refresh_once().await;

    assert!(matches!(outcome, CycleOutcome::Published { version: 1, .. }));
    assert_eq!(source.calls(), 3);
    // 500ms then 1000ms of backoff
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(1_500) && waited < Duration::from_millis(1_600));
    assert_eq!(cache.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycles_keep_snapshot_and_degrade() {
    let cache = SnapshotCache::new(3);
    let source = ScriptedSource::new(vec![Ok(feed())]);
    let refresher = Refresher::new(source.clone(), cache.clone(), config());

    refresher.refresh_once().await;
    for cycle in 1..=3 {
        assert_eq!(refresher.refresh_once().await, CycleOutcome::Failed { attempts: 3 });
        assert_eq!(cache.consecutive_failures(), cycle);
        // Old data stays readable the whole time
        assert_eq!(cache.current().unwrap().version(), 1);
    }

    assert!(cache.is_degraded());
    assert_eq!(source.calls(), 1 + 3 * 3);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_clears_degraded() {
    let cache = SnapshotCache::new(1);
    let source = ScriptedSource::new(vec![
        Err(unavailable()),
        Err(unavailable()),
        Err(unavailable()),
        Ok(feed()),
    ]);
    let refresher = Refresher::new(source, cache.clone(), config());

    refresher.refresh_once().await;
    assert!(cache.is_degraded());

    refresher.refresh_once().await;
    assert!(!cache.is_degraded());
    assert_eq!(cache.status().version, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_times_out() {
    let cache = SnapshotCache::new(3);
    let source = ScriptedSource::with_latency(vec![Ok(feed())], Duration::from_secs(60));
    let refresher = Refresher::new(source.clone(), cache.clone(), RefreshConfig { max_attempts: 1, ..config() })
        .with_fetch_timeout(Duration::from_secs(2));

    assert_eq!(refresher.refresh_once().await, CycleOutcome::Failed { attempts: 1 });
    assert!(cache.current().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_refreshes_on_interval() {
    let cache = SnapshotCache::new(3);
    let source = Arc::new(SteadySource { calls: AtomicUsize::new(0) });
    let mut updates = cache.subscribe();
    let handle = Refresher::new(source.clone(), cache.clone(), config()).spawn();

    // First cycle runs right away
    updates.changed().await.unwrap();
    assert_eq!(cache.current().unwrap().version(), 1);

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(cache.current().unwrap().version(), 3);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_in_flight_fetch() {
    let cache = SnapshotCache::new(3);
    let source = ScriptedSource::with_latency(vec![Ok(feed())], Duration::from_secs(3_600));
    let refresher = Refresher::new(source.clone(), cache.clone(), config())
        .with_fetch_timeout(Duration::from_secs(7_200));
    let handle = refresher.spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);

    let started = Instant::now();
    handle.shutdown().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(cache.current().is_err());
}

#[tokio::test]
async fn test_routes_forwarded_to_store() {
    let cache = SnapshotCache::new(3);
    let store = Arc::new(InMemoryBookingRepository::new());
    let refresher = Refresher::new(ScriptedSource::new(vec![Ok(feed())]), cache, config())
        .with_route_store(store.clone() as Arc<dyn BookingRepository>);

    refresher.refresh_once().await;

    assert_eq!(store.route_count().await, 2);
}

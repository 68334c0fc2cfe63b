use std::sync::Arc;
use std::time::Duration;

use busline_core::BookingRepository;
use busline_store::app_config::RefreshConfig;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::SnapshotCache;
use crate::normalize::normalize;
use crate::source::TransitSource;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SEAT_CAPACITY: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published {
        version: u64,
        vehicles: usize,
        skipped: usize,
    },
    Failed {
        attempts: u32,
    },
    Cancelled,
}

/// Polls the transit source and publishes each successful fetch as a new
/// snapshot. Failed cycles leave the current snapshot in place.
pub struct Refresher {
    source: Arc<dyn TransitSource>,
    cache: SnapshotCache,
    config: RefreshConfig,
    fetch_timeout: Duration,
    default_seat_capacity: u32,
    route_store: Option<Arc<dyn BookingRepository>>,
}

impl Refresher {
    pub fn new(source: Arc<dyn TransitSource>, cache: SnapshotCache, config: RefreshConfig) -> Self {
        Self {
            source,
            cache,
            config,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            default_seat_capacity: DEFAULT_SEAT_CAPACITY,
            route_store: None,
        }
    }

    /// Upper bound on a single fetch attempt.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_default_seat_capacity(mut self, seats: u32) -> Self {
        self.default_seat_capacity = seats;
        self
    }

    /// Forward route metadata to durable storage after each publish.
    pub fn with_route_store(mut self, store: Arc<dyn BookingRepository>) -> Self {
        self.route_store = Some(store);
        self
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Runs a single cycle outside the background loop.
    pub async fn refresh_once(&self) -> CycleOutcome {
        let (_keep_open, mut never) = watch::channel(false);
        self.run_cycle(&mut never).await
    }

    async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let fetched = tokio::select! {
                r = timeout(self.fetch_timeout, self.source.fetch()) => r,
                _ = stopped(shutdown) => return CycleOutcome::Cancelled,
            };

            match fetched {
                Ok(Ok(raw)) => {
                    let version = self.cache.next_version();
                    let out = normalize(raw, version, Utc::now(), self.default_seat_capacity);
                    for record in &out.skipped {
                        warn!(key = %record.key, reason = %record.reason, "Skipping malformed record");
                    }

                    let vehicles = out.snapshot.vehicles().len();
                    let skipped = out.skipped.len();
                    let was_degraded = self.cache.is_degraded();
                    match self.cache.publish(out.snapshot) {
                        Ok(published) => {
                            info!(version, vehicles, skipped, "Snapshot published");
                            if was_degraded {
                                info!(version, "Transit data recovered, cache no longer degraded");
                            }
                            self.store_routes(&published).await;
                            return CycleOutcome::Published { version, vehicles, skipped };
                        }
                        Err(e) => {
                            error!(error = %e, "Snapshot publish rejected");
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(attempt = attempt + 1, max_attempts, error = %e, "Transit fetch failed");
                }
                Err(_) => {
                    warn!(attempt = attempt + 1, max_attempts, timeout_ms = self.fetch_timeout.as_millis() as u64, "Transit fetch timed out");
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stopped(shutdown) => return CycleOutcome::Cancelled,
                }
            }
        }

        if self.cache.record_failure() {
            error!(
                failures = self.cache.consecutive_failures(),
                "Transit data is stale, cache marked degraded"
            );
        }
        CycleOutcome::Failed { attempts: max_attempts }
    }

    async fn store_routes(&self, snapshot: &busline_core::Snapshot) {
        let Some(store) = &self.route_store else {
            return;
        };
        let routes: Vec<_> = snapshot.routes().values().cloned().collect();
        match timeout(self.fetch_timeout, store.save_routes(&routes)).await {
            Ok(Ok(())) => debug!(count = routes.len(), "Route metadata stored"),
            Ok(Err(e)) => warn!(error = %e, "Failed to store route metadata"),
            Err(_) => warn!("Timed out storing route metadata"),
        }
    }

    /// Starts the periodic loop. The first cycle runs immediately.
    pub fn spawn(self) -> RefresherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let period = self.config.interval().max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "Refresher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    // Also fires if the handle was dropped
                    _ = stopped(&mut shutdown_rx) => break,
                }
                if self.run_cycle(&mut shutdown_rx).await == CycleOutcome::Cancelled {
                    break;
                }
            }

            info!("Refresher stopped");
        });

        RefresherHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Resolves once a stop has been requested or the handle is gone.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Stops scheduling, abandons any in-flight fetch or backoff and waits
    /// for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Refresher task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use busline_core::Snapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("No snapshot has been published yet")]
    NotInitialized,

    #[error("Snapshot version {offered} is not newer than current version {current}")]
    StaleVersion { offered: u64, current: u64 },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStatus {
    pub version: Option<u64>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub vehicle_count: usize,
    pub consecutive_failures: u32,
    pub degraded: bool,
}

/// Handle to the current snapshot.
///
/// Readers take an `Arc` to one snapshot and keep it for the whole
/// operation; a publish swaps the reference and never touches a snapshot
/// someone is reading. Cloning the handle shares the same cache.
///
/// A successful publish also ends any failure streak before subscribers are
/// woken, so a reader notified of a new snapshot never sees it as degraded.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
    consecutive_failures: AtomicU32,
    /// `true` while degraded.
    health: watch::Sender<bool>,
    degraded_after: u32,
}

impl SnapshotCache {
    /// `degraded_after` is the number of consecutive failed refresh cycles
    /// after which the cache reports itself degraded.
    pub fn new(degraded_after: u32) -> Self {
        let (tx, _rx) = watch::channel(None);
        let (health, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(CacheInner {
                tx,
                consecutive_failures: AtomicU32::new(0),
                health,
                degraded_after,
            }),
        }
    }

    pub fn current(&self) -> Result<Arc<Snapshot>, CacheError> {
        self.inner
            .tx
            .borrow()
            .as_ref()
            .cloned()
            .ok_or(CacheError::NotInitialized)
    }

    /// Swaps in a fully built snapshot. Versions must strictly increase.
    pub fn publish(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, CacheError> {
        let snapshot = Arc::new(snapshot);
        let mut outcome = Ok(snapshot.clone());

        self.inner.tx.send_if_modified(|slot| match slot {
            Some(current) if current.version() >= snapshot.version() => {
                outcome = Err(CacheError::StaleVersion {
                    offered: snapshot.version(),
                    current: current.version(),
                });
                false
            }
            _ => {
                *slot = Some(snapshot.clone());
                self.record_success();
                true
            }
        });

        outcome
    }

    /// Version the next published snapshot should carry.
    pub fn next_version(&self) -> u64 {
        self.current().map(|s| s.version() + 1).unwrap_or(1)
    }

    /// Receiver that is notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.tx.subscribe()
    }

    /// Receiver that is notified when the cache enters or leaves degraded
    /// mode. Holds `true` while degraded.
    pub fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.inner.health.subscribe()
    }

    pub fn is_degraded(&self) -> bool {
        *self.inner.health.borrow()
    }

    fn set_degraded(&self, degraded: bool) -> bool {
        self.inner.health.send_if_modified(|current| {
            let changed = *current != degraded;
            *current = degraded;
            changed
        })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Counts a failed refresh cycle. Returns `true` when this failure is
    /// the one that tips the cache into degraded mode.
    pub fn record_failure(&self) -> bool {
        let count = self.inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        count >= self.inner.degraded_after && self.set_degraded(true)
    }

    /// Resets the failure streak. Returns `true` if the cache was degraded.
    /// `publish` does this itself.
    pub fn record_success(&self) -> bool {
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
        self.set_degraded(false)
    }

    pub fn status(&self) -> CacheStatus {
        let current = self.current().ok();
        CacheStatus {
            version: current.as_ref().map(|s| s.version()),
            fetched_at: current.as_ref().map(|s| s.fetched_at()),
            vehicle_count: current.as_ref().map(|s| s.vehicles().len()).unwrap_or(0),
            consecutive_failures: self.consecutive_failures(),
            degraded: self.is_degraded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_snapshot(version: u64) -> Snapshot {
        Snapshot::new(version, HashMap::new(), Vec::new(), Utc::now())
    }

    #[test]
    fn test_not_initialized_before_first_publish() {
        let cache = SnapshotCache::new(3);
        assert_eq!(cache.current().unwrap_err(), CacheError::NotInitialized);
        assert_eq!(cache.next_version(), 1);
        assert_eq!(cache.status().version, None);
    }

    #[test]
    fn test_publish_replaces_current() {
        let cache = SnapshotCache::new(3);
        cache.publish(empty_snapshot(1)).unwrap();
        let held = cache.current().unwrap();

        cache.publish(empty_snapshot(2)).unwrap();

        // A reader holding the old snapshot is unaffected
        assert_eq!(held.version(), 1);
        assert_eq!(cache.current().unwrap().version(), 2);
        assert_eq!(cache.next_version(), 3);
    }

    #[test]
    fn test_stale_version_rejected() {
        let cache = SnapshotCache::new(3);
        cache.publish(empty_snapshot(5)).unwrap();

        let err = cache.publish(empty_snapshot(5)).unwrap_err();
        assert_eq!(err, CacheError::StaleVersion { offered: 5, current: 5 });
        assert!(cache.publish(empty_snapshot(4)).is_err());
        assert_eq!(cache.current().unwrap().version(), 5);
    }

    #[test]
    fn test_degraded_after_threshold() {
        let cache = SnapshotCache::new(3);
        assert!(!cache.record_failure());
        assert!(!cache.record_failure());
        assert!(cache.record_failure());
        // Already degraded, no second transition
        assert!(!cache.record_failure());
        assert!(cache.is_degraded());
        assert_eq!(cache.status().consecutive_failures, 4);

        assert!(cache.record_success());
        assert!(!cache.is_degraded());
        assert_eq!(cache.consecutive_failures(), 0);
        assert!(!cache.record_success());
    }

    #[tokio::test]
    async fn test_publish_ends_degraded_mode() {
        let cache = SnapshotCache::new(2);
        cache.publish(empty_snapshot(1)).unwrap();
        cache.record_failure();
        cache.record_failure();
        assert!(cache.is_degraded());

        let mut rx = cache.subscribe();
        rx.borrow_and_update();
        cache.publish(empty_snapshot(2)).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|s| s.version()), Some(2));
        let status = cache.status();
        assert!(!status.degraded);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_health_subscribers_see_transitions() {
        let cache = SnapshotCache::new(2);
        let mut health = cache.subscribe_health();
        assert!(!*health.borrow_and_update());

        cache.record_failure();
        assert!(!health.has_changed().unwrap());
        cache.record_failure();
        health.changed().await.unwrap();
        assert!(*health.borrow_and_update());

        // Further failures are not a new transition
        cache.record_failure();
        assert!(!health.has_changed().unwrap());

        cache.publish(empty_snapshot(1)).unwrap();
        health.changed().await.unwrap();
        assert!(!*health.borrow_and_update());
    }

    #[tokio::test]
    async fn test_subscribers_see_publish() {
        let cache = SnapshotCache::new(3);
        let mut rx = cache.subscribe();

        cache.publish(empty_snapshot(1)).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|s| s.version()), Some(1));
    }
}

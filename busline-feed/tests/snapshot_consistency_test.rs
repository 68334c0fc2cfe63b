use std::collections::HashMap;
use std::sync::Arc;

use busline_core::{Route, Snapshot, VehiclePosition};
use busline_feed::SnapshotCache;
use chrono::Utc;

/// Snapshot `n` holds `n` vehicles, all on route "r{n}", so a reader can
/// tell whether what it sees came from a single publish.
fn snapshot(n: u64) -> Snapshot {
    let route = Route::new(format!("r{}", n), format!("Route {}", n));
    let vehicles = (0..n)
        .map(|i| VehiclePosition {
            vehicle_id: format!("{}-{}", n, i),
            route_id: route.id,
            latitude: 41.3,
            longitude: -72.9,
            observed_at: Utc::now(),
            trip_ref: None,
            speed: None,
            bearing: None,
            next_stop: None,
            seat_capacity: 30,
        })
        .collect();
    Snapshot::new(n, HashMap::from([(route.id, route)]), vehicles, Utc::now())
}

fn assert_whole(s: &Snapshot) {
    let n = s.version();
    assert_eq!(s.vehicles().len() as u64, n);
    let route = s.route_by_code(&format!("r{}", n)).expect("route of the same version");
    assert!(s.vehicles().iter().all(|v| v.route_id == route.id));
    assert!(s.vehicles().iter().all(|v| v.vehicle_id.starts_with(&format!("{}-", n))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_partial_snapshots() {
    let cache = SnapshotCache::new(3);
    cache.publish(snapshot(1)).unwrap();
    let last = 300;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut seen = 0;
                loop {
                    let s: Arc<Snapshot> = cache.current().unwrap();
                    assert_whole(&s);
                    // Publishes happen in order, so versions never go back
                    assert!(s.version() >= seen);
                    seen = s.version();
                    if seen == last {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for n in 2..=last {
        cache.publish(snapshot(n)).unwrap();
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
}

use std::cmp::Ordering;

use busline_core::{GeoPoint, Snapshot, VehiclePosition};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheError, SnapshotCache};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeoError {
    #[error("Radius must be a finite, non-negative number of miles, got {0}")]
    InvalidRadius(f64),

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NearbyVehicle {
    pub vehicle: VehiclePosition,
    pub distance_miles: f64,
}

/// Vehicles in range, annotated with what the caller needs to caveat them.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyResult {
    pub snapshot_version: u64,
    pub as_of: DateTime<Utc>,
    pub degraded: bool,
    pub vehicles: Vec<NearbyVehicle>,
}

/// Proximity queries against the current snapshot.
#[derive(Clone)]
pub struct GeoFilter {
    cache: SnapshotCache,
}

impl GeoFilter {
    pub fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }

    pub fn nearby(&self, origin: GeoPoint, radius_miles: f64) -> Result<NearbyResult, GeoError> {
        validate(&origin, radius_miles)?;
        let snapshot = self.cache.current()?;
        self.nearby_on(&snapshot, origin, radius_miles)
    }

    /// Same as [`nearby`](Self::nearby) against a snapshot the caller
    /// already holds, so the result and anything else rendered from that
    /// snapshot agree on its version.
    pub fn nearby_on(
        &self,
        snapshot: &Snapshot,
        origin: GeoPoint,
        radius_miles: f64,
    ) -> Result<NearbyResult, GeoError> {
        Ok(NearbyResult {
            snapshot_version: snapshot.version(),
            as_of: snapshot.fetched_at(),
            degraded: self.cache.is_degraded(),
            vehicles: nearby_in(snapshot, origin, radius_miles)?,
        })
    }
}

/// Vehicles of `snapshot` within `radius_miles` of `origin`, nearest first.
/// Equal distances are ordered by vehicle id.
pub fn nearby_in(
    snapshot: &Snapshot,
    origin: GeoPoint,
    radius_miles: f64,
) -> Result<Vec<NearbyVehicle>, GeoError> {
    validate(&origin, radius_miles)?;

    let mut hits: Vec<NearbyVehicle> = snapshot
        .vehicles()
        .iter()
        .filter_map(|v| {
            let distance_miles = origin.distance_miles(&v.location());
            (distance_miles <= radius_miles).then(|| NearbyVehicle {
                vehicle: v.clone(),
                distance_miles,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance_miles
            .partial_cmp(&b.distance_miles)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.vehicle.vehicle_id.cmp(&b.vehicle.vehicle_id))
    });
    Ok(hits)
}

fn validate(origin: &GeoPoint, radius_miles: f64) -> Result<(), GeoError> {
    if !radius_miles.is_finite() || radius_miles < 0.0 {
        return Err(GeoError::InvalidRadius(radius_miles));
    }
    GeoPoint::new(origin.latitude, origin.longitude)
        .map_err(|e| GeoError::InvalidOrigin(e.to_string()))?;
    Ok(())
}

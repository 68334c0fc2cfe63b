use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Namespace for name-based route ids, so the same provider code always maps
/// to the same `Route::id` across refreshes.
pub const ROUTE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a7e_9b3d_4c58_a0e4_17d2_85b6_c391);

pub fn route_id_for(external_code: &str) -> Uuid {
    Uuid::new_v5(&ROUTE_NAMESPACE, external_code.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub external_code: String,
    pub display_name: String,
}

impl Route {
    pub fn new(external_code: impl Into<String>, display_name: impl Into<String>) -> Self {
        let external_code = external_code.into();
        Self {
            id: route_id_for(&external_code),
            external_code,
            display_name: display_name.into(),
        }
    }
}

/// A boarding location from the static schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: String,
    pub route_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
    pub trip_ref: Option<String>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub next_stop: Option<String>,
    /// Seat ceiling for trips opened on this vehicle.
    pub seat_capacity: u32,
}

impl VehiclePosition {
    pub fn location(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Immutable point-in-time view of routes and vehicle positions.
///
/// Fields are private: once built, a snapshot is only ever read. Replacing
/// it means publishing a newer one.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    version: u64,
    routes: HashMap<Uuid, Route>,
    vehicles: Vec<VehiclePosition>,
    fetched_at: DateTime<Utc>,
    #[serde(skip)]
    by_code: HashMap<String, Uuid>,
    /// Shared between snapshots built from the same static schedule.
    #[serde(skip)]
    stops: Arc<HashMap<String, Stop>>,
}

impl Snapshot {
    pub fn new(
        version: u64,
        routes: HashMap<Uuid, Route>,
        vehicles: Vec<VehiclePosition>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let by_code = routes
            .values()
            .map(|r| (r.external_code.clone(), r.id))
            .collect();
        Self {
            version,
            routes,
            vehicles,
            fetched_at,
            by_code,
            stops: Arc::default(),
        }
    }

    pub fn with_stops(mut self, stops: Arc<HashMap<String, Stop>>) -> Self {
        self.stops = stops;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn routes(&self) -> &HashMap<Uuid, Route> {
        &self.routes
    }

    pub fn vehicles(&self) -> &[VehiclePosition] {
        &self.vehicles
    }

    pub fn route(&self, id: &Uuid) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn route_by_code(&self, external_code: &str) -> Option<&Route> {
        self.by_code
            .get(external_code)
            .and_then(|id| self.routes.get(id))
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    /// Display name for a stop id, falling back to the id itself.
    pub fn stop_label<'a>(&'a self, stop_id: &'a str) -> &'a str {
        self.stop(stop_id).map(|s| s.name.as_str()).unwrap_or(stop_id)
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<&VehiclePosition> {
        self.vehicles.iter().find(|v| v.vehicle_id == vehicle_id)
    }

    pub fn vehicles_on_route(&self, route_id: &Uuid) -> Vec<&VehiclePosition> {
        self.vehicles
            .iter()
            .filter(|v| &v.route_id == route_id)
            .collect()
    }
}

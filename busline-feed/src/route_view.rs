//! Everything shown for one route: its buses from the current snapshot plus
//! realtime stop predictions and service alerts fetched on demand.

use std::sync::Arc;

use busline_core::{Route, Snapshot, VehiclePosition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheError, SnapshotCache};
use crate::gtfs::{FeedEntity, StopTimeEvent};
use crate::source::TransitSource;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouteViewError {
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteVehicle {
    pub vehicle: VehiclePosition,
    pub next_stop_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopPrediction {
    pub stop_sequence: Option<u64>,
    pub stop_id: Option<String>,
    pub stop_name: Option<String>,
    pub arrival: Option<DateTime<Utc>>,
    pub departure: Option<DateTime<Utc>>,
    /// Seconds behind schedule, negative when early.
    pub delay_secs: Option<i64>,
    pub schedule_relationship: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripProgress {
    pub trip_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub start_time: Option<String>,
    pub start_date: Option<String>,
    pub schedule_relationship: Option<String>,
    pub stops: Vec<StopPrediction>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivePeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceAlert {
    pub id: Option<String>,
    pub header: Option<String>,
    pub description: Option<String>,
    pub cause: Option<String>,
    pub effect: Option<String>,
    pub severity: Option<String>,
    pub active_periods: Vec<ActivePeriod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub route: Route,
    pub snapshot_version: u64,
    pub as_of: DateTime<Utc>,
    pub degraded: bool,
    pub vehicles: Vec<RouteVehicle>,
    pub trip_updates: Vec<TripProgress>,
    pub alerts: Vec<ServiceAlert>,
    /// Realtime feeds that could not be fetched for this view.
    pub unavailable: Vec<&'static str>,
}

pub struct RouteView {
    cache: SnapshotCache,
    source: Arc<dyn TransitSource>,
}

impl RouteView {
    pub fn new(cache: SnapshotCache, source: Arc<dyn TransitSource>) -> Self {
        Self { cache, source }
    }

    /// Builds the view from one snapshot. A failed trip update or alert
    /// fetch leaves that section empty and is listed in `unavailable`.
    pub async fn route_info(&self, route_code: &str) -> Result<RouteInfo, RouteViewError> {
        let snapshot = self.cache.current()?;
        let route = snapshot
            .route_by_code(route_code)
            .cloned()
            .ok_or_else(|| RouteViewError::UnknownRoute(route_code.to_string()))?;

        let (updates, alerts) = tokio::join!(self.source.trip_updates(), self.source.alerts());
        let mut unavailable = Vec::new();

        let trip_updates = match updates {
            Ok(entities) => trip_progress_for(&entities, route_code, &snapshot),
            Err(e) => {
                warn!(route = route_code, error = %e, "Trip updates unavailable");
                unavailable.push("trip_updates");
                Vec::new()
            }
        };
        let alerts = match alerts {
            Ok(entities) => alerts_for(&entities, route_code),
            Err(e) => {
                warn!(route = route_code, error = %e, "Service alerts unavailable");
                unavailable.push("alerts");
                Vec::new()
            }
        };

        let vehicles = snapshot
            .vehicles_on_route(&route.id)
            .into_iter()
            .map(|v| RouteVehicle {
                next_stop_name: v
                    .next_stop
                    .as_deref()
                    .and_then(|id| snapshot.stop(id))
                    .map(|s| s.name.clone()),
                vehicle: v.clone(),
            })
            .collect();

        Ok(RouteInfo {
            route,
            snapshot_version: snapshot.version(),
            as_of: snapshot.fetched_at(),
            degraded: self.cache.is_degraded(),
            vehicles,
            trip_updates,
            alerts,
            unavailable,
        })
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.filter(|s| *s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

fn event_time(event: &Option<StopTimeEvent>) -> Option<DateTime<Utc>> {
    timestamp(event.as_ref().and_then(|e| e.time))
}

/// Trip updates for `route_code`, with stop ids resolved against the
/// snapshot's stop table.
pub fn trip_progress_for(
    entities: &[FeedEntity],
    route_code: &str,
    snapshot: &Snapshot,
) -> Vec<TripProgress> {
    entities
        .iter()
        .filter(|e| !e.is_deleted())
        .filter_map(|e| e.trip_update.as_ref())
        .filter(|u| {
            u.trip
                .as_ref()
                .and_then(|t| t.route_id.as_deref())
                .is_some_and(|r| r.trim() == route_code)
        })
        .map(|update| {
            let trip = update.trip.clone().unwrap_or_default();
            let stops = update
                .stop_time_update
                .iter()
                .map(|stu| StopPrediction {
                    stop_sequence: stu.stop_sequence,
                    stop_name: stu
                        .stop_id
                        .as_deref()
                        .and_then(|id| snapshot.stop(id))
                        .map(|s| s.name.clone()),
                    stop_id: stu.stop_id.clone(),
                    arrival: event_time(&stu.arrival),
                    departure: event_time(&stu.departure),
                    delay_secs: stu
                        .arrival
                        .as_ref()
                        .and_then(|a| a.delay)
                        .or_else(|| stu.departure.as_ref().and_then(|d| d.delay)),
                    schedule_relationship: stu.schedule_relationship.clone(),
                })
                .collect();

            TripProgress {
                trip_id: trip.trip_id,
                vehicle_id: update
                    .vehicle
                    .as_ref()
                    .and_then(|v| v.id.clone().or_else(|| v.label.clone())),
                start_time: trip.start_time,
                start_date: trip.start_date,
                schedule_relationship: trip.schedule_relationship,
                stops,
            }
        })
        .collect()
}

/// Alerts naming `route_code` among their informed entities.
pub fn alerts_for(entities: &[FeedEntity], route_code: &str) -> Vec<ServiceAlert> {
    entities
        .iter()
        .filter(|e| !e.is_deleted())
        .filter_map(|e| e.alert.as_ref().map(|a| (e.id.clone(), a)))
        .filter(|(_, a)| a.affects_route(route_code))
        .map(|(id, alert)| ServiceAlert {
            id,
            header: alert.header_text.as_ref().and_then(|t| t.text()).map(str::to_string),
            description: alert
                .description_text
                .as_ref()
                .and_then(|t| t.text())
                .map(str::to_string),
            cause: alert.cause.clone(),
            effect: alert.effect.clone(),
            severity: alert.severity_level.clone(),
            active_periods: alert
                .active_period
                .iter()
                .map(|p| ActivePeriod {
                    start: timestamp(p.start),
                    end: timestamp(p.end),
                })
                .collect(),
        })
        .collect()
}

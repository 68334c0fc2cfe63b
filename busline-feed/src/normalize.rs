use std::collections::{BTreeMap, HashMap};

use busline_core::{GeoPoint, Route, Snapshot, VehiclePosition};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MalformedRecord;
use crate::gtfs::{FeedEntity, RouteRecord};
use crate::source::RawFeed;

#[derive(Debug)]
pub struct Normalized {
    pub snapshot: Snapshot,
    pub skipped: Vec<MalformedRecord>,
}

/// Validates a raw fetch and builds the next snapshot from it.
///
/// Bad records are dropped and reported in `skipped`; they never fail the
/// whole refresh. Vehicles come out ordered by `vehicle_id`.
pub fn normalize(
    raw: RawFeed,
    version: u64,
    fetched_at: DateTime<Utc>,
    default_seat_capacity: u32,
) -> Normalized {
    let mut skipped = raw.skipped;
    let (records, stops) = match raw.static_gtfs {
        Some(gtfs) => (gtfs.routes.clone(), gtfs.stops.clone()),
        None => Default::default(),
    };
    let mut routes = build_route_table(records, &mut skipped);

    let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
    for (idx, entity) in raw.entities.into_iter().enumerate() {
        if entity.is_deleted() {
            continue;
        }
        let key = entity.id.clone().unwrap_or_else(|| format!("entity#{}", idx));

        match vehicle_from_entity(entity, fetched_at, default_seat_capacity) {
            Ok((route_code, vehicle)) => {
                // Duplicate ids: the freshest observation wins.
                let stale = match candidates.get(&vehicle.vehicle_id) {
                    Some(existing) if existing.vehicle.observed_at >= vehicle.observed_at => {
                        Some(key)
                    }
                    _ => candidates
                        .insert(vehicle.vehicle_id.clone(), Candidate { key, route_code, vehicle })
                        .map(|evicted| evicted.key),
                };
                if let Some(stale) = stale {
                    skipped.push(MalformedRecord::new(stale, "duplicate vehicle, older observation"));
                }
            }
            Err(reason) => skipped.push(MalformedRecord::new(key, reason)),
        }
    }

    // Routes are only synthesized for vehicles that made it into the snapshot.
    let vehicles: Vec<VehiclePosition> = candidates
        .into_values()
        .map(|Candidate { route_code, mut vehicle, .. }| {
            vehicle.route_id = routes
                .entry(route_code.clone())
                .or_insert_with(|| Route::new(route_code.clone(), route_code))
                .id;
            vehicle
        })
        .collect();

    let routes: HashMap<Uuid, Route> = routes.into_values().map(|r| (r.id, r)).collect();
    let snapshot = Snapshot::new(version, routes, vehicles, fetched_at).with_stops(stops);

    Normalized { snapshot, skipped }
}

struct Candidate {
    key: String,
    route_code: String,
    vehicle: VehiclePosition,
}

fn build_route_table(
    records: Vec<RouteRecord>,
    skipped: &mut Vec<MalformedRecord>,
) -> HashMap<String, Route> {
    let mut table = HashMap::with_capacity(records.len());
    for record in records {
        if table.contains_key(&record.route_id) {
            skipped.push(MalformedRecord::new(
                format!("route {}", record.route_id),
                "duplicate route_id",
            ));
            continue;
        }
        let route = Route::new(record.route_id.clone(), record.display_name());
        table.insert(record.route_id, route);
    }
    table
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Returns the route code and a position whose `route_id` is still unset.
fn vehicle_from_entity(
    entity: FeedEntity,
    fetched_at: DateTime<Utc>,
    default_seat_capacity: u32,
) -> Result<(String, VehiclePosition), String> {
    let record = entity.vehicle.ok_or("missing vehicle payload")?;
    let descriptor = record.vehicle.unwrap_or_default();
    let trip = record.trip.unwrap_or_default();

    let vehicle_id = non_empty(descriptor.id)
        .or_else(|| non_empty(descriptor.label))
        .ok_or("missing vehicle id and label")?;
    let route_code = non_empty(trip.route_id).ok_or("missing route_id")?;

    let position = record.position.ok_or("missing position")?;
    let (latitude, longitude) = match (position.latitude, position.longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err("missing coordinates".to_string()),
    };
    GeoPoint::new(latitude, longitude).map_err(|e| e.to_string())?;
    if latitude == 0.0 && longitude == 0.0 {
        return Err("placeholder coordinates (0, 0)".to_string());
    }

    let observed_at = match record.timestamp {
        None | Some(0) => fetched_at,
        Some(ts) => i64::try_from(ts)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| format!("timestamp out of range: {}", ts))?,
    };

    let seat_capacity = match descriptor.seat_capacity {
        None => default_seat_capacity,
        Some(0) => return Err("seat_capacity must be positive".to_string()),
        Some(n) => u32::try_from(n).map_err(|_| format!("seat_capacity out of range: {}", n))?,
    };

    let vehicle = VehiclePosition {
        vehicle_id,
        route_id: Uuid::nil(),
        latitude,
        longitude,
        observed_at,
        trip_ref: non_empty(trip.trip_id),
        speed: position.speed.filter(|s| s.is_finite()),
        bearing: position.bearing.filter(|b| b.is_finite()),
        next_stop: non_empty(record.stop_id),
        seat_capacity,
    };
    Ok((route_code, vehicle))
}

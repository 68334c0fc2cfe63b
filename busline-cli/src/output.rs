use std::fmt::Write;

use busline_booking::SeatEvent;
use busline_core::{Booking, Snapshot, VehiclePosition};
use busline_feed::route_view::StopPrediction;
use busline_feed::{CacheStatus, NearbyResult, RouteInfo};
use chrono::{DateTime, Utc};

const STOPS_PER_TRIP: usize = 5;

fn freshness(as_of: DateTime<Utc>, degraded: bool) -> String {
    let mut line = format!("as of {}", as_of.format("%H:%M:%S UTC"));
    if degraded {
        line.push_str(" (STALE: transit data is not updating)");
    }
    line
}

fn route_label(snapshot: &Snapshot, vehicle: &VehiclePosition) -> String {
    snapshot
        .route(&vehicle.route_id)
        .map(|r| r.display_name.clone())
        .unwrap_or_else(|| "unknown route".to_string())
}

pub fn render_nearby(result: &NearbyResult, snapshot: &Snapshot, radius_miles: f64) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} bus(es) within {:.1} mi, snapshot v{} {}",
        result.vehicles.len(),
        radius_miles,
        result.snapshot_version,
        freshness(result.as_of, result.degraded)
    );
    for hit in &result.vehicles {
        let _ = write!(
            out,
            "  {:>8}  {:>5.2} mi  {:>3} seats  {}",
            hit.vehicle.vehicle_id,
            hit.distance_miles,
            hit.vehicle.seat_capacity,
            route_label(snapshot, &hit.vehicle)
        );
        if let Some(stop) = &hit.vehicle.next_stop {
            let _ = write!(out, "  next: {}", snapshot.stop_label(stop));
        }
        out.push('\n');
    }
    out
}

fn delay_label(secs: i64) -> String {
    let (m, s) = (secs.abs() / 60, secs.abs() % 60);
    match secs {
        0 => "on time".to_string(),
        d if d > 0 => format!("{}m{:02}s late", m, s),
        _ => format!("{}m{:02}s early", m, s),
    }
}

fn render_prediction(out: &mut String, stop: &StopPrediction) {
    let name = stop
        .stop_name
        .as_deref()
        .or(stop.stop_id.as_deref())
        .unwrap_or("unknown stop");
    let _ = write!(out, "      {}", name);
    if let Some(at) = stop.arrival.or(stop.departure) {
        let _ = write!(out, "  {}", at.format("%H:%M UTC"));
    }
    if let Some(delay) = stop.delay_secs {
        let _ = write!(out, "  ({})", delay_label(delay));
    }
    if let Some(rel) = stop.schedule_relationship.as_deref().filter(|r| *r != "SCHEDULED") {
        let _ = write!(out, "  [{}]", rel);
    }
    out.push('\n');
}

pub fn render_route(info: &RouteInfo) -> String {
    let mut out = format!(
        "Route {} ({}): {} active bus(es), snapshot v{} {}\n",
        info.route.external_code,
        info.route.display_name,
        info.vehicles.len(),
        info.snapshot_version,
        freshness(info.as_of, info.degraded)
    );
    for v in &info.vehicles {
        let next = v
            .next_stop_name
            .as_deref()
            .or(v.vehicle.next_stop.as_deref())
            .unwrap_or("-");
        let _ = writeln!(
            out,
            "  {:>8}  ({:.5}, {:.5})  next stop: {}",
            v.vehicle.vehicle_id, v.vehicle.latitude, v.vehicle.longitude, next
        );
    }

    if !info.trip_updates.is_empty() {
        out.push_str("Upcoming stops:\n");
        for trip in &info.trip_updates {
            let _ = writeln!(
                out,
                "    trip {} (bus {}, started {})",
                trip.trip_id.as_deref().unwrap_or("?"),
                trip.vehicle_id.as_deref().unwrap_or("?"),
                trip.start_time.as_deref().unwrap_or("?")
            );
            for stop in trip.stops.iter().take(STOPS_PER_TRIP) {
                render_prediction(&mut out, stop);
            }
            if trip.stops.len() > STOPS_PER_TRIP {
                let _ = writeln!(out, "      ... {} more", trip.stops.len() - STOPS_PER_TRIP);
            }
        }
    }

    if !info.alerts.is_empty() {
        out.push_str("Alerts:\n");
        for alert in &info.alerts {
            let _ = writeln!(
                out,
                "  [{}] {}",
                alert.effect.as_deref().unwrap_or("NOTICE"),
                alert.header.as_deref().unwrap_or("Service alert")
            );
            if let Some(description) = &alert.description {
                let _ = writeln!(out, "      {}", description);
            }
        }
    }

    if !info.unavailable.is_empty() {
        let _ = writeln!(out, "(not available right now: {})", info.unavailable.join(", "));
    }
    out
}

pub fn render_booking(booking: &Booking) -> String {
    format!(
        "Booked seat {} on bus {} for {} (booking {}, trip {})",
        booking.seat_number,
        booking.vehicle_id,
        booking.holder_id,
        booking.booking_id,
        booking.trip_id
    )
}

pub fn render_status(status: &CacheStatus) -> String {
    match (status.version, status.fetched_at) {
        (Some(version), Some(at)) => format!(
            "snapshot v{} with {} bus(es), {}, {} failed refresh(es) in a row",
            version,
            status.vehicle_count,
            freshness(at, status.degraded),
            status.consecutive_failures
        ),
        _ => "no transit data loaded yet".to_string(),
    }
}

pub fn render_event(event: &SeatEvent) -> String {
    format!(
        "seat {} {:?} by {}",
        event.seat_number, event.kind, event.holder_id
    )
}

//! Great-circle distance math.
//!
//! Distances use the haversine formula on a spherical Earth, which is
//! accurate to well under one percent at the ranges a rider cares about.

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

pub const EARTH_RADIUS_MILES: f64 = 3958.8;
pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_PER_MILE: f64 = 1.609_344;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Builds a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> CoreResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoreError::ValidationError(format!(
                "latitude out of range: {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::ValidationError(format!(
                "longitude out of range: {}",
                longitude
            )));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn distance_miles(&self, other: &GeoPoint) -> f64 {
        haversine_miles(self, other)
    }

    /// The point reached by travelling `miles` from here along the initial
    /// `bearing_deg` (clockwise from true north).
    pub fn destination(&self, bearing_deg: f64, miles: f64) -> GeoPoint {
        let angular = miles / EARTH_RADIUS_MILES;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        // Normalise longitude back into [-180, 180).
        let lon2 = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
        GeoPoint {
            latitude: lat2.to_degrees(),
            longitude: lon2,
        }
    }
}

/// Central angle between two points, in radians.
fn central_angle(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    2.0 * h.sqrt().min(1.0).asin()
}

pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    EARTH_RADIUS_MILES * central_angle(a, b)
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    EARTH_RADIUS_KM * central_angle(a, b)
}

pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}

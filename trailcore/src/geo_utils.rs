//! Geographic utilities.

use crate::GpsPoint;

/// Mean Earth radius used for all route distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometers (haversine).
pub fn haversine_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Great-circle distance between two points in meters.
pub fn haversine_m(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_km(p1, p2) * 1000.0
}

/// Latitude delta (degrees) covering `meters` along a meridian.
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    (meters / 1000.0 / EARTH_RADIUS_KM).to_degrees()
}

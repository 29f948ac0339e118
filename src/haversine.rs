//! Great-circle distances between geographic points.
//!
//! Used for edge weights when a section has no explicit length and as the
//! admissible A* heuristic of the router.

use crate::polyline::GeoPoint;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometers.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Distance between two optional positions; `None` if either is unknown.
pub fn haversine_between(from: Option<GeoPoint>, to: Option<GeoPoint>) -> Option<f64> {
    match (from, to) {
        (Some(from), Some(to)) => Some(haversine_km(from, to)),
        _ => None,
    }
}

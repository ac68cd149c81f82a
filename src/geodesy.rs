//! Great-circle helpers shared by every stage of the pipeline.

use crate::types::GeoPoint;

/// Mean Earth radius used by all distance computations (m).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters.
///
/// Evaluation order is fixed so results match earlier exports bit for bit.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1 * std::f64::consts::PI / 180.0;
    let phi2 = lat2 * std::f64::consts::PI / 180.0;
    let d_phi = (lat2 - lat1) * std::f64::consts::PI / 180.0;
    let d_lambda = (lon2 - lon1) * std::f64::consts::PI / 180.0;

    let a = (d_phi / 2.0).sin() * (d_phi / 2.0).sin()
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin() * (d_lambda / 2.0).sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

pub fn distance_between(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Meters spanned by one degree of latitude.
pub fn meters_per_degree_lat() -> f64 {
    EARTH_RADIUS_M * std::f64::consts::PI / 180.0
}

/// Meters spanned by one degree of longitude at `lat`.
pub fn meters_per_degree_lon(lat: f64) -> f64 {
    meters_per_degree_lat() * lat.to_radians().cos()
}

/// Convert a ground speed and course into (lat, lon) rates in degrees/second.
pub fn velocity_to_degrees(speed_mps: f64, heading_rad: f64, lat: f64) -> (f64, f64) {
    let north = speed_mps * heading_rad.cos();
    let east = speed_mps * heading_rad.sin();
    let lon_scale = meters_per_degree_lon(lat);
    let v_lon = if lon_scale.abs() > 1e-9 {
        east / lon_scale
    } else {
        0.0
    };
    (north / meters_per_degree_lat(), v_lon)
}

/// Offset a point by meters north/east, for building synthetic tracks.
#[cfg(test)]
pub(crate) fn offset_meters(origin: &GeoPoint, north_m: f64, east_m: f64) -> GeoPoint {
    GeoPoint::new(
        origin.latitude + north_m / meters_per_degree_lat(),
        origin.longitude + east_m / meters_per_degree_lon(origin.latitude),
    )
}

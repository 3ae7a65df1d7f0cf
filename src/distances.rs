use crate::structs::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between `a` and `b` in kilometers (haversine).
///
/// Coordinates are not range checked, a NaN component yields NaN.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

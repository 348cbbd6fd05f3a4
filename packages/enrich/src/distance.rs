//! Great-circle distance on the WGS84 ellipsoid.
//!
//! Uses Karney's geodesic algorithm (via `geo`'s [`Geodesic`] metric), which
//! is accurate to a few nanometres, rather than a spherical haversine.

use geo::{Distance as _, Geodesic, Point};
use resale_map_enrich_models::Coordinate;

/// Geodesic distance between two coordinates in meters.
#[must_use]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let a = Point::new(a.longitude(), a.latitude());
    let b = Point::new(b.longitude(), b.latitude());
    Geodesic.distance(a, b)
}

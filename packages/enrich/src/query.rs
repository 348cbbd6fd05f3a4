//! Overpass QL query construction.
//!
//! Renders a single union query that asks for every amenity category the
//! classifier understands within a radius of a point. When a snapshot date
//! is supplied the query carries an `[date:"..."]` setting so Overpass
//! answers from the historical graph instead of the live one.

use std::fmt::Write as _;

use chrono::NaiveDate;
use resale_map_enrich_models::Coordinate;

use crate::InputError;

/// Default search radius around each point.
pub const DEFAULT_RADIUS_METERS: u32 = 500;

/// Element filters requested by [`build_query`].
///
/// Each entry is `(element type, tag key, tag value)`.
const FILTERS: &[(&str, &str, &str)] = &[
    ("node", "highway", "bus_stop"),
    ("way", "railway", "station"),
    ("node", "railway", "station"),
    ("way", "shop", "mall"),
    ("node", "shop", "mall"),
    ("way", "amenity", "shopping_mall"),
    ("node", "amenity", "shopping_mall"),
    ("way", "amenity", "school"),
];

/// A month-granularity snapshot, pinned to the first instant of the month
/// in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotDate(NaiveDate);

impl SnapshotDate {
    /// Parses a `YYYY-MM` period. A one-digit month (`2017-3`) is
    /// accepted; a day component is not.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidPeriod`] if `period` is not a valid
    /// four-digit year and month.
    pub fn parse(period: &str) -> Result<Self, InputError> {
        let invalid = || InputError::InvalidPeriod {
            period: period.to_string(),
        };
        let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

        let (year, month) = period.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || !is_digits(year) || month.len() > 2 || !is_digits(month) {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(invalid)
    }

    /// ISO 8601 instant at midnight UTC on the first of the month.
    #[must_use]
    pub fn to_instant(&self) -> String {
        self.0.format("%Y-%m-01T00:00:00Z").to_string()
    }
}

/// Builds the amenity query for `radius_meters` around `center`.
#[must_use]
pub fn build_query(
    center: Coordinate,
    radius_meters: u32,
    snapshot: Option<&SnapshotDate>,
) -> String {
    let lat = center.latitude();
    let lon = center.longitude();

    let mut query = String::from("[out:json]");
    if let Some(snapshot) = snapshot {
        write!(query, "[date:\"{}\"]", snapshot.to_instant()).unwrap();
    }
    query.push_str(";\n(\n");

    for (element, key, value) in FILTERS {
        writeln!(
            query,
            "  {element}[\"{key}\"=\"{value}\"](around:{radius_meters},{lat},{lon});"
        )
        .unwrap();
    }

    query.push_str(");\nout body geom;\n");
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> Coordinate {
        Coordinate::new(1.3521, 103.8198).unwrap()
    }

    #[test]
    fn parses_period_to_month_start() {
        let snapshot = SnapshotDate::parse("2017-03").unwrap();
        assert_eq!(snapshot.to_instant(), "2017-03-01T00:00:00Z");
    }

    #[test]
    fn accepts_single_digit_month() {
        let snapshot = SnapshotDate::parse("2017-3").unwrap();
        assert_eq!(snapshot.to_instant(), "2017-03-01T00:00:00Z");
        assert_eq!(snapshot, SnapshotDate::parse(" 2017-03 ").unwrap());
    }

    #[test]
    fn rejects_bad_periods() {
        for bad in [
            "", "2017", "2017-13", "2017-0", "17-03", "2017/03", "2017-03-15", "2017-003",
            "2017-+3", "March",
        ] {
            assert!(SnapshotDate::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn live_query_has_no_date() {
        let query = build_query(center(), DEFAULT_RADIUS_METERS, None);
        assert!(query.starts_with("[out:json];"));
        assert!(!query.contains("date:"));
        assert!(query.contains("node[\"highway\"=\"bus_stop\"](around:500,1.3521,103.8198);"));
        assert!(query.contains("way[\"amenity\"=\"school\"](around:500,1.3521,103.8198);"));
        assert!(query.trim_end().ends_with("out body geom;"));
    }

    #[test]
    fn snapshot_query_is_scoped() {
        let snapshot = SnapshotDate::parse("2019-11").unwrap();
        let query = build_query(center(), 750, Some(&snapshot));
        assert!(query.starts_with("[out:json][date:\"2019-11-01T00:00:00Z\"];"));
        assert!(query.contains("(around:750,1.3521,103.8198)"));
    }

    #[test]
    fn requests_every_category() {
        let query = build_query(center(), DEFAULT_RADIUS_METERS, None);
        for needle in [
            "\"railway\"=\"station\"",
            "\"shop\"=\"mall\"",
            "\"amenity\"=\"shopping_mall\"",
            "\"amenity\"=\"school\"",
        ] {
            assert!(query.contains(needle), "missing {needle}");
        }
    }
}

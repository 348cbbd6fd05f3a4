#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate, Overpass response, and amenity feature types.
//!
//! These types are shared between the enrichment pipeline and anything
//! that consumes its output. They carry no I/O and no async code.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Column names appended to the output table, in output order.
pub const FEATURE_COLUMNS: [&str; 8] = [
    "nearest_bus_stop_distance",
    "nearest_mrt_distance",
    "nearest_mall_distance",
    "nearest_school_distance",
    "bus_stop_count",
    "mrt_count",
    "mall_count",
    "school_count",
];

/// A WGS84 position in decimal degrees.
///
/// Construction validates the range, so every `Coordinate` in the
/// pipeline is known to be finite and on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate after checking both components are finite and
    /// within `[-90, 90]` / `[-180, 180]`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either component is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinateError> {
        if latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude)
        {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(InvalidCoordinateError {
                latitude,
                longitude,
            })
        }
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Error returned when a latitude/longitude pair is not a valid position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinateError {
    /// The rejected latitude.
    pub latitude: f64,
    /// The rejected longitude.
    pub longitude: f64,
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinate ({}, {}): expected latitude in [-90, 90] and longitude in [-180, 180]",
            self.latitude, self.longitude
        )
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// Cache key for an amenity lookup: the exact query position plus the
/// optional snapshot instant.
///
/// Equality is exact on the coordinate values, with no rounding: two keys
/// that differ by `1e-9` degrees are different keys. `-0.0` and `0.0` are
/// the same value and therefore the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryKey {
    /// Latitude the query was centred on.
    pub latitude: f64,
    /// Longitude the query was centred on.
    pub longitude: f64,
    /// Snapshot instant (`YYYY-MM-01T00:00:00Z`), if the query is historical.
    pub date: Option<String>,
}

impl QueryKey {
    /// Builds a key for `coordinate` at the optional snapshot instant.
    #[must_use]
    pub fn new(coordinate: Coordinate, date: Option<String>) -> Self {
        Self::from_parts(coordinate.latitude, coordinate.longitude, date)
    }

    /// Builds a key from raw components, folding `-0.0` into `0.0`.
    #[must_use]
    pub fn from_parts(latitude: f64, longitude: f64, date: Option<String>) -> Self {
        Self {
            latitude: unsigned_zero(latitude),
            longitude: unsigned_zero(longitude),
            date,
        }
    }
}

fn unsigned_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueryKey {}

impl PartialOrd for QueryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        unsigned_zero(self.latitude)
            .total_cmp(&unsigned_zero(other.latitude))
            .then_with(|| unsigned_zero(self.longitude).total_cmp(&unsigned_zero(other.longitude)))
            .then_with(|| self.date.cmp(&other.date))
    }
}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        unsigned_zero(self.latitude).to_bits().hash(state);
        unsigned_zero(self.longitude).to_bits().hash(state);
        self.date.hash(state);
    }
}

/// Overpass `[out:json]` response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawQueryResult {
    /// Returned elements, in server order.
    #[serde(default)]
    pub elements: Vec<OsmElement>,
}

/// OSM element type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ElementKind {
    /// A single point.
    Node,
    /// An open or closed polyline; areas are closed ways.
    Way,
    /// A multipolygon or other relation.
    Relation,
    /// Anything the pipeline does not know about.
    #[serde(other)]
    Other,
}

/// A single vertex of an element's `geom` output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryVertex {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

/// One element of an Overpass response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmElement {
    /// Point vs. area discriminator.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// OSM id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Latitude for nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude for nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Vertex list for ways queried with `out geom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<GeometryVertex>>,
    /// OSM tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl OsmElement {
    /// Returns the tag value for `key`, if set.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Amenity categories tracked for proximity scoring.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AmenityCategory {
    /// `highway=bus_stop`
    BusStop,
    /// `railway=station` (MRT/LRT)
    Station,
    /// `shop=mall` or `amenity=shopping_mall`
    Mall,
    /// `amenity=school`
    School,
}

impl AmenityCategory {
    /// All categories, in output column order.
    pub const ALL: [Self; 4] = [Self::BusStop, Self::Station, Self::Mall, Self::School];

    /// Whether records of this category carry a street address.
    #[must_use]
    pub const fn has_address(self) -> bool {
        matches!(self, Self::Mall | Self::School)
    }

    /// Position of this category in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// An amenity found near a query point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmenityRecord {
    /// Which bucket this amenity landed in.
    pub category: AmenityCategory,
    /// `name` tag, or `"Unnamed"`.
    pub name: String,
    /// Geodesic distance from the query point.
    pub distance_meters: f64,
    /// `addr:street` tag for malls and schools (`"No address"` when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Amenities of one category, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBucket {
    /// The category every record in this bucket belongs to.
    pub category: AmenityCategory,
    /// Records sorted ascending by distance (stable).
    pub records: Vec<AmenityRecord>,
}

impl CategoryBucket {
    /// Creates an empty bucket.
    #[must_use]
    pub const fn new(category: AmenityCategory) -> Self {
        Self {
            category,
            records: Vec::new(),
        }
    }

    /// Distance to the nearest record, if any.
    #[must_use]
    pub fn nearest_distance(&self) -> Option<f64> {
        self.records.first().map(|r| r.distance_meters)
    }

    /// Reduces the bucket to its feature values.
    #[must_use]
    pub fn feature(&self) -> CategoryFeature {
        CategoryFeature {
            nearest_distance: self.nearest_distance(),
            count: self.records.len() as u64,
        }
    }
}

/// Nearest distance and count for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryFeature {
    /// `None` when no amenity of this category was found.
    pub nearest_distance: Option<f64>,
    /// Number of amenities found.
    pub count: u64,
}

/// Per-category features for a successfully enriched row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmenityFeatures {
    /// Indexed by [`AmenityCategory::index`].
    pub categories: [CategoryFeature; 4],
}

impl AmenityFeatures {
    /// Features for one category.
    #[must_use]
    pub const fn get(&self, category: AmenityCategory) -> &CategoryFeature {
        &self.categories[category.index()]
    }
}

/// Fixed-shape output for one input row.
///
/// [`FeatureRecord::Degraded`] means the row could not be enriched at all
/// (bad input or upstream unavailable) and every output column is empty.
/// That is different from an enriched row that found nothing, which has
/// zero counts and absent distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureRecord {
    /// All eight fields absent.
    #[default]
    Degraded,
    /// Lookup succeeded.
    Enriched(AmenityFeatures),
}

impl FeatureRecord {
    /// Returns the features if the row was enriched.
    #[must_use]
    pub const fn features(&self) -> Option<&AmenityFeatures> {
        match self {
            Self::Degraded => None,
            Self::Enriched(features) => Some(features),
        }
    }

    /// Whether this is the all-absent record.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }
}

/// One input row as seen by the row processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRow {
    /// `Latitude` column; `None` if empty or not a number.
    pub latitude: Option<f64>,
    /// `Longitude` column; `None` if empty or not a number.
    pub longitude: Option<f64>,
    /// `month` column as written (expected `YYYY-MM`).
    pub period: Option<String>,
}

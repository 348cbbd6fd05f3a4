//! Amenity classification for Overpass responses.
//!
//! Every element gets one representative position (the node itself, or the
//! vertex mean of a way's geometry), a geodesic distance from the query
//! point, and at most one category. Categories are checked in a fixed
//! priority order and the first match wins.

use resale_map_enrich_models::{
    AmenityCategory, AmenityFeatures, AmenityRecord, CategoryBucket, Coordinate, ElementKind,
    OsmElement, RawQueryResult,
};

use crate::distance::distance_meters;

/// Name used when an element has no `name` tag.
pub const UNNAMED: &str = "Unnamed";

/// Address used for malls and schools without an `addr:street` tag.
pub const NO_ADDRESS: &str = "No address";

/// The four category buckets for one query point.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBuckets {
    buckets: [CategoryBucket; 4],
}

impl Default for CategoryBuckets {
    fn default() -> Self {
        Self {
            buckets: AmenityCategory::ALL.map(CategoryBucket::new),
        }
    }
}

impl CategoryBuckets {
    /// The bucket for `category`.
    #[must_use]
    pub const fn get(&self, category: AmenityCategory) -> &CategoryBucket {
        &self.buckets[category.index()]
    }

    /// All buckets in column order.
    #[must_use]
    pub const fn all(&self) -> &[CategoryBucket; 4] {
        &self.buckets
    }

    /// Reduces every bucket to its nearest distance and count.
    #[must_use]
    pub fn features(&self) -> AmenityFeatures {
        AmenityFeatures {
            categories: [
                self.buckets[0].feature(),
                self.buckets[1].feature(),
                self.buckets[2].feature(),
                self.buckets[3].feature(),
            ],
        }
    }

    fn push(&mut self, record: AmenityRecord) {
        self.buckets[record.category.index()].records.push(record);
    }

    fn sort(&mut self) {
        for bucket in &mut self.buckets {
            // `sort_by` is stable, so equal distances keep discovery order.
            bucket
                .records
                .sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        }
    }
}

/// Determines the category of an element from its tags.
///
/// Priority: bus stop, station, mall, school. Elements matching none of
/// these return `None`.
#[must_use]
pub fn categorize(element: &OsmElement) -> Option<AmenityCategory> {
    if element.tag("highway") == Some("bus_stop") {
        Some(AmenityCategory::BusStop)
    } else if element.tag("railway") == Some("station") {
        Some(AmenityCategory::Station)
    } else if element.tag("shop") == Some("mall")
        || element.tag("amenity") == Some("shopping_mall")
    {
        Some(AmenityCategory::Mall)
    } else if element.tag("amenity") == Some("school") {
        Some(AmenityCategory::School)
    } else {
        None
    }
}

/// Representative position of an element.
///
/// Nodes use their own coordinates. Anything with a geometry uses the
/// arithmetic mean of its vertices, which is a cheap stand-in for the
/// polygon centroid at neighbourhood scale. Returns `None` when neither is
/// available or the result is not a valid coordinate.
#[must_use]
pub fn representative_point(element: &OsmElement) -> Option<Coordinate> {
    if element.kind == ElementKind::Node
        && let (Some(lat), Some(lon)) = (element.lat, element.lon)
    {
        return Coordinate::new(lat, lon).ok();
    }

    let geometry = element.geometry.as_deref()?;
    if geometry.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = geometry.len() as f64;
    let lat = geometry.iter().map(|v| v.lat).sum::<f64>() / n;
    let lon = geometry.iter().map(|v| v.lon).sum::<f64>() / n;
    Coordinate::new(lat, lon).ok()
}

/// Sorts the elements of `result` into category buckets by distance from
/// `origin`.
#[must_use]
pub fn classify(result: &RawQueryResult, origin: Coordinate) -> CategoryBuckets {
    let mut buckets = CategoryBuckets::default();

    for element in &result.elements {
        let Some(point) = representative_point(element) else {
            log::trace!("Skipping element {:?} without a position", element.id);
            continue;
        };

        let Some(category) = categorize(element) else {
            continue;
        };

        let name = element.tag("name").unwrap_or(UNNAMED).to_string();
        let address = category
            .has_address()
            .then(|| element.tag("addr:street").unwrap_or(NO_ADDRESS).to_string());

        buckets.push(AmenityRecord {
            category,
            name,
            distance_meters: distance_meters(origin, point),
            address,
        });
    }

    buckets.sort();
    buckets
}

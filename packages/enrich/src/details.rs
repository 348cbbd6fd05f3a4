//! Optional per-row amenity detail output (JSON Lines).
//!
//! The feature table only keeps the nearest distance and count per
//! category. The details file keeps every amenity found for each row, with
//! names and addresses, one JSON object per input row.

use std::io::Write;
use std::path::Path;

use resale_map_enrich_models::{AmenityRecord, CategoryBucket};
use serde::Serialize;

use crate::EnrichError;
use crate::classify::CategoryBuckets;

#[derive(Serialize)]
struct DetailLine<'a> {
    row: usize,
    bus_stops: Option<&'a [AmenityRecord]>,
    stations: Option<&'a [AmenityRecord]>,
    malls: Option<&'a [AmenityRecord]>,
    schools: Option<&'a [AmenityRecord]>,
}

impl<'a> DetailLine<'a> {
    fn new(row: usize, buckets: Option<&'a CategoryBuckets>) -> Self {
        let records = |i: usize| buckets.map(|b| b.all()[i].records.as_slice());
        Self {
            row,
            bus_stops: records(0),
            stations: records(1),
            malls: records(2),
            schools: records(3),
        }
    }
}

/// Writes one JSON line per row. Rows whose lookup degraded have `null`
/// for every category.
///
/// # Errors
///
/// Returns [`EnrichError`] if serialization or writing fails.
pub fn write_details_to(
    mut writer: impl Write,
    details: &[Option<CategoryBuckets>],
    label: &str,
) -> Result<(), EnrichError> {
    let io_err = |e| EnrichError::Io {
        path: label.to_string(),
        source: e,
    };

    for (row, buckets) in details.iter().enumerate() {
        serde_json::to_writer(&mut writer, &DetailLine::new(row, buckets.as_ref()))?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Writes the details file to `path`.
///
/// # Errors
///
/// Returns [`EnrichError`] if the file cannot be created or written.
pub fn write_details(path: &Path, details: &[Option<CategoryBuckets>]) -> Result<(), EnrichError> {
    let file = std::fs::File::create(path).map_err(|e| EnrichError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    write_details_to(
        std::io::BufWriter::new(file),
        details,
        &path.display().to_string(),
    )?;
    log::info!("Wrote amenity details for {} rows to {}", details.len(), path.display());
    Ok(())
}

/// Short human-readable summary of the nearest amenity in a bucket.
#[must_use]
pub fn describe_nearest(bucket: &CategoryBucket) -> String {
    bucket.records.first().map_or_else(
        || format!("no {} found", bucket.category),
        |r| {
            let address = r
                .address
                .as_deref()
                .map(|a| format!(", {a}"))
                .unwrap_or_default();
            format!(
                "{} {} ({:.0} m{address}), {} total",
                bucket.category,
                r.name,
                r.distance_meters,
                bucket.records.len()
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use resale_map_enrich_models::{
        AmenityCategory, Coordinate, ElementKind, OsmElement, RawQueryResult,
    };

    fn buckets() -> CategoryBuckets {
        let result = RawQueryResult {
            elements: vec![OsmElement {
                kind: ElementKind::Node,
                id: Some(1),
                lat: Some(1.351),
                lon: Some(103.8),
                geometry: None,
                tags: [
                    ("shop".to_string(), "mall".to_string()),
                    ("name".to_string(), "Century Square".to_string()),
                ]
                .into_iter()
                .collect(),
            }],
        };
        classify(&result, Coordinate::new(1.35, 103.8).unwrap())
    }

    #[test]
    fn writes_one_line_per_row() {
        let details = vec![Some(buckets()), None];
        let mut out = Vec::new();
        write_details_to(&mut out, &details, "details").unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["row"], 0);
        assert_eq!(lines[0]["malls"][0]["name"], "Century Square");
        assert_eq!(lines[0]["malls"][0]["address"], "No address");
        assert_eq!(lines[0]["bus_stops"].as_array().map(Vec::len), Some(0));
        assert!(lines[1]["malls"].is_null());
    }

    #[test]
    fn describes_nearest() {
        let b = buckets();
        let mall = describe_nearest(b.get(AmenityCategory::Mall));
        assert!(mall.starts_with("mall Century Square ("), "{mall}");
        assert!(mall.ends_with(", No address), 1 total"), "{mall}");
        assert_eq!(describe_nearest(b.get(AmenityCategory::School)), "no school found");
    }
}

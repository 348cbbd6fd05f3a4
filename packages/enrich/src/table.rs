//! CSV input and output tables.
//!
//! The input table is kept as raw CSV records so every column the caller
//! supplied is written back untouched. Only `Latitude`, `Longitude` and
//! the optional `month` column are interpreted.

use std::io::{Read, Write};
use std::path::Path;

use resale_map_enrich_models::{AmenityCategory, FEATURE_COLUMNS, FeatureRecord, InputRow};

use crate::EnrichError;

/// Latitude column name.
pub const LATITUDE_COLUMN: &str = "Latitude";

/// Longitude column name.
pub const LONGITUDE_COLUMN: &str = "Longitude";

/// Optional snapshot period column name (`YYYY-MM`).
pub const PERIOD_COLUMN: &str = "month";

/// A parsed input table.
#[derive(Debug, Clone)]
pub struct InputTable {
    headers: csv::StringRecord,
    records: Vec<csv::StringRecord>,
    latitude_idx: usize,
    longitude_idx: usize,
    period_idx: Option<usize>,
}

impl InputTable {
    /// Reads a CSV table from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the file cannot be read, is not valid CSV,
    /// or lacks a `Latitude` or `Longitude` column.
    pub fn read(path: &Path) -> Result<Self, EnrichError> {
        let file = std::fs::File::open(path).map_err(|e| EnrichError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// Reads a CSV table from any reader. `label` names the source in errors.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read`].
    pub fn from_reader(reader: impl Read, label: &str) -> Result<Self, EnrichError> {
        let csv_err = |e| EnrichError::Csv {
            path: label.to_string(),
            source: e,
        };

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = reader.headers().map_err(csv_err)?.clone();
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);

        let latitude_idx = column(LATITUDE_COLUMN).ok_or_else(|| EnrichError::MissingColumn {
            column: LATITUDE_COLUMN.to_string(),
            path: label.to_string(),
        })?;
        let longitude_idx = column(LONGITUDE_COLUMN).ok_or_else(|| EnrichError::MissingColumn {
            column: LONGITUDE_COLUMN.to_string(),
            path: label.to_string(),
        })?;
        let period_idx = column(PERIOD_COLUMN);

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(csv_err)?;

        // Extra cells have no header to be written back under.
        if let Some((i, record)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() > headers.len())
        {
            return Err(EnrichError::RowTooLong {
                path: label.to_string(),
                row: i + 1,
                cells: record.len(),
                columns: headers.len(),
            });
        }

        log::info!("Read {} rows from {label}", records.len());

        Ok(Self {
            headers,
            records,
            latitude_idx,
            longitude_idx,
            period_idx,
        })
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The interpreted columns of every row, in table order.
    #[must_use]
    pub fn rows(&self) -> Vec<InputRow> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| InputRow {
                latitude: parse_number(record.get(self.latitude_idx), i, LATITUDE_COLUMN),
                longitude: parse_number(record.get(self.longitude_idx), i, LONGITUDE_COLUMN),
                period: self
                    .period_idx
                    .and_then(|idx| record.get(idx))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
            .collect()
    }

    /// Writes the table with the feature columns merged in to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the file cannot be created or written.
    pub fn write(&self, path: &Path, features: &[FeatureRecord]) -> Result<(), EnrichError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EnrichError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let file = std::fs::File::create(path).map_err(|e| EnrichError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        self.write_to(file, features, &path.display().to_string())
    }

    /// Writes the merged table to any writer.
    ///
    /// Feature columns that already exist in the input are overwritten in
    /// place; the rest are appended in [`FEATURE_COLUMNS`] order.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if `features` does not have one record per
    /// row or writing fails.
    pub fn write_to(
        &self,
        writer: impl Write,
        features: &[FeatureRecord],
        label: &str,
    ) -> Result<(), EnrichError> {
        if features.len() != self.records.len() {
            return Err(EnrichError::RowCountMismatch {
                expected: self.records.len(),
                actual: features.len(),
            });
        }

        let csv_err = |e| EnrichError::Csv {
            path: label.to_string(),
            source: e,
        };

        let mut headers: Vec<String> = self.headers.iter().map(str::to_string).collect();
        let mut positions = [0usize; 8];
        for (slot, name) in positions.iter_mut().zip(FEATURE_COLUMNS) {
            let existing = headers.iter().position(|h| h == name);
            *slot = if let Some(idx) = existing {
                idx
            } else {
                headers.push(name.to_string());
                headers.len() - 1
            };
        }

        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&headers).map_err(csv_err)?;

        for (record, feature) in self.records.iter().zip(features) {
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(headers.len(), String::new());
            for (pos, value) in positions.iter().zip(feature_cells(feature)) {
                cells[*pos] = value;
            }
            writer.write_record(&cells).map_err(csv_err)?;
        }

        writer.flush().map_err(|e| EnrichError::Io {
            path: label.to_string(),
            source: e,
        })?;

        log::info!("Wrote {} rows to {label}", self.records.len());
        Ok(())
    }
}

/// Renders a feature record as the eight output cells, in
/// [`FEATURE_COLUMNS`] order. Absent values are empty strings.
#[must_use]
pub fn feature_cells(record: &FeatureRecord) -> [String; 8] {
    let mut cells: [String; 8] = Default::default();
    let Some(features) = record.features() else {
        return cells;
    };

    for category in AmenityCategory::ALL {
        let feature = features.get(category);
        let i = category.index();
        cells[i] = feature
            .nearest_distance
            .map(|d| d.to_string())
            .unwrap_or_default();
        cells[i + 4] = feature.count.to_string();
    }
    cells
}

fn parse_number(cell: Option<&str>, row: usize, column: &str) -> Option<f64> {
    let text = cell?.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Row {row}: {column} value {text:?} is not a number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resale_map_enrich_models::{AmenityFeatures, CategoryFeature};

    const INPUT: &str = "\
town,block,Latitude,Longitude,month
TAMPINES,101,1.3456,103.9441,2017-01
TAMPINES,102,,103.9450,2017-02
TAMPINES,103,1.3470,abc,
";

    fn sample_features() -> AmenityFeatures {
        AmenityFeatures {
            categories: [
                CategoryFeature {
                    nearest_distance: Some(50.5),
                    count: 3,
                },
                CategoryFeature::default(),
                CategoryFeature {
                    nearest_distance: Some(410.0),
                    count: 1,
                },
                CategoryFeature::default(),
            ],
        }
    }

    #[test]
    fn reads_rows() {
        let table = InputTable::from_reader(INPUT.as_bytes(), "input").unwrap();
        let rows = table.rows();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].latitude, Some(1.3456));
        assert_eq!(rows[0].longitude, Some(103.9441));
        assert_eq!(rows[0].period.as_deref(), Some("2017-01"));

        assert_eq!(rows[1].latitude, None);
        assert_eq!(rows[2].longitude, None);
        assert_eq!(rows[2].period, None);
    }

    #[test]
    fn missing_coordinate_column_is_fatal() {
        let err = InputTable::from_reader("town,Latitude\nX,1.0\n".as_bytes(), "input")
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::MissingColumn { ref column, .. } if column == LONGITUDE_COLUMN
        ));
    }

    #[test]
    fn row_wider_than_header_is_fatal() {
        let input = "Latitude,Longitude\n1.3,103.8\n1.3,103.8,EXTRA_DATA\n";
        let err = InputTable::from_reader(input.as_bytes(), "input").unwrap_err();
        assert!(matches!(
            err,
            EnrichError::RowTooLong {
                row: 2,
                cells: 3,
                columns: 2,
                ..
            }
        ));
    }

    #[test]
    fn short_rows_are_padded() {
        let table = InputTable::from_reader("a,Latitude,Longitude\nx\n".as_bytes(), "input").unwrap();
        let mut out = Vec::new();
        table
            .write_to(&mut out, &[FeatureRecord::Degraded], "output")
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().nth(1), Some("x,,,,,,,,,,"));
    }

    #[test]
    fn period_column_is_optional() {
        let table =
            InputTable::from_reader("Latitude,Longitude\n1.3,103.8\n".as_bytes(), "input").unwrap();
        assert_eq!(table.rows()[0].period, None);
    }

    #[test]
    fn writes_merged_columns_in_order() {
        let table = InputTable::from_reader(INPUT.as_bytes(), "input").unwrap();
        let features = [
            FeatureRecord::Enriched(sample_features()),
            FeatureRecord::Degraded,
            FeatureRecord::Enriched(AmenityFeatures::default()),
        ];

        let mut out = Vec::new();
        table.write_to(&mut out, &features, "output").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "town,block,Latitude,Longitude,month,nearest_bus_stop_distance,nearest_mrt_distance,\
             nearest_mall_distance,nearest_school_distance,bus_stop_count,mrt_count,mall_count,school_count"
        );
        assert_eq!(
            lines[1],
            "TAMPINES,101,1.3456,103.9441,2017-01,50.5,,410,,3,0,1,0"
        );
        assert_eq!(lines[2], "TAMPINES,102,,103.9450,2017-02,,,,,,,,");
        assert_eq!(lines[3], "TAMPINES,103,1.3470,abc,,,,,,0,0,0,0");
    }

    #[test]
    fn overwrites_existing_feature_columns() {
        let input = "Latitude,Longitude,bus_stop_count\n1.3,103.8,99\n";
        let table = InputTable::from_reader(input.as_bytes(), "input").unwrap();

        let mut out = Vec::new();
        table
            .write_to(&mut out, &[FeatureRecord::Enriched(sample_features())], "output")
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert_eq!(header.matches("bus_stop_count").count(), 1);
        assert!(header.starts_with("Latitude,Longitude,bus_stop_count,nearest_bus_stop_distance"));
        assert!(lines.next().unwrap().starts_with("1.3,103.8,3,50.5"));
    }

    #[test]
    fn rejects_mismatched_feature_count() {
        let table = InputTable::from_reader(INPUT.as_bytes(), "input").unwrap();
        let err = table
            .write_to(Vec::new(), &[FeatureRecord::Degraded], "output")
            .unwrap_err();
        assert!(matches!(
            err,
            EnrichError::RowCountMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn degraded_cells_are_all_empty() {
        assert!(feature_cells(&FeatureRecord::Degraded).iter().all(String::is_empty));
    }
}

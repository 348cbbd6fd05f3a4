#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Amenity enrichment for resale flat transaction tables.
//!
//! For every row with a coordinate, queries the Overpass API for bus stops,
//! MRT/LRT stations, malls, and schools within a radius (optionally as of
//! the row's transaction month) and appends the nearest distance and count
//! of each category to the table.
//!
//! The pipeline, leaves first:
//!
//! 1. [`distance`]: WGS84 geodesic distance.
//! 2. [`query`]: Overpass QL rendering, with optional `[date:...]` scoping.
//! 3. [`client`]: throttled, retrying, cached fetches through an
//!    [`transport::OverpassTransport`]. A single lock serializes every
//!    network call made through one client.
//! 4. [`classify`]: element categorization and per-category buckets.
//! 5. [`row`]: one row in, one [`FeatureRecord`] out.
//! 6. [`batch`]: bounded worker pool over a whole table, order preserving.
//!
//! Rows that cannot be enriched (no coordinate, upstream unavailable, or a
//! worker panic) come out as [`FeatureRecord::Degraded`] with every feature
//! column empty. Only failing to read the input or write the output stops a
//! run.

pub mod batch;
pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod details;
pub mod distance;
pub mod progress;
pub mod query;
pub mod retry;
pub mod row;
pub mod table;
pub mod transport;

pub use resale_map_enrich_models::FeatureRecord;

use thiserror::Error;

/// Row-local input problems. These never stop a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The `month` value is not `YYYY-MM`.
    #[error("Invalid date format {period:?}: expected YYYY-MM")]
    InvalidPeriod {
        /// The rejected value.
        period: String,
    },
}

/// Errors that stop an enrichment run.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// CSV read or write failure.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Table path (or label).
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// File system failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization or parsing failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input table lacks a required column.
    #[error("Missing required column {column:?} in {path}")]
    MissingColumn {
        /// Column name.
        column: String,
        /// Table path (or label).
        path: String,
    },

    /// A data row has more cells than the header names.
    #[error("Row {row} in {path} has {cells} cells but the header has {columns} columns")]
    RowTooLong {
        /// Table path (or label).
        path: String,
        /// 1-based data row number.
        row: usize,
        /// Cells in the row.
        cells: usize,
        /// Columns in the header.
        columns: usize,
    },

    /// Feature records do not line up with the table rows.
    #[error("Expected {expected} feature records, got {actual}")]
    RowCountMismatch {
        /// Rows in the table.
        expected: usize,
        /// Records supplied.
        actual: usize,
    },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

//! Per-row enrichment.

use std::sync::Arc;

use resale_map_enrich_models::{Coordinate, FeatureRecord, InputRow, QueryKey};

use crate::classify::{CategoryBuckets, classify};
use crate::client::{FetchClient, FetchOutcome};
use crate::query::{DEFAULT_RADIUS_METERS, SnapshotDate, build_query};

/// Turns one [`InputRow`] into a [`FeatureRecord`] using a shared
/// [`FetchClient`].
#[derive(Debug)]
pub struct RowProcessor {
    client: Arc<FetchClient>,
    radius_meters: u32,
}

impl RowProcessor {
    /// Creates a processor with the default search radius.
    #[must_use]
    pub const fn new(client: Arc<FetchClient>) -> Self {
        Self {
            client,
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }

    /// Sets the search radius.
    #[must_use]
    pub const fn with_radius(mut self, radius_meters: u32) -> Self {
        self.radius_meters = radius_meters;
        self
    }

    /// The client used for lookups.
    #[must_use]
    pub const fn client(&self) -> &Arc<FetchClient> {
        &self.client
    }

    /// Enriches a single row.
    ///
    /// Returns [`FeatureRecord::Degraded`] when the row has no usable
    /// coordinate or the upstream is unavailable.
    pub async fn process(&self, row: &InputRow) -> FeatureRecord {
        self.process_detailed(row)
            .await
            .map_or(FeatureRecord::Degraded, |buckets| {
                FeatureRecord::Enriched(buckets.features())
            })
    }

    /// Like [`Self::process`] but returns the full category buckets
    /// (names, addresses, every distance) instead of the reduced record.
    ///
    /// Returns `None` wherever [`Self::process`] would degrade.
    pub async fn process_detailed(&self, row: &InputRow) -> Option<CategoryBuckets> {
        let (Some(latitude), Some(longitude)) = (row.latitude, row.longitude) else {
            log::debug!("Row has no coordinates, skipping lookup");
            return None;
        };

        let origin = match Coordinate::new(latitude, longitude) {
            Ok(origin) => origin,
            Err(e) => {
                log::warn!("Skipping row: {e}");
                return None;
            }
        };

        let snapshot = row
            .period
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .and_then(|period| match SnapshotDate::parse(period) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    log::warn!(
                        "{e} for row with Latitude {latitude} and Longitude {longitude}; querying live data"
                    );
                    None
                }
            });

        let key = QueryKey::new(origin, snapshot.as_ref().map(SnapshotDate::to_instant));
        let query = build_query(origin, self.radius_meters, snapshot.as_ref());

        match self.client.fetch(&key, &query).await {
            FetchOutcome::Available(result) => Some(classify(&result, origin)),
            FetchOutcome::Unavailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::client::test_support::{CountingTransport, ScriptedTransport};
    use resale_map_enrich_models::{AmenityCategory, ElementKind, OsmElement, RawQueryResult};

    fn stops() -> RawQueryResult {
        RawQueryResult {
            elements: vec![OsmElement {
                kind: ElementKind::Node,
                id: Some(7),
                lat: Some(1.3505),
                lon: Some(103.8),
                geometry: None,
                tags: [("highway".to_string(), "bus_stop".to_string())]
                    .into_iter()
                    .collect(),
            }],
        }
    }

    fn processor(transport: Arc<dyn crate::transport::OverpassTransport>) -> RowProcessor {
        let client = FetchClient::new(transport, Arc::new(ResponseCache::new()));
        RowProcessor::new(Arc::new(client))
    }

    fn row(lat: Option<f64>, lon: Option<f64>, period: Option<&str>) -> InputRow {
        InputRow {
            latitude: lat,
            longitude: lon,
            period: period.map(str::to_string),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_coordinates_degrade_without_network() {
        let transport = Arc::new(CountingTransport::new(stops()));
        let processor = processor(transport.clone());

        assert!(processor.process(&row(None, Some(103.8), None)).await.is_degraded());
        assert!(processor.process(&row(Some(1.35), None, None)).await.is_degraded());
        assert!(
            processor
                .process(&row(Some(123.0), Some(103.8), None))
                .await
                .is_degraded()
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn enriches_row() {
        let transport = Arc::new(CountingTransport::new(stops()));
        let processor = processor(transport.clone());

        let record = processor.process(&row(Some(1.35), Some(103.8), None)).await;
        let features = record.features().unwrap();
        let bus = features.get(AmenityCategory::BusStop);
        assert_eq!(bus.count, 1);
        assert!(bus.nearest_distance.unwrap() > 0.0);
        assert_eq!(features.get(AmenityCategory::School).count, 0);
        assert_eq!(features.get(AmenityCategory::School).nearest_distance, None);
    }

    #[tokio::test(start_paused = true)]
    async fn period_scopes_query() {
        let transport = Arc::new(CountingTransport::new(stops()));
        let processor = processor(transport.clone());

        processor
            .process(&row(Some(1.35), Some(103.8), Some("2018-06")))
            .await;

        let queries = transport.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("[date:\"2018-06-01T00:00:00Z\"]"));
    }

    #[tokio::test(start_paused = true)]
    async fn bad_period_falls_back_to_live_query() {
        let transport = Arc::new(CountingTransport::new(stops()));
        let processor = processor(transport.clone());

        let record = processor
            .process(&row(Some(1.35), Some(103.8), Some("June 2018")))
            .await;
        assert!(!record.is_degraded());

        // Same key as a row with no period at all.
        processor.process(&row(Some(1.35), Some(103.8), None)).await;
        assert_eq!(transport.calls(), 1);

        let queries = transport.queries.lock().unwrap().clone();
        assert!(!queries[0].contains("date:"));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_upstream_degrades() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err("504".to_string())]));
        let processor = processor(transport.clone());

        let record = processor.process(&row(Some(1.35), Some(103.8), None)).await;
        assert!(record.is_degraded());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_radius_is_used() {
        let transport = Arc::new(CountingTransport::new(stops()));
        let processor = processor(transport.clone()).with_radius(1200);

        processor.process(&row(Some(1.35), Some(103.8), None)).await;
        let queries = transport.queries.lock().unwrap().clone();
        assert!(queries[0].contains("around:1200,"));
    }
}

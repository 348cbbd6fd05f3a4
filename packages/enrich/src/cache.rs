//! In-memory Overpass response cache for a single batch run.
//!
//! Stores both successful responses and negative results (lookups that
//! exhausted every retry) so the same key is never fetched twice within
//! a run. The cache is not persisted; it can be seeded from a JSON
//! snapshot before a run starts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use resale_map_enrich_models::{QueryKey, RawQueryResult};
use serde::Deserialize;

use crate::EnrichError;

/// A cached lookup outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResponse {
    /// The upstream answered; the response is immutable from here on.
    Available(Arc<RawQueryResult>),
    /// Every attempt failed for this key during this run.
    Unavailable,
}

/// Thread-safe response cache keyed by exact [`QueryKey`].
///
/// Writes are first-writer-wins: once a key is present, later inserts for
/// the same key are ignored and the original value is kept.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<BTreeMap<QueryKey, CachedResponse>>,
}

/// One entry of a cache seed file.
#[derive(Debug, Deserialize)]
struct SeedEntry {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    date: Option<String>,
    response: RawQueryResult,
}

impl ResponseCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached outcome for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<CachedResponse> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Inserts `value` unless `key` is already cached, and returns whatever
    /// value is cached for `key` afterwards.
    pub fn insert(&self, key: QueryKey, value: CachedResponse) -> CachedResponse {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(key)
            .or_insert(value)
            .clone()
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads responses from a JSON seed file into the cache.
    ///
    /// The file is a JSON array of
    /// `{"latitude", "longitude", "date"?, "response"}` objects, where
    /// `response` is an Overpass JSON body. Returns the number of entries
    /// that were newly inserted.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the file cannot be read or parsed.
    pub fn seed_from_file(&self, path: &Path) -> Result<usize, EnrichError> {
        let text = std::fs::read_to_string(path).map_err(|e| EnrichError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let inserted = self.seed_from_str(&text)?;
        log::info!("Seeded {inserted} cached responses from {}", path.display());
        Ok(inserted)
    }

    /// Same as [`Self::seed_from_file`] for an in-memory JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Json`] if the document is malformed.
    pub fn seed_from_str(&self, json: &str) -> Result<usize, EnrichError> {
        let entries: Vec<SeedEntry> = serde_json::from_str(json)?;
        let mut map = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut inserted = 0;
        for entry in entries {
            let key = QueryKey::from_parts(entry.latitude, entry.longitude, entry.date);
            if let std::collections::btree_map::Entry::Vacant(slot) = map.entry(key) {
                slot.insert(CachedResponse::Available(Arc::new(entry.response)));
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resale_map_enrich_models::Coordinate;

    fn key(lat: f64) -> QueryKey {
        QueryKey::new(Coordinate::new(lat, 103.8).unwrap(), None)
    }

    #[test]
    fn first_writer_wins() {
        let cache = ResponseCache::new();
        let first = CachedResponse::Available(Arc::new(RawQueryResult::default()));

        assert_eq!(cache.insert(key(1.3), first.clone()), first);
        assert_eq!(cache.insert(key(1.3), CachedResponse::Unavailable), first);
        assert_eq!(cache.get(&key(1.3)), Some(first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn misses_on_tiny_differences() {
        let cache = ResponseCache::new();
        cache.insert(key(1.3), CachedResponse::Unavailable);
        assert!(cache.get(&key(1.3 + 1e-9)).is_none());
    }

    #[test]
    fn seeds_from_json() {
        let cache = ResponseCache::new();
        let seed = r#"[
            {"latitude": 1.3, "longitude": 103.8, "response": {"elements": []}},
            {"latitude": 1.3, "longitude": 103.8, "date": "2020-01-01T00:00:00Z",
             "response": {"elements": [{"type": "node", "lat": 1.3, "lon": 103.8, "tags": {}}]}},
            {"latitude": 1.3, "longitude": 103.8, "response": {"elements": []}}
        ]"#;

        assert_eq!(cache.seed_from_str(seed).unwrap(), 2);
        assert!(matches!(
            cache.get(&key(1.3)),
            Some(CachedResponse::Available(_))
        ));

        let dated = QueryKey::new(
            Coordinate::new(1.3, 103.8).unwrap(),
            Some("2020-01-01T00:00:00Z".to_string()),
        );
        let Some(CachedResponse::Available(result)) = cache.get(&dated) else {
            panic!("dated entry missing");
        };
        assert_eq!(result.elements.len(), 1);
    }

    #[test]
    fn rejects_malformed_seed() {
        let cache = ResponseCache::new();
        assert!(cache.seed_from_str("{not json").is_err());
        assert!(cache.is_empty());
    }
}

//! Rate-limited, cached, retrying Overpass fetch client.
//!
//! All network calls made through one [`FetchClient`] are serialized by a
//! single throttle lock. The lock is held for the request itself and for
//! the fixed request delay that follows a successful response, so the
//! start of one call and the start of the next are always at least
//! `request_delay` apart no matter how many workers share the client.
//! Cache hits never touch the lock.
//!
//! Failed attempts release the lock before backing off, so one failing
//! key does not stall other workers during its backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use resale_map_enrich_models::{QueryKey, RawQueryResult};
use tokio::sync::Mutex;

use crate::cache::{CachedResponse, ResponseCache};
use crate::retry::RetryPolicy;
use crate::transport::{DEFAULT_TIMEOUT, OverpassTransport, TransportError};

/// Default gap enforced after each successful request.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

/// Result of [`FetchClient::fetch`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The upstream answered (now or earlier in the run).
    Available(Arc<RawQueryResult>),
    /// Every attempt failed; the row should degrade.
    Unavailable,
}

impl From<CachedResponse> for FetchOutcome {
    fn from(value: CachedResponse) -> Self {
        match value {
            CachedResponse::Available(result) => Self::Available(result),
            CachedResponse::Unavailable => Self::Unavailable,
        }
    }
}

/// Counters describing what a client did during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Lookups answered from the cache.
    pub cache_hits: u64,
    /// Requests handed to the transport.
    pub network_calls: u64,
    /// Requests that failed (each is followed by a backoff).
    pub failed_attempts: u64,
    /// Keys that exhausted every attempt.
    pub unavailable: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    cache_hits: AtomicU64,
    network_calls: AtomicU64,
    failed_attempts: AtomicU64,
    unavailable: AtomicU64,
}

/// Throttled Overpass client shared by every worker in a batch.
pub struct FetchClient {
    transport: Arc<dyn OverpassTransport>,
    cache: Arc<ResponseCache>,
    throttle: Mutex<()>,
    request_delay: Duration,
    request_timeout: Duration,
    retry: RetryPolicy,
    stats: AtomicStats,
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("cached_keys", &self.cache.len())
            .field("request_delay", &self.request_delay)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FetchClient {
    /// Creates a client with the default delay, timeout, and retry policy.
    #[must_use]
    pub fn new(transport: Arc<dyn OverpassTransport>, cache: Arc<ResponseCache>) -> Self {
        Self {
            transport,
            cache,
            throttle: Mutex::new(()),
            request_delay: DEFAULT_REQUEST_DELAY,
            request_timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            stats: AtomicStats::default(),
        }
    }

    /// Sets the gap held after each successful request.
    #[must_use]
    pub const fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Sets the upper bound on a single request.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The cache this client reads and fills.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Snapshot of the client's counters.
    #[must_use]
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            network_calls: self.stats.network_calls.load(Ordering::Relaxed),
            failed_attempts: self.stats.failed_attempts.load(Ordering::Relaxed),
            unavailable: self.stats.unavailable.load(Ordering::Relaxed),
        }
    }

    /// Returns the response for `key`, fetching `query` if it is not cached.
    ///
    /// Never fails: after the retry policy is exhausted the key is cached
    /// as unavailable and [`FetchOutcome::Unavailable`] is returned.
    pub async fn fetch(&self, key: &QueryKey, query: &str) -> FetchOutcome {
        if let Some(hit) = self.cached(key) {
            return hit;
        }

        let attempts = self.retry.attempts();

        for attempt in 1..=attempts {
            let error = {
                let _guard = self.throttle.lock().await;

                // Another worker may have filled this key while we waited.
                if let Some(hit) = self.cached(key) {
                    return hit;
                }

                self.stats.network_calls.fetch_add(1, Ordering::Relaxed);
                match self.execute(query).await {
                    Ok(response) => {
                        let cached = self
                            .cache
                            .insert(key.clone(), CachedResponse::Available(Arc::new(response)));
                        tokio::time::sleep(self.request_delay).await;
                        return cached.into();
                    }
                    Err(e) => e,
                }
            };

            self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
            let delay = self.retry.backoff(attempt);
            log::warn!(
                "Attempt {attempt}/{attempts} failed for location ({}, {}) with date {:?}: {error} (backing off {delay:?})",
                key.latitude,
                key.longitude,
                key.date,
            );
            tokio::time::sleep(delay).await;
        }

        log::error!(
            "All {attempts} attempts failed for location ({}, {}) with date {:?}",
            key.latitude,
            key.longitude,
            key.date,
        );
        self.stats.unavailable.fetch_add(1, Ordering::Relaxed);
        self.cache
            .insert(key.clone(), CachedResponse::Unavailable)
            .into()
    }

    fn cached(&self, key: &QueryKey) -> Option<FetchOutcome> {
        let hit = self.cache.get(key)?;
        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "Cache hit for ({}, {}) date {:?}",
            key.latitude,
            key.longitude,
            key.date
        );
        Some(hit.into())
    }

    async fn execute(&self, query: &str) -> Result<RawQueryResult, TransportError> {
        tokio::time::timeout(self.request_timeout, self.transport.execute(query))
            .await
            .map_err(|_| TransportError::Timeout {
                after: self.request_timeout,
            })?
    }
}

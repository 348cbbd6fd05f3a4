//! Overpass transport: one query in, one parsed response out.
//!
//! The fetch client only sees the [`OverpassTransport`] trait, so the
//! throttling, retry, and cache logic can run against stub transports in
//! tests. [`HttpTransport`] is the real implementation over `reqwest`.
//!
//! See <https://wiki.openstreetmap.org/wiki/Overpass_API>

use std::time::Duration;

use async_trait::async_trait;
use resale_map_enrich_models::RawQueryResult;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 300;

/// A failed request. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failure, timeout, or body read failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status.
        status: reqwest::StatusCode,
        /// Start of the response body.
        body: String,
    },

    /// The body was not a valid Overpass JSON document.
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request did not finish within the client's timeout.
    #[error("request timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Anything else a transport wants to report.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

/// Issues a single Overpass query.
#[async_trait]
pub trait OverpassTransport: Send + Sync {
    /// Executes `query` and returns the parsed response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on any transport-level failure.
    async fn execute(&self, query: &str) -> Result<RawQueryResult, TransportError>;
}

/// `reqwest`-backed transport against an Overpass interpreter endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for `base_url` (e.g.
    /// `"https://overpass-api.de/api/interpreter"`).
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// The endpoint this transport queries.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl OverpassTransport for HttpTransport {
    async fn execute(&self, query: &str) -> Result<RawQueryResult, TransportError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("data", query)])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status,
                body: preview(&text),
            });
        }

        parse_response(&text)
    }
}

/// Parses an Overpass JSON body.
///
/// # Errors
///
/// Returns [`TransportError::Decode`] if the body is not valid JSON of the
/// expected shape.
pub fn parse_response(body: &str) -> Result<RawQueryResult, TransportError> {
    Ok(serde_json::from_str(body)?)
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(BODY_PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

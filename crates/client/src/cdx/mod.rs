//! Capture index (CDX) client.
//!
//! ### Query
//! - `GET {endpoint}?q=type:urlquery+url:{percent-encoded key}`
//! - Key is the URL, or `{renderType}:{url}` for rendered captures.
//!
//! ### Lookup
//! - `GET {endpoint}?url=..&matchType=..&sort=..&limit=..`, answered in CDX11.
//! - Failures here are errors, not empty results.
//!
//! ### Failure policy
//! - Transport errors, non-200 responses and unreadable documents are logged
//!   and produce an empty capture set.
//! - Unreadable records inside a readable document are skipped one by one.

pub mod lookup;
pub mod response;

use std::time::Duration;

use reqwest::{Client, header};

use memento_core::{CaptureQueryKey, Captures, Error};

pub use lookup::{CdxLine, LookupQuery, LookupSort, MatchType, parse_cdx_lines};
pub use response::{IndexFormat, IndexParseError, IndexResult, JsonResult, XmlResult, parse_index_response};

/// Source of captures for a query key.
#[async_trait::async_trait]
pub trait CaptureIndex: Send + Sync {
    /// All known captures of `key`, ascending by timestamp. Never fails.
    async fn list(&self, key: &CaptureQueryKey) -> Captures;

    /// Pass-through lookup with match type, sort and limit.
    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CdxLine>, Error> {
        Err(Error::UpstreamUnavailable(format!("index cannot look up {}", query.url)))
    }
}

/// Configuration for the index client.
#[derive(Debug, Clone)]
pub struct CdxConfig {
    /// Query endpoint, e.g. `http://cdx.api.wa.bl.uk/data-heritrix`
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
enum IndexError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status {0}")]
    Status(u16),

    #[error(transparent)]
    Parse(#[from] IndexParseError),
}

/// HTTP client for the capture index.
#[derive(Debug, Clone)]
pub struct CdxClient {
    http: Client,
    config: CdxConfig,
}

impl CdxClient {
    pub fn new(config: CdxConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to build index client: {e}")))?;

        Ok(Self { http, config })
    }

    /// The query URL for `key`.
    ///
    /// Slashes stay literal, as the index expects.
    pub fn query_url(&self, key: &CaptureQueryKey) -> String {
        let encoded = urlencoding::encode(&key.to_string()).replace("%2F", "/");
        format!("{}?q=type:urlquery+url:{encoded}", self.config.endpoint)
    }

    /// Captures of a render type (e.g. `screenshot`) of `url`.
    pub async fn list_rendered(&self, url: &str, render_type: &str) -> Captures {
        self.list(&CaptureQueryKey::rendered(render_type, url)).await
    }

    async fn query(&self, key: &CaptureQueryKey) -> Result<Captures, IndexError> {
        let url = self.query_url(key);
        tracing::debug!(%url, "querying capture index");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(IndexError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        let results = parse_index_response(content_type.as_deref(), &body)?;
        Ok(normalize(results))
    }
}

#[async_trait::async_trait]
impl CaptureIndex for CdxClient {
    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CdxLine>, Error> {
        tracing::debug!(url = %query.url, match_type = %query.match_type, "looking up in capture index");
        let response = self
            .http
            .get(&self.config.endpoint)
            .query(&query.params())
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("capture index unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!("capture index returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("capture index read failed: {e}")))?;
        Ok(parse_cdx_lines(&body))
    }

    async fn list(&self, key: &CaptureQueryKey) -> Captures {
        match self.query(key).await {
            Ok(captures) => {
                tracing::debug!(key = %key, count = captures.len(), "capture index answered");
                captures
            }
            Err(IndexError::Transport(e)) => {
                tracing::error!(key = %key, error = %e, "capture index unreachable");
                Captures::new()
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "capture index returned no usable response");
                Captures::new()
            }
        }
    }
}

/// Turn parsed records into captures, skipping any that do not normalize.
pub fn normalize(results: Vec<IndexResult>) -> Captures {
    results
        .into_iter()
        .filter_map(|result| match result.into_capture() {
            Ok(capture) => Some(capture),
            Err(e) => {
                tracing::warn!(error = %e, "skipping index record");
                None
            }
        })
        .collect()
}

//! Access checks against the public playback service.
//!
//! A URL is open when playback answers with a status in `[200, 400)`.
//! Redirects are not followed: a redirect to a capture still counts as open.

use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;

use memento_core::Error;

/// Decides whether a URL may be served.
#[async_trait::async_trait]
pub trait AccessOracle: Send + Sync {
    async fn check(&self, url: &str) -> Result<(), Error>;
}

/// Asks the playback service.
#[derive(Debug, Clone)]
pub struct WaybackAccessClient {
    http: Client,
    prefix: String,
}

impl WaybackAccessClient {
    pub fn new(prefix: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::none())
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to build access client: {e}")))?;

        Ok(Self { http, prefix: prefix.into() })
    }

    pub fn check_url(&self, url: &str) -> String {
        format!("{}{url}", self.prefix)
    }
}

#[async_trait::async_trait]
impl AccessOracle for WaybackAccessClient {
    async fn check(&self, url: &str) -> Result<(), Error> {
        let response = self
            .http
            .get(self.check_url(url))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("access check failed: {e}")))?;

        let status = response.status().as_u16();
        if (200..400).contains(&status) {
            tracing::debug!(%url, status, "access granted");
            Ok(())
        } else {
            tracing::info!(%url, status, "access denied");
            Err(Error::AccessDenied { url: url.to_string(), status })
        }
    }
}

/// Grants everything. For local archives without a playback service.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

#[async_trait::async_trait]
impl AccessOracle for OpenAccess {
    async fn check(&self, _url: &str) -> Result<(), Error> {
        Ok(())
    }
}

//! Archive-side rendering of captured pages.
//!
//! The render service replays a capture in a browser and answers with a PNG
//! screenshot. Renders are slow, so the call carries its own upper bound.

pub mod postprocess;

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use memento_core::{Error, Timestamp};

use crate::warc::Payload;

pub use postprocess::{CROP_HEIGHT, JPEG_CONTENT_TYPE, JPEG_QUALITY, NormalizedImage, THUMBNAIL_WIDTH, normalize};

/// Content type of a fresh render.
pub const RENDER_CONTENT_TYPE: &str = "image/png";

/// Errors that can occur during rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to reach the render service.
    #[error("render request failed: {0}")]
    Request(String),

    /// Render service answered with something other than 200.
    #[error("render service returned status {0}")]
    Status(u16),

    /// No answer within the render timeout.
    #[error("render timeout after {0}ms")]
    Timeout(u64),
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Error::UpstreamUnavailable(err.to_string())
    }
}

/// Renders an archived page.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Screenshot of `url` as archived closest to `target` (now if None).
    async fn render(&self, url: &str, target: Option<&Timestamp>) -> Result<Payload, Error>;
}

/// HTTP client for the render service.
#[derive(Debug, Clone)]
pub struct RenderClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl RenderClient {
    pub fn new(endpoint: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to build render client: {e}")))?;

        Ok(Self { http, endpoint: endpoint.into(), timeout })
    }

    /// Query parameters sent to the render service.
    pub fn params(url: &str, target: Option<&Timestamp>) -> Vec<(&'static str, String)> {
        let mut params = vec![("url", url.to_string()), ("show_screenshot", "true".to_string())];
        if let Some(ts) = target {
            params.push(("target_date", ts.to_string()));
        }
        params
    }

    async fn request(&self, url: &str, target: Option<&Timestamp>) -> Result<Payload, RenderError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&Self::params(url, target))
            .send()
            .await
            .map_err(|e| RenderError::Request(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RenderError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| RenderError::Request(e.to_string()))?;
        Ok(Payload::new(bytes, RENDER_CONTENT_TYPE))
    }
}

#[async_trait::async_trait]
impl Renderer for RenderClient {
    async fn render(&self, url: &str, target: Option<&Timestamp>) -> Result<Payload, Error> {
        tracing::info!(%url, target = ?target.map(ToString::to_string), "requesting render");
        let start = std::time::Instant::now();

        let timeout_ms = self.timeout.as_millis() as u64;
        let payload = tokio::time::timeout(self.timeout, self.request(url, target))
            .await
            .map_err(|_| RenderError::Timeout(timeout_ms))??;

        tracing::info!(
            %url,
            bytes = payload.bytes.len(),
            render_time_ms = start.elapsed().as_millis() as u64,
            "render complete"
        );
        Ok(payload)
    }
}

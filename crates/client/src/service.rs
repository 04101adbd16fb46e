//! The retrieval pipeline.
//!
//! ### Content path (no render type)
//! access check → capture index → closest capture → cache (`capture:{ts}:{url}`)
//! → record fetch → cache without expiry.
//!
//! ### Rendered path
//! access check → cache (PWID URN or composite key) → either the crawl-time
//! rendering from the index (`Source::Original`) or a fresh render of the
//! archived page (`Source::Archive`) → optional JPEG normalisation → cache
//! with the render TTL.
//!
//! Cache failures are logged and never fail a retrieval.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use memento_core::cache::composite_key;
use memento_core::timestamp::parse_target;
use memento_core::{AppConfig, CacheDb, CacheEntry, CaptureQueryKey, Captures, Error, Pwid, PwidLayout, Timestamp};

use crate::access::{AccessOracle, WaybackAccessClient};
use crate::canonical::{canonicalize, downgrade_https};
use crate::cdx::{CaptureIndex, CdxClient, CdxConfig, CdxLine, LookupQuery};
use crate::matcher::{Match, closest_to};
use crate::render::{JPEG_CONTENT_TYPE, RenderClient, Renderer, normalize};
use crate::warc::{FetchMode, Framing, Payload, RecordFetcher, StorageClient, StorageConfig, export_filename};

/// Render type used when none is given for a PWID.
pub const DEFAULT_RENDER_TYPE: &str = "screenshot";

/// Where a rendered form comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Rendered at crawl time and stored with the capture.
    #[default]
    Original,
    /// Rendered now from the archived page.
    Archive,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Original => "original",
            Source::Archive => "archive",
        }
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(Source::Original),
            "archive" => Ok(Source::Archive),
            other => Err(Error::InvalidInput(format!("unknown source {other:?}: expected original or archive"))),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which form of a rendered image to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImageForm {
    /// The bytes as stored or rendered.
    #[default]
    AsCaptured,
    /// Full-size JPEG.
    Full,
    /// 300-pixel-wide JPEG.
    Thumbnail,
}

impl ImageForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageForm::AsCaptured => "as_captured",
            ImageForm::Full => "full",
            ImageForm::Thumbnail => "thumbnail",
        }
    }
}

impl FromStr for ImageForm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "as_captured" | "raw" => Ok(ImageForm::AsCaptured),
            "full" => Ok(ImageForm::Full),
            "thumbnail" | "thumb" => Ok(ImageForm::Thumbnail),
            other => Err(Error::InvalidInput(format!(
                "unknown image form {other:?}: expected as_captured, full or thumbnail"
            ))),
        }
    }
}

impl fmt::Display for ImageForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rendered form is produced and shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub render_type: String,
    pub source: Source,
    pub form: ImageForm,
    /// Keep only the top rows. Applies to normalised forms.
    pub crop: bool,
}

impl RenderOptions {
    pub fn new(render_type: impl Into<String>) -> Self {
        Self { render_type: render_type.into(), source: Source::default(), form: ImageForm::default(), crop: false }
    }

    /// Defaults for PWID retrieval: an archive-side screenshot as rendered.
    pub fn pwid_default() -> Self {
        Self { source: Source::Archive, ..Self::new(DEFAULT_RENDER_TYPE) }
    }

    fn form_tag(&self, form: ImageForm) -> String {
        if self.crop && form != ImageForm::AsCaptured {
            format!("{form}+crop")
        } else {
            form.to_string()
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::pwid_default()
    }
}

/// A retrieval by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub url: String,
    /// 14-digit or ISO-8601 target; None means now.
    pub timestamp: Option<String>,
    /// Rendered form to retrieve; None retrieves the captured content.
    pub render: Option<RenderOptions>,
}

impl RetrievalRequest {
    pub fn content(url: impl Into<String>) -> Self {
        Self { url: url.into(), timestamp: None, render: None }
    }

    pub fn rendered(url: impl Into<String>, options: RenderOptions) -> Self {
        Self { url: url.into(), timestamp: None, render: Some(options) }
    }

    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// A served retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub payload: Payload,
    pub cache_key: String,
    pub cache_hit: bool,
    /// The capture served, when one was selected from the index.
    pub timestamp: Option<Timestamp>,
}

/// A raw record ready to download.
#[derive(Debug, Clone)]
pub struct RecordExport {
    pub payload: Payload,
    pub filename: String,
    pub timestamp: Timestamp,
}

/// Settings the pipeline needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// The only archive whose PWIDs are served.
    pub archive_id: String,
    pub pwid_layout: PwidLayout,
    pub render_ttl: Duration,
    /// Playback prefix; `{timestamp}/{url}` is appended.
    pub playback_prefix: String,
}

impl From<&AppConfig> for ServiceConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            archive_id: config.archive_id.clone(),
            pwid_layout: config.pwid_layout(),
            render_ttl: config.render_ttl(),
            playback_prefix: config.wayback_server.clone(),
        }
    }
}

/// How rendered forms are keyed in the cache.
enum KeyBase {
    /// Rebuilt PWID URN; non-default options are appended after `#`.
    Pwid(String),
    /// Hash of the request parts.
    Composite { target: String, url: String },
}

impl KeyBase {
    fn key(&self, options: &RenderOptions, form: ImageForm) -> String {
        match self {
            KeyBase::Pwid(urn) => {
                let defaults = RenderOptions::pwid_default();
                if options.render_type == defaults.render_type
                    && options.source == defaults.source
                    && form == ImageForm::AsCaptured
                {
                    urn.clone()
                } else {
                    format!("{urn}#{}:{}:{}", options.render_type, options.source, options.form_tag(form))
                }
            }
            KeyBase::Composite { target, url } => {
                composite_key(target, options.source.as_str(), &options.render_type, url, &options.form_tag(form))
            }
        }
    }
}

/// The retrieval engine.
#[derive(Clone)]
pub struct ArchiveService {
    index: Arc<dyn CaptureIndex>,
    fetcher: RecordFetcher,
    access: Arc<dyn AccessOracle>,
    renderer: Arc<dyn Renderer>,
    cache: CacheDb,
    config: ServiceConfig,
}

impl ArchiveService {
    pub fn new(
        index: Arc<dyn CaptureIndex>, fetcher: RecordFetcher, access: Arc<dyn AccessOracle>,
        renderer: Arc<dyn Renderer>, cache: CacheDb, config: ServiceConfig,
    ) -> Self {
        Self { index, fetcher, access, renderer, cache, config }
    }

    /// Wire up the HTTP collaborators described by `config`.
    pub fn from_config(config: &AppConfig, cache: CacheDb) -> Result<Self, Error> {
        let index = CdxClient::new(CdxConfig {
            endpoint: config.cdx_server.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
        })?;
        let storage = StorageClient::new(StorageConfig {
            prefix: config.webhdfs_prefix.clone(),
            user: config.webhdfs_user.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
        })?;
        let access = WaybackAccessClient::new(config.wayback_server.clone(), &config.user_agent, config.timeout())?;
        let renderer = RenderClient::new(config.webrender_server.clone(), &config.user_agent, config.render_timeout())?;

        Ok(Self::new(
            Arc::new(index),
            RecordFetcher::new(Arc::new(storage), config.max_record_bytes),
            Arc::new(access),
            Arc::new(renderer),
            cache,
            ServiceConfig::from(config),
        ))
    }

    pub fn cache(&self) -> &CacheDb {
        &self.cache
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Captures of `url`, or of one of its rendered forms.
    pub async fn list_captures(&self, url: &str, render_type: Option<&str>) -> Result<Captures, Error> {
        let url = canonicalize(url)?.to_string();
        self.access.check(&url).await?;

        let key = match render_type {
            Some(t) => CaptureQueryKey::rendered(t, &url),
            None => CaptureQueryKey::url(&url),
        };
        Ok(self.index.list(&key).await)
    }

    /// Raw index lines for `query`, after canonicalizing its URL.
    pub async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CdxLine>, Error> {
        let url = canonicalize(&query.url)?.to_string();
        self.access.check(&url).await?;

        let query = LookupQuery { url, ..query.clone() };
        let lines = self.index.lookup(&query).await?;
        tracing::info!(url = %query.url, match_type = %query.match_type, count = lines.len(), "index lookup");
        Ok(lines)
    }

    /// Playback URL of `url` near `timestamp`. Makes no requests.
    pub fn resolve(&self, timestamp: &str, url: &str) -> Result<String, Error> {
        let target = parse_target(timestamp)?;
        let url = canonicalize(url)?;
        Ok(format!("{}{}/{url}", self.config.playback_prefix, Timestamp::from_naive(target)))
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Retrieval, Error> {
        let url = canonicalize(&request.url)?.to_string();
        let target = request.timestamp.as_deref().map(parse_target).transpose()?;
        self.access.check(&url).await?;

        match &request.render {
            None => self.retrieve_content(&url, target).await,
            Some(options) => {
                let base = KeyBase::Composite {
                    target: target.map(|t| Timestamp::from_naive(t).to_string()).unwrap_or_else(|| "latest".into()),
                    url: url.clone(),
                };
                self.retrieve_rendered(&url, target, options, base).await
            }
        }
    }

    /// Rendered form of the page a PWID names.
    pub async fn retrieve_pwid(&self, token: &str, options: &RenderOptions) -> Result<Retrieval, Error> {
        let pwid = Pwid::parse(token)?;
        if pwid.archive_id != self.config.archive_id {
            return Err(Error::InvalidInput(format!(
                "only {} PWIDs are supported, got {}",
                self.config.archive_id, pwid.archive_id
            )));
        }
        if pwid.scope != memento_core::pwid::DEFAULT_SCOPE {
            return Err(Error::InvalidInput(format!("only page scope PWIDs are supported, got {}", pwid.scope)));
        }

        let url = downgrade_https(&pwid.url);
        self.access.check(&url).await?;

        let rebuilt = Pwid { url: url.clone(), ..pwid };
        let urn = rebuilt.to_urn(self.config.pwid_layout);
        tracing::info!(pwid = %urn, "resolved PWID");

        self.retrieve_rendered(&url, Some(rebuilt.timestamp.naive()), options, KeyBase::Pwid(urn)).await
    }

    /// The whole record of the capture closest to `timestamp`.
    pub async fn export_record(&self, url: &str, timestamp: Option<&str>) -> Result<RecordExport, Error> {
        let url = canonicalize(url)?.to_string();
        let target = timestamp.map(parse_target).transpose()?;
        self.access.check(&url).await?;

        let found = self.closest(&CaptureQueryKey::url(&url), target).await?;
        let payload = self.fetcher.fetch(Some(&found.locator), FetchMode::Record).await?;
        let filename = export_filename(&found.timestamp, &url, Framing::detect(&payload.bytes));

        tracing::info!(%url, timestamp = %found.timestamp, %filename, "record exported");
        Ok(RecordExport { payload, filename, timestamp: found.timestamp })
    }

    async fn retrieve_content(&self, url: &str, target: Option<NaiveDateTime>) -> Result<Retrieval, Error> {
        let found = self.closest(&CaptureQueryKey::url(url), target).await?;
        let key = format!("capture:{}:{url}", found.timestamp);

        if let Some(payload) = self.cached(&key).await {
            return Ok(Retrieval { payload, cache_key: key, cache_hit: true, timestamp: Some(found.timestamp) });
        }

        let payload = self.fetcher.fetch(Some(&found.locator), FetchMode::Payload).await?;
        self.store(&key, &payload, None).await;

        tracing::info!(%url, timestamp = %found.timestamp, bytes = payload.bytes.len(), "capture served");
        Ok(Retrieval { payload, cache_key: key, cache_hit: false, timestamp: Some(found.timestamp) })
    }

    async fn retrieve_rendered(
        &self, url: &str, target: Option<NaiveDateTime>, options: &RenderOptions, base: KeyBase,
    ) -> Result<Retrieval, Error> {
        let key = base.key(options, options.form);
        if let Some(payload) = self.cached(&key).await {
            return Ok(Retrieval { payload, cache_key: key, cache_hit: true, timestamp: None });
        }

        let (raw, timestamp) = match options.source {
            Source::Original => {
                let found = self
                    .closest(&CaptureQueryKey::rendered(&options.render_type, url), target)
                    .await?;
                let payload = self.fetcher.fetch(Some(&found.locator), FetchMode::Payload).await?;
                (payload, Some(found.timestamp))
            }
            Source::Archive => {
                let target = target.map(Timestamp::from_naive);
                (self.renderer.render(url, target.as_ref()).await?, None)
            }
        };

        let ttl = Some(self.config.render_ttl);
        let payload = match options.form {
            ImageForm::AsCaptured => {
                self.store(&key, &raw, ttl).await;
                raw
            }
            form => {
                let normalized = normalize(&raw.bytes, options.crop)?;
                let full = Payload::new(normalized.full, JPEG_CONTENT_TYPE);
                let thumbnail = Payload::new(normalized.thumbnail, JPEG_CONTENT_TYPE);
                self.store(&base.key(options, ImageForm::Full), &full, ttl).await;
                self.store(&base.key(options, ImageForm::Thumbnail), &thumbnail, ttl).await;
                if form == ImageForm::Full { full } else { thumbnail }
            }
        };

        tracing::info!(%url, render_type = %options.render_type, source = %options.source, form = %options.form, "rendered form served");
        Ok(Retrieval { payload, cache_key: key, cache_hit: false, timestamp })
    }

    async fn closest(&self, key: &CaptureQueryKey, target: Option<NaiveDateTime>) -> Result<Match, Error> {
        let captures = self.index.list(key).await;
        let target = target.unwrap_or_else(|| Utc::now().naive_utc());
        closest_to(&captures, target).ok_or_else(|| Error::NotFound(format!("no captures of {key}")))
    }

    async fn cached(&self, key: &str) -> Option<Payload> {
        match self.cache.get(key).await {
            Ok(Some(entry)) => {
                tracing::debug!(%key, "cache hit");
                Some(Payload::from(entry))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, payload: &Payload, ttl: Option<Duration>) {
        if let Err(e) = self.cache.put(key, &CacheEntry::from(payload), ttl).await {
            tracing::warn!(%key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdx::{LookupSort, MatchType};
    use crate::warc::testing::{MemoryStorage, gzip, warc_response};
    use image::{ImageFormat, Rgba, RgbaImage};
    use memento_core::{Capture, pwid};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeIndex {
        captures: Mutex<Vec<(String, Capture)>>,
        queries: AtomicUsize,
    }

    impl FakeIndex {
        fn with(self, key: &str, timestamp: &str, file: &str) -> Self {
            let capture = Capture {
                timestamp: Timestamp::parse(timestamp).unwrap(),
                file: file.to_string(),
                compressed_offset: 0,
                compressed_end_offset: None,
            };
            self.captures.lock().unwrap().push((key.to_string(), capture));
            self
        }
    }

    #[async_trait::async_trait]
    impl CaptureIndex for FakeIndex {
        async fn list(&self, key: &CaptureQueryKey) -> Captures {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let key = key.to_string();
            self.captures
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, c)| c.clone())
                .collect()
        }

        async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CdxLine>, Error> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let captures = self.captures.lock().unwrap();
            let mut lines: Vec<CdxLine> = captures
                .iter()
                .filter(|(k, _)| match query.match_type {
                    MatchType::Prefix => k.starts_with(&query.url),
                    _ => *k == query.url,
                })
                .map(|(k, c)| CdxLine {
                    urlkey: k.clone(),
                    timestamp: c.timestamp.to_string(),
                    original: k.clone(),
                    mimetype: None,
                    status: Some(200),
                    digest: None,
                    redirect: None,
                    length: c.compressed_end_offset,
                    offset: Some(c.compressed_offset),
                    filename: Some(c.file.clone()),
                })
                .collect();
            if query.sort == LookupSort::Reverse {
                lines.reverse();
            }
            lines.truncate(query.limit.unwrap_or(usize::MAX));
            Ok(lines)
        }
    }

    struct FakeAccess {
        status: Option<u16>,
        checks: AtomicUsize,
    }

    impl FakeAccess {
        fn open() -> Self {
            Self { status: None, checks: AtomicUsize::new(0) }
        }

        fn denying(status: u16) -> Self {
            Self { status: Some(status), checks: AtomicUsize::new(0) }
        }
    }

    #[async_trait::async_trait]
    impl AccessOracle for FakeAccess {
        async fn check(&self, url: &str) -> Result<(), Error> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            match self.status {
                Some(status) => Err(Error::AccessDenied { url: url.to_string(), status }),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        renders: AtomicUsize,
        last_target: Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, _url: &str, target: Option<&Timestamp>) -> Result<Payload, Error> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            *self.last_target.lock().unwrap() = target.map(ToString::to_string);
            Ok(Payload::new(png(600, 1200), "image/png"))
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([20, 120, 200, 255])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    struct Harness {
        service: ArchiveService,
        index: Arc<FakeIndex>,
        storage: Arc<MemoryStorage>,
        access: Arc<FakeAccess>,
        renderer: Arc<FakeRenderer>,
    }

    async fn harness(index: FakeIndex, access: FakeAccess) -> Harness {
        let storage = MemoryStorage::new(256)
            .with_file("2020.warc.gz", gzip(&warc_response("http://example.org/", "text/html", b"<h1>2020</h1>")))
            .with_file("2021.warc.gz", gzip(&warc_response("http://example.org/", "text/html", b"<h1>2021</h1>")))
            .with_file("shot.warc.gz", gzip(&warc_response("screenshot:http://example.org/", "image/png", &png(400, 300))));

        let index = Arc::new(index);
        let storage = Arc::new(storage);
        let access = Arc::new(access);
        let renderer = Arc::new(FakeRenderer::default());
        let config = ServiceConfig {
            archive_id: pwid::DEFAULT_ARCHIVE_ID.to_string(),
            pwid_layout: PwidLayout::Iso,
            render_ttl: Duration::from_secs(3600),
            playback_prefix: "https://archive.example/wayback/".to_string(),
        };

        let service = ArchiveService::new(
            index.clone(),
            RecordFetcher::new(storage.clone(), 1 << 20),
            access.clone(),
            renderer.clone(),
            CacheDb::open_in_memory().await.unwrap(),
            config,
        );
        Harness { service, index, storage, access, renderer }
    }

    fn two_captures() -> FakeIndex {
        FakeIndex::default()
            .with("http://example.org/", "20200101000000", "2020.warc.gz")
            .with("http://example.org/", "20210101000000", "2021.warc.gz")
            .with("screenshot:http://example.org/", "20200101000000", "shot.warc.gz")
    }

    #[tokio::test]
    async fn test_closest_capture_served() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let got = h
            .service
            .retrieve(&RetrievalRequest::content("http://example.org/").at("20200601000000"))
            .await
            .unwrap();

        assert_eq!(got.payload.bytes.as_ref(), b"<h1>2020</h1>");
        assert_eq!(got.payload.content_type, "text/html");
        assert_eq!(got.timestamp.map(|t| t.to_string()).as_deref(), Some("20200101000000"));
        assert_eq!(got.cache_key, "capture:20200101000000:http://example.org/");
        assert!(!got.cache_hit);
    }

    #[tokio::test]
    async fn test_content_cached_after_first_fetch() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let request = RetrievalRequest::content("example.org").at("20201201000000");

        let first = h.service.retrieve(&request).await.unwrap();
        let second = h.service.retrieve(&request).await.unwrap();

        assert_eq!(first.payload, second.payload);
        assert!(second.cache_hit);
        assert_eq!(h.storage.opens(), 1);
    }

    #[tokio::test]
    async fn test_no_captures_is_not_found_without_fetch() {
        let h = harness(FakeIndex::default(), FakeAccess::open()).await;
        let result = h.service.retrieve(&RetrievalRequest::content("http://example.org/")).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(h.storage.opens(), 0);
    }

    #[tokio::test]
    async fn test_access_denied_before_index() {
        let h = harness(two_captures(), FakeAccess::denying(403)).await;
        let result = h.service.retrieve(&RetrievalRequest::content("http://example.org/")).await;

        assert!(matches!(result, Err(Error::AccessDenied { status: 403, .. })));
        assert_eq!(h.index.queries.load(Ordering::SeqCst), 0);
        assert_eq!(h.storage.opens(), 0);
    }

    #[tokio::test]
    async fn test_access_denied_before_cache() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let request = RetrievalRequest::content("http://example.org/").at("20200101000000");
        h.service.retrieve(&request).await.unwrap();

        let denied = ArchiveService { access: Arc::new(FakeAccess::denying(451)), ..h.service.clone() };
        assert!(matches!(denied.retrieve(&request).await, Err(Error::AccessDenied { status: 451, .. })));
    }

    #[tokio::test]
    async fn test_bad_timestamp_fails_before_io() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let result = h
            .service
            .retrieve(&RetrievalRequest::content("http://example.org/").at("yesterday"))
            .await;

        assert!(matches!(result, Err(Error::InvalidTimestamp(_))));
        assert_eq!(h.access.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_url_rejected() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let result = h.service.retrieve(&RetrievalRequest::content("ftp://example.org/")).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_same_pwid_fetched_once() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let token = pwid::generate("20200101000000", "http://example.org/").unwrap();
        let options = RenderOptions::pwid_default();

        let first = h.service.retrieve_pwid(&token, &options).await.unwrap();
        let second = h.service.retrieve_pwid(&token, &options).await.unwrap();

        assert_eq!(h.renderer.renders.load(Ordering::SeqCst), 1);
        assert_eq!(first.payload.bytes, second.payload.bytes);
        assert!(second.cache_hit);
        assert_eq!(first.cache_key, "urn:pwid:webarchive.org.uk:2020-01-01T00:00:00Z:page:http://example.org/");
        assert_eq!(h.renderer.last_target.lock().unwrap().as_deref(), Some("20200101000000"));
    }

    #[tokio::test]
    async fn test_pwid_https_downgraded() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let token = pwid::generate("20200101000000", "https://example.org/").unwrap();
        let got = h.service.retrieve_pwid(&token, &RenderOptions::pwid_default()).await.unwrap();
        assert!(got.cache_key.ends_with(":page:http://example.org/"));
    }

    #[tokio::test]
    async fn test_pwid_foreign_archive_rejected() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let token = Pwid::new("20200101000000", "http://example.org/")
            .unwrap()
            .with_archive_id("archive.org")
            .encode(PwidLayout::Iso);

        let result = h.service.retrieve_pwid(&token, &RenderOptions::pwid_default()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(h.access.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pwid_non_page_scope_rejected() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let token = Pwid::new("20200101000000", "http://example.org/")
            .unwrap()
            .with_scope("site")
            .encode(PwidLayout::Iso);

        let result = h.service.retrieve_pwid(&token, &RenderOptions::pwid_default()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_malformed_pwid() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let result = h.service.retrieve_pwid("not-a-pwid", &RenderOptions::pwid_default()).await;
        assert!(matches!(result, Err(Error::MalformedIdentifier(_))));
    }

    #[tokio::test]
    async fn test_original_screenshot_from_index() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let request = RetrievalRequest::rendered("http://example.org/", RenderOptions::new("screenshot"));
        let got = h.service.retrieve(&request).await.unwrap();

        assert_eq!(got.payload.content_type, "image/png");
        assert_eq!(got.timestamp.map(|t| t.to_string()).as_deref(), Some("20200101000000"));
        assert_eq!(h.renderer.renders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_rendered_capture_is_not_found() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let request = RetrievalRequest::rendered("http://example.org/", RenderOptions::new("har"));
        assert!(matches!(h.service.retrieve(&request).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_thumbnail_caches_both_forms() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let options = RenderOptions { form: ImageForm::Thumbnail, crop: true, ..RenderOptions::pwid_default() };
        let token = pwid::generate("20200101000000", "http://example.org/").unwrap();

        let thumb = h.service.retrieve_pwid(&token, &options).await.unwrap();
        assert_eq!(thumb.payload.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&thumb.payload.bytes).unwrap();
        assert_eq!(decoded.width(), 300);
        assert_eq!(decoded.height(), 320);

        let full_options = RenderOptions { form: ImageForm::Full, ..options };
        let full = h.service.retrieve_pwid(&token, &full_options).await.unwrap();
        assert!(full.cache_hit);
        assert_eq!(image::load_from_memory(&full.payload.bytes).unwrap().height(), 640);
        assert_eq!(h.renderer.renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_export_record() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        let export = h.service.export_record("http://example.org/", Some("2021-02-01T00:00:00Z")).await.unwrap();

        assert_eq!(export.payload.content_type, "application/warc");
        assert!(export.payload.bytes.starts_with(b"WARC/1.0"));
        assert_eq!(export.timestamp.to_string(), "20210101000000");
        assert!(export.filename.starts_with("20210101000000_"));
        assert!(export.filename.ends_with(".warc"));
    }

    #[tokio::test]
    async fn test_list_captures() {
        let h = harness(two_captures(), FakeAccess::open()).await;
        assert_eq!(h.service.list_captures("http://example.org/", None).await.unwrap().len(), 2);
        assert_eq!(h.service.list_captures("http://example.org/", Some("screenshot")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_prefix_reverse_limit() {
        let index = two_captures().with("http://example.org/about", "20220101000000", "2022.warc.gz");
        let h = harness(index, FakeAccess::open()).await;
        let query = LookupQuery {
            match_type: MatchType::Prefix,
            sort: LookupSort::Reverse,
            limit: Some(2),
            ..LookupQuery::exact("HTTP://Example.org/")
        };

        let lines = h.service.lookup(&query).await.unwrap();
        let stamps: Vec<&str> = lines.iter().map(|l| l.timestamp.as_str()).collect();
        assert_eq!(stamps, ["20220101000000", "20210101000000"]);
    }

    #[tokio::test]
    async fn test_lookup_access_denied() {
        let h = harness(two_captures(), FakeAccess::denying(403)).await;
        let result = h.service.lookup(&LookupQuery::exact("http://example.org/")).await;
        assert!(matches!(result, Err(Error::AccessDenied { .. })));
        assert_eq!(h.index.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolve_playback_url() {
        let h = harness(FakeIndex::default(), FakeAccess::open()).await;
        assert_eq!(
            h.service.resolve("2020-01-01T00:00:00Z", "http://example.org/").unwrap(),
            "https://archive.example/wayback/20200101000000/http://example.org/"
        );
        assert!(matches!(h.service.resolve("soon", "http://example.org/"), Err(Error::InvalidTimestamp(_))));
        assert_eq!(h.access.checks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!("Archive".parse::<Source>().unwrap(), Source::Archive);
        assert_eq!("as-captured".parse::<ImageForm>().unwrap(), ImageForm::AsCaptured);
        assert!("sideways".parse::<ImageForm>().is_err());
    }

    #[test]
    fn test_pwid_key_qualifiers() {
        let base = KeyBase::Pwid("urn:pwid:x".into());
        let defaults = RenderOptions::pwid_default();
        assert_eq!(base.key(&defaults, ImageForm::AsCaptured), "urn:pwid:x");

        let cropped = RenderOptions { crop: true, ..defaults };
        assert_eq!(base.key(&cropped, ImageForm::Thumbnail), "urn:pwid:x#screenshot:archive:thumbnail+crop");
    }
}

//! Archived record retrieval.
//!
//! ### Storage reads
//! - `GET {prefix}{file}?op=OPEN&user.name={user}&offset={offset}[&length={length}]`
//! - Transparent HTTP decompression is off; the bytes are a gzip member.
//! - With a length, never more than that many bytes are consumed.
//! - Without one, reading stops at the end of the first gzip member and the
//!   response is dropped, which cancels the rest of the transfer.
//!
//! ### Decoding
//! - Gzip members are decoded incrementally with CRC and size checks.
//! - Bytes without the gzip magic are read as an uncompressed record.
//! - The record is parsed as WARC or ARC and reduced to its payload, unless
//!   the raw record was asked for.

pub mod member;
pub mod record;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use memento_core::{CacheEntry, Error, StorageLocator};

pub use member::{MemberDecoder, MemberError, is_gzip};
pub use record::{Framing, Headers, ParsedRecord, RecordError, export_filename, parse_record, record_extent};

impl From<MemberError> for Error {
    fn from(err: MemberError) -> Self {
        Error::DecodeFailure(err.to_string())
    }
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Error::DecodeFailure(err.to_string())
    }
}

/// Bytes with their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Bytes,
    pub content_type: String,
}

impl Payload {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), content_type: content_type.into() }
    }
}

impl From<CacheEntry> for Payload {
    fn from(entry: CacheEntry) -> Self {
        Self::new(entry.payload, entry.content_type)
    }
}

impl From<&Payload> for CacheEntry {
    fn from(payload: &Payload) -> Self {
        CacheEntry::new(payload.bytes.to_vec(), payload.content_type.clone())
    }
}

/// A response body read chunk by chunk.
#[async_trait::async_trait]
pub trait ChunkStream: Send {
    /// Next chunk, or None at the end of the body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error>;
}

#[async_trait::async_trait]
impl ChunkStream for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        self.chunk()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("storage read failed: {e}")))
    }
}

/// Opens a byte range of a stored file.
#[async_trait::async_trait]
pub trait RangeReader: Send + Sync {
    async fn open(&self, locator: &StorageLocator) -> Result<Box<dyn ChunkStream>, Error>;
}

/// Configuration for the storage client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Prefix the file name is appended to.
    pub prefix: String,
    pub user: String,
    pub user_agent: String,
    pub timeout: Duration,
}

/// WebHDFS-style storage reader.
#[derive(Debug, Clone)]
pub struct StorageClient {
    http: Client,
    config: StorageConfig,
}

impl StorageClient {
    pub fn new(config: StorageConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to build storage client: {e}")))?;

        Ok(Self { http, config })
    }

    pub fn open_url(&self, locator: &StorageLocator) -> String {
        let mut url = format!(
            "{}{}?op=OPEN&user.name={}&offset={}",
            self.config.prefix,
            locator.file,
            urlencoding::encode(&self.config.user),
            locator.offset
        );
        if let Some(length) = locator.length {
            url.push_str(&format!("&length={length}"));
        }
        url
    }
}

#[async_trait::async_trait]
impl RangeReader for StorageClient {
    async fn open(&self, locator: &StorageLocator) -> Result<Box<dyn ChunkStream>, Error> {
        let url = self.open_url(locator);
        tracing::debug!(%url, "opening stored record");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("storage unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "storage returned status {} for {}",
                status.as_u16(),
                locator.file
            )));
        }

        Ok(Box::new(response))
    }
}

/// What to return from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// The HTTP payload (or block) with its own content type.
    #[default]
    Payload,
    /// The whole decompressed record as `application/warc` or `application/arc`.
    Record,
}

/// Reads single records out of stored record files.
#[derive(Clone)]
pub struct RecordFetcher {
    reader: Arc<dyn RangeReader>,
    max_bytes: usize,
}

impl RecordFetcher {
    /// `max_bytes` bounds both the compressed read and the decoded record.
    pub fn new(reader: Arc<dyn RangeReader>, max_bytes: usize) -> Self {
        Self { reader, max_bytes }
    }

    pub async fn fetch(&self, locator: Option<&StorageLocator>, mode: FetchMode) -> Result<Payload, Error> {
        let locator = locator.ok_or_else(|| Error::NotFound("no capture to fetch".into()))?;
        let raw = self.read_record(locator).await?;

        match mode {
            FetchMode::Record => {
                let framing = Framing::detect(&raw);
                Ok(Payload::new(raw, framing.content_type()))
            }
            FetchMode::Payload => {
                let parsed = parse_record(&raw, self.max_bytes)?;
                tracing::debug!(
                    file = %locator.file,
                    offset = locator.offset,
                    status = ?parsed.http_status,
                    content_type = %parsed.content_type,
                    bytes = parsed.payload.len(),
                    "record payload decoded"
                );
                Ok(Payload::new(parsed.payload, parsed.content_type))
            }
        }
    }

    /// The decompressed bytes of the record at `locator`.
    pub async fn read_record(&self, locator: &StorageLocator) -> Result<Vec<u8>, Error> {
        let cap = match locator.length {
            Some(length) if length > self.max_bytes as u64 => {
                return Err(Error::DecodeFailure(format!(
                    "record length {length} exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            Some(length) => length as usize,
            None => self.max_bytes,
        };

        let mut stream = self.reader.open(locator).await?;
        let mut body = RecordBody::new(self.max_bytes);
        let mut taken = 0usize;

        while taken < cap {
            let Some(chunk) = stream.next_chunk().await? else {
                break;
            };
            let usable = &chunk[..chunk.len().min(cap - taken)];
            taken += usable.len();
            body.feed(usable)?;
            if body.is_complete() {
                break;
            }
        }
        drop(stream);

        if !body.is_complete() && locator.length.is_none() && taken >= cap {
            return Err(Error::DecodeFailure(format!("record exceeds the {} byte limit", self.max_bytes)));
        }

        tracing::debug!(file = %locator.file, offset = locator.offset, compressed = taken, "record read");
        body.finish()
    }
}

/// Decoder state while the record streams in.
enum RecordBody {
    /// Not enough bytes yet to tell gzip from plain.
    Pending(Vec<u8>, usize),
    Gzip(MemberDecoder),
    Plain { buf: Vec<u8>, extent: Option<usize> },
}

impl RecordBody {
    fn new(limit: usize) -> Self {
        RecordBody::Pending(Vec::new(), limit)
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<(), Error> {
        match self {
            RecordBody::Pending(buf, limit) => {
                buf.extend_from_slice(chunk);
                if buf.len() < 2 {
                    return Ok(());
                }
                let (head, limit) = (std::mem::take(buf), *limit);
                *self = if is_gzip(&head) {
                    RecordBody::Gzip(MemberDecoder::new(limit))
                } else {
                    RecordBody::Plain { buf: Vec::new(), extent: None }
                };
                self.feed(&head)
            }
            RecordBody::Gzip(decoder) => Ok(decoder.feed(chunk)?),
            RecordBody::Plain { buf, extent } => {
                buf.extend_from_slice(chunk);
                if extent.is_none() {
                    *extent = record_extent(buf)?;
                }
                Ok(())
            }
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            RecordBody::Pending(..) => false,
            RecordBody::Gzip(decoder) => decoder.is_done(),
            RecordBody::Plain { buf, extent } => extent.is_some_and(|n| buf.len() >= n),
        }
    }

    fn finish(self) -> Result<Vec<u8>, Error> {
        match self {
            RecordBody::Pending(buf, _) if buf.is_empty() => {
                Err(Error::DecodeFailure("storage returned no bytes".into()))
            }
            RecordBody::Pending(..) => Err(RecordError::UnterminatedHeader.into()),
            RecordBody::Gzip(decoder) => Ok(decoder.finish()?),
            RecordBody::Plain { mut buf, extent } => match extent {
                Some(n) if buf.len() >= n => {
                    buf.truncate(n);
                    Ok(buf)
                }
                Some(n) => Err(RecordError::Truncated { expected: n, actual: buf.len() }.into()),
                None => Err(RecordError::UnterminatedHeader.into()),
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    const LIMIT: usize = 1 << 20;

    fn locator(file: &str, offset: u64, length: Option<u64>) -> StorageLocator {
        StorageLocator { file: file.to_string(), offset, length }
    }

    fn two_record_file() -> (Vec<u8>, usize) {
        let first = gzip(&warc_response("http://example.org/", "text/html", b"<p>first</p>"));
        let second = gzip(&warc_response("http://example.org/2", "text/html", &[b'z'; 4096]));
        let first_len = first.len();
        let mut file = first;
        file.extend(second);
        (file, first_len)
    }

    #[tokio::test]
    async fn test_fetch_payload() {
        let (file, _) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(64).with_file("a.warc.gz", file));
        let fetcher = RecordFetcher::new(storage, LIMIT);

        let payload = fetcher.fetch(Some(&locator("a.warc.gz", 0, None)), FetchMode::Payload).await.unwrap();
        assert_eq!(payload.bytes.as_ref(), b"<p>first</p>");
        assert_eq!(payload.content_type, "text/html");
    }

    #[tokio::test]
    async fn test_unbounded_read_stops_after_first_member() {
        let (file, first_len) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(16).with_file("a.warc.gz", file.clone()));
        let fetcher = RecordFetcher::new(storage.clone(), LIMIT);

        fetcher.read_record(&locator("a.warc.gz", 0, None)).await.unwrap();
        assert!(storage.pulled() < first_len + 16);
        assert!(storage.pulled() < file.len());
    }

    #[tokio::test]
    async fn test_length_bounds_consumption() {
        let (file, first_len) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(1000).with_file("a.warc.gz", file));
        let fetcher = RecordFetcher::new(storage.clone(), LIMIT);

        let raw = fetcher
            .read_record(&locator("a.warc.gz", 0, Some(first_len as u64)))
            .await
            .unwrap();
        assert!(raw.starts_with(b"WARC/1.0"));
        assert!(String::from_utf8_lossy(&raw).contains("<p>first</p>"));
        assert!(storage.pulled() <= 1000);
    }

    #[tokio::test]
    async fn test_second_member_by_offset() {
        let (file, first_len) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(128).with_file("a.warc.gz", file));
        let fetcher = RecordFetcher::new(storage, LIMIT);

        let payload = fetcher
            .fetch(Some(&locator("a.warc.gz", first_len as u64, None)), FetchMode::Payload)
            .await
            .unwrap();
        assert_eq!(payload.bytes.len(), 4096);
    }

    #[tokio::test]
    async fn test_short_length_is_decode_failure() {
        let (file, first_len) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(64).with_file("a.warc.gz", file));
        let fetcher = RecordFetcher::new(storage, LIMIT);

        let result = fetcher
            .read_record(&locator("a.warc.gz", 0, Some(first_len as u64 - 4)))
            .await;
        assert!(matches!(result, Err(Error::DecodeFailure(_))));
    }

    #[tokio::test]
    async fn test_raw_record_mode() {
        let (file, _) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(64).with_file("a.warc.gz", file));
        let fetcher = RecordFetcher::new(storage, LIMIT);

        let record = fetcher.fetch(Some(&locator("a.warc.gz", 0, None)), FetchMode::Record).await.unwrap();
        assert_eq!(record.content_type, "application/warc");
        assert!(record.bytes.starts_with(b"WARC/1.0\r\n"));
    }

    #[tokio::test]
    async fn test_uncompressed_record() {
        let mut file = warc_response("http://example.org/", "text/plain", b"plain");
        let first_len = file.len();
        file.extend(warc_response("http://example.org/2", "text/plain", &[b'q'; 2048]));
        let storage = Arc::new(MemoryStorage::new(32).with_file("a.warc", file));
        let fetcher = RecordFetcher::new(storage.clone(), LIMIT);

        let payload = fetcher.fetch(Some(&locator("a.warc", 0, None)), FetchMode::Payload).await.unwrap();
        assert_eq!(payload.bytes.as_ref(), b"plain");
        assert!(storage.pulled() < first_len + 32);
    }

    #[tokio::test]
    async fn test_single_byte_is_decode_failure() {
        let storage = Arc::new(MemoryStorage::new(8).with_file("a.arc", b"Z".to_vec()));
        let fetcher = RecordFetcher::new(storage, LIMIT);

        for mode in [FetchMode::Record, FetchMode::Payload] {
            let result = fetcher.fetch(Some(&locator("a.arc", 0, None)), mode).await;
            assert!(matches!(result, Err(Error::DecodeFailure(_))), "{mode:?}");
        }
    }

    #[tokio::test]
    async fn test_missing_locator_is_not_found() {
        let fetcher = RecordFetcher::new(Arc::new(MemoryStorage::new(8)), LIMIT);
        let result = fetcher.fetch(None, FetchMode::Payload).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let fetcher = RecordFetcher::new(Arc::new(MemoryStorage::new(8)), LIMIT);
        let result = fetcher.fetch(Some(&locator("missing.warc.gz", 0, None)), FetchMode::Payload).await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let (file, _) = two_record_file();
        let storage = Arc::new(MemoryStorage::new(64).with_file("a.warc.gz", file));
        let fetcher = RecordFetcher::new(storage, 100);

        let result = fetcher.read_record(&locator("a.warc.gz", 0, Some(5000))).await;
        assert!(matches!(result, Err(Error::DecodeFailure(_))));
        let result = fetcher.read_record(&locator("a.warc.gz", 0, None)).await;
        assert!(matches!(result, Err(Error::DecodeFailure(_))));
    }

    #[test]
    fn test_open_url() {
        let client = StorageClient::new(StorageConfig {
            prefix: "http://warc.example/webhdfs/v1/by-filename/".into(),
            user: "access".into(),
            user_agent: "memento-test".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        assert_eq!(
            client.open_url(&locator("a.warc.gz", 10, Some(20))),
            "http://warc.example/webhdfs/v1/by-filename/a.warc.gz?op=OPEN&user.name=access&offset=10&length=20"
        );
        assert_eq!(
            client.open_url(&locator("a.warc.gz", 10, None)),
            "http://warc.example/webhdfs/v1/by-filename/a.warc.gz?op=OPEN&user.name=access&offset=10"
        );
    }
}

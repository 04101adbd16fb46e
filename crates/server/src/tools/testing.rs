//! In-memory collaborators for tool tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use memento_client::warc::ChunkStream;
use memento_client::{
    AccessOracle, ArchiveService, CaptureIndex, CdxLine, LookupQuery, Payload, RangeReader, RecordFetcher, Renderer,
    ServiceConfig,
};
use memento_core::{CacheDb, Capture, CaptureQueryKey, Captures, Error, PwidLayout, StorageLocator, Timestamp};
use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;

struct Index(Vec<(&'static str, &'static str, &'static str)>);

#[async_trait::async_trait]
impl CaptureIndex for Index {
    async fn list(&self, key: &CaptureQueryKey) -> Captures {
        let key = key.to_string();
        self.0
            .iter()
            .filter(|(k, _, _)| *k == key)
            .map(|(_, ts, file)| Capture {
                timestamp: Timestamp::parse(ts).unwrap(),
                file: file.to_string(),
                compressed_offset: 0,
                compressed_end_offset: None,
            })
            .collect()
    }

    async fn lookup(&self, query: &LookupQuery) -> Result<Vec<CdxLine>, Error> {
        Ok(self
            .0
            .iter()
            .filter(|(k, _, _)| *k == query.url)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(k, ts, file)| CdxLine {
                urlkey: k.to_string(),
                timestamp: ts.to_string(),
                original: k.to_string(),
                mimetype: Some("text/html".into()),
                status: Some(200),
                digest: None,
                redirect: None,
                length: None,
                offset: Some(0),
                filename: Some(file.to_string()),
            })
            .collect())
    }
}

struct Storage(HashMap<&'static str, Vec<u8>>);

struct OneChunk(Option<Bytes>);

#[async_trait::async_trait]
impl ChunkStream for OneChunk {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.0.take())
    }
}

#[async_trait::async_trait]
impl RangeReader for Storage {
    async fn open(&self, locator: &StorageLocator) -> Result<Box<dyn ChunkStream>, Error> {
        let file = self
            .0
            .get(locator.file.as_str())
            .ok_or_else(|| Error::UpstreamUnavailable(locator.file.clone()))?;
        Ok(Box::new(OneChunk(Some(Bytes::copy_from_slice(&file[locator.offset as usize..])))))
    }
}

struct Open;

#[async_trait::async_trait]
impl AccessOracle for Open {
    async fn check(&self, _url: &str) -> Result<(), Error> {
        Ok(())
    }
}

struct PngRenderer;

#[async_trait::async_trait]
impl Renderer for PngRenderer {
    async fn render(&self, _url: &str, _target: Option<&Timestamp>) -> Result<Payload, Error> {
        Ok(Payload::new(&b"\x89PNG\r\n\x1a\nfake"[..], "image/png"))
    }
}

fn warc_response(body: &str) -> Vec<u8> {
    let http = format!("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{body}");
    format!(
        "WARC/1.0\r\nWARC-Type: response\r\nContent-Type: application/http; msgtype=response\r\n\
         Content-Length: {}\r\n\r\n{http}\r\n\r\n",
        http.len()
    )
    .into_bytes()
}

/// A service over two captures of `http://example.org/` (2020 and 2021).
pub async fn service() -> ArchiveService {
    let index = Index(vec![
        ("http://example.org/", "20200101000000", "2020.warc"),
        ("http://example.org/", "20210101000000", "2021.warc"),
    ]);
    let storage = Storage(HashMap::from([
        ("2020.warc", warc_response("<h1>2020</h1>")),
        ("2021.warc", warc_response("<h1>2021</h1>")),
    ]));
    let config = ServiceConfig {
        archive_id: memento_core::pwid::DEFAULT_ARCHIVE_ID.into(),
        pwid_layout: PwidLayout::Iso,
        render_ttl: Duration::from_secs(60),
        playback_prefix: "https://archive.example/wayback/".to_string(),
    };

    ArchiveService::new(
        Arc::new(index),
        RecordFetcher::new(Arc::new(storage), 1 << 20),
        Arc::new(Open),
        Arc::new(PngRenderer),
        CacheDb::open_in_memory().await.unwrap(),
        config,
    )
}

/// Deserialize the JSON text of a tool result.
pub fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    let text = content
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}

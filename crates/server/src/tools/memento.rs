//! Retrieval tools: memento_list, memento_lookup, memento_resolve, memento_fetch,
//! memento_pwid_fetch and memento_warc.
//!
//! Payloads are returned base64-encoded; textual payloads are also returned
//! decoded for convenience.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use memento_client::{
    ArchiveService, CdxLine, ImageForm, LookupQuery, LookupSort, MatchType, Payload, RenderOptions, RetrievalRequest,
    Source,
};
use memento_core::{Error, StorageLocator};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the memento_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoListParams {
    /// The archived URL.
    pub url: String,

    /// List a rendered form (e.g. "screenshot") instead of the page itself.
    #[serde(default)]
    pub render_type: Option<String>,
}

/// One capture in a listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureItem {
    /// 14-digit capture timestamp.
    pub timestamp: String,
    pub locator: StorageLocator,
}

/// Output from the memento_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoListOutput {
    pub url: String,
    pub count: usize,
    /// Captures, oldest first.
    pub captures: Vec<CaptureItem>,
}

/// Parameters for the memento_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoLookupParams {
    /// URL to look for; canonicalized before the query.
    pub url: String,

    /// "exact" (default), "prefix", "host" or "domain".
    #[serde(default)]
    pub match_type: Option<MatchType>,

    /// "default", "reverse" or "closest".
    #[serde(default)]
    pub sort: Option<LookupSort>,

    /// Maximum number of lines to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Output from the memento_lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoLookupOutput {
    pub url: String,
    pub count: usize,
    pub lines: Vec<CdxLine>,
}

/// Parameters for the memento_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoResolveParams {
    /// Target time, 14-digit or ISO-8601 with Z.
    pub timestamp: String,
    pub url: String,
}

/// Output from the memento_resolve tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoResolveOutput {
    /// Playback URL of the capture nearest the timestamp.
    pub playback_url: String,
}

/// Parameters for the memento_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoFetchParams {
    /// The archived URL.
    pub url: String,

    /// Target time, 14-digit (YYYYMMDDHHMMSS) or ISO-8601 with Z. Defaults to now.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Rendered form to fetch (e.g. "screenshot"). Omit for the captured content.
    #[serde(default)]
    pub render_type: Option<String>,

    /// "original" (rendered at crawl time, default) or "archive" (rendered now).
    #[serde(default)]
    pub source: Option<Source>,

    /// "as_captured" (default), "full" or "thumbnail".
    #[serde(default)]
    pub form: Option<ImageForm>,

    /// Keep only the top 640 rows of normalised images.
    #[serde(default)]
    pub crop: bool,
}

/// Parameters for the memento_pwid_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoPwidFetchParams {
    /// PWID as a URN, percent-encoded URN or base64 token.
    pub pwid: String,

    /// Rendered form to fetch (default "screenshot").
    #[serde(default)]
    pub render_type: Option<String>,

    /// "archive" (rendered now, default) or "original".
    #[serde(default)]
    pub source: Option<Source>,

    /// "as_captured" (default), "full" or "thumbnail".
    #[serde(default)]
    pub form: Option<ImageForm>,

    /// Keep only the top 640 rows of normalised images.
    #[serde(default)]
    pub crop: bool,
}

/// Output from the fetch tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoFetchOutput {
    pub url: String,
    /// Timestamp of the capture served, when one was selected from the index.
    pub timestamp: Option<String>,
    pub content_type: String,
    pub size: usize,
    pub cache_key: String,
    pub cache_hit: bool,
    pub payload_base64: String,
    /// The payload as text, for textual content types.
    pub text: Option<String>,
}

/// Parameters for the memento_warc tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoWarcParams {
    /// The archived URL.
    pub url: String,

    /// Target time, 14-digit or ISO-8601 with Z. Defaults to now.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Output from the memento_warc tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MementoWarcOutput {
    pub url: String,
    pub timestamp: String,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub record_base64: String,
}

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime.starts_with("text/") || mime.ends_with("+xml") || mime.ends_with("json") || mime == "application/xml"
}

fn fetch_output(url: String, timestamp: Option<String>, payload: Payload, cache_key: String, cache_hit: bool) -> MementoFetchOutput {
    let text = is_textual(&payload.content_type).then(|| String::from_utf8_lossy(&payload.bytes).into_owned());
    MementoFetchOutput {
        url,
        timestamp,
        size: payload.bytes.len(),
        payload_base64: STANDARD.encode(&payload.bytes),
        content_type: payload.content_type,
        cache_key,
        cache_hit,
        text,
    }
}

/// Implementation of the memento_list tool.
pub async fn list_impl(service: &ArchiveService, params: MementoListParams) -> Result<CallToolResult, McpError> {
    let captures = service
        .list_captures(&params.url, params.render_type.as_deref())
        .await?;

    let captures: Vec<CaptureItem> = captures
        .iter()
        .map(|(ts, locator)| CaptureItem { timestamp: ts.to_string(), locator: locator.clone() })
        .collect();

    json_result(&MementoListOutput { url: params.url, count: captures.len(), captures })
}

/// Implementation of the memento_lookup tool.
pub async fn lookup_impl(service: &ArchiveService, params: MementoLookupParams) -> Result<CallToolResult, McpError> {
    let query = LookupQuery {
        match_type: params.match_type.unwrap_or_default(),
        sort: params.sort.unwrap_or_default(),
        limit: params.limit,
        ..LookupQuery::exact(params.url.clone())
    };
    let lines = service.lookup(&query).await?;
    json_result(&MementoLookupOutput { url: params.url, count: lines.len(), lines })
}

/// Implementation of the memento_resolve tool.
pub fn resolve_impl(service: &ArchiveService, params: MementoResolveParams) -> Result<CallToolResult, McpError> {
    let playback_url = service.resolve(&params.timestamp, &params.url)?;
    json_result(&MementoResolveOutput { playback_url })
}

/// Implementation of the memento_fetch tool.
pub async fn fetch_impl(service: &ArchiveService, params: MementoFetchParams) -> Result<CallToolResult, McpError> {
    let render = params.render_type.map(|render_type| RenderOptions {
        source: params.source.unwrap_or_default(),
        form: params.form.unwrap_or_default(),
        crop: params.crop,
        ..RenderOptions::new(render_type)
    });
    let request = RetrievalRequest { url: params.url.clone(), timestamp: params.timestamp, render };

    let retrieval = service.retrieve(&request).await?;
    json_result(&fetch_output(
        params.url,
        retrieval.timestamp.map(|t| t.to_string()),
        retrieval.payload,
        retrieval.cache_key,
        retrieval.cache_hit,
    ))
}

/// Implementation of the memento_pwid_fetch tool.
pub async fn pwid_fetch_impl(
    service: &ArchiveService, params: MementoPwidFetchParams,
) -> Result<CallToolResult, McpError> {
    let defaults = RenderOptions::pwid_default();
    let options = RenderOptions {
        render_type: params.render_type.unwrap_or(defaults.render_type),
        source: params.source.unwrap_or(defaults.source),
        form: params.form.unwrap_or(defaults.form),
        crop: params.crop,
    };

    let retrieval = service.retrieve_pwid(&params.pwid, &options).await?;
    json_result(&fetch_output(
        params.pwid,
        retrieval.timestamp.map(|t| t.to_string()),
        retrieval.payload,
        retrieval.cache_key,
        retrieval.cache_hit,
    ))
}

/// Implementation of the memento_warc tool.
pub async fn warc_impl(service: &ArchiveService, params: MementoWarcParams) -> Result<CallToolResult, McpError> {
    let export = service.export_record(&params.url, params.timestamp.as_deref()).await?;

    json_result(&MementoWarcOutput {
        url: params.url,
        timestamp: export.timestamp.to_string(),
        filename: export.filename,
        content_type: export.payload.content_type,
        size: export.payload.bytes.len(),
        record_base64: STANDARD.encode(&export.payload.bytes),
    })
}

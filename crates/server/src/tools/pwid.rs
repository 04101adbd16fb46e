//! pwid_generate and pwid_parse tools.
//!
//! Pure functions over the identifier codec; no network requests are made.

use memento_core::{Error, Pwid, PwidLayout};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the pwid_generate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PwidGenerateParams {
    /// 14-digit capture timestamp (YYYYMMDDHHMMSS).
    pub timestamp: String,

    /// The archived URL.
    pub url: String,
}

/// Output from the pwid_generate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PwidGenerateOutput {
    pub urn: String,
    /// URL-safe base64 of the URN.
    pub token: String,
}

/// Parameters for the pwid_parse tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PwidParseParams {
    /// URN, percent-encoded URN or base64 token.
    pub pwid: String,
}

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the pwid_generate tool.
pub fn generate_impl(
    archive_id: &str, layout: PwidLayout, params: PwidGenerateParams,
) -> Result<CallToolResult, McpError> {
    let pwid = Pwid::new(&params.timestamp, &params.url)
        .map_err(Error::from)?
        .with_archive_id(archive_id);

    json_result(&PwidGenerateOutput { urn: pwid.to_urn(layout), token: pwid.encode(layout) })
}

/// Implementation of the pwid_parse tool.
pub fn parse_impl(params: PwidParseParams) -> Result<CallToolResult, McpError> {
    let pwid = memento_core::pwid::parse(&params.pwid)?;
    json_result(&pwid)
}

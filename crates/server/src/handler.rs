//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::{
    CachePurgeParams, MementoFetchParams, MementoListParams, MementoLookupParams, MementoPwidFetchParams,
    MementoResolveParams, MementoWarcParams, PwidGenerateParams, PwidParseParams, memento, purge_impl, pwid,
};

use memento_client::ArchiveService;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for memento.
#[derive(Clone)]
pub struct McpMementoServer {
    service: ArchiveService,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl McpMementoServer {
    /// Create a new server handler around a configured retrieval service.
    pub fn new(service: ArchiveService) -> Self {
        Self { service, tool_router: Self::tool_router() }
    }

    #[tool(description = "List archived captures of a URL, oldest first. Set render_type (e.g. screenshot) to list a rendered form instead.")]
    async fn memento_list(&self, params: Parameters<MementoListParams>) -> Result<CallToolResult, McpError> {
        memento::list_impl(&self.service, params.0).await
    }

    #[tool(description = "Look up raw index (CDX11) lines for a URL. match_type widens the match to a prefix, host or domain; sort and limit shape the result.")]
    async fn memento_lookup(&self, params: Parameters<MementoLookupParams>) -> Result<CallToolResult, McpError> {
        memento::lookup_impl(&self.service, params.0).await
    }

    #[tool(description = "Resolve a timestamp and URL to the playback URL of the nearest archived version. No network requests are made.")]
    async fn memento_resolve(&self, params: Parameters<MementoResolveParams>) -> Result<CallToolResult, McpError> {
        memento::resolve_impl(&self.service, params.0)
    }

    /// Fetch the capture of a URL closest to a target time.
    ///
    /// Without render_type the archived content is returned; with it, a rendered form
    /// (taken at crawl time or rendered now from the archive).
    #[tool(description = "Fetch the archived capture of a URL closest to a timestamp (default now). Returns the payload base64-encoded, plus text for textual content.")]
    async fn memento_fetch(&self, params: Parameters<MementoFetchParams>) -> Result<CallToolResult, McpError> {
        memento::fetch_impl(&self.service, params.0).await
    }

    #[tool(description = "Fetch the rendered form (default: a screenshot of the archived page) named by a persistent web identifier (PWID).")]
    async fn memento_pwid_fetch(&self, params: Parameters<MementoPwidFetchParams>) -> Result<CallToolResult, McpError> {
        memento::pwid_fetch_impl(&self.service, params.0).await
    }

    #[tool(description = "Export the raw WARC/ARC record of the capture closest to a timestamp, with a download filename.")]
    async fn memento_warc(&self, params: Parameters<MementoWarcParams>) -> Result<CallToolResult, McpError> {
        memento::warc_impl(&self.service, params.0).await
    }

    #[tool(description = "Generate a persistent web identifier (PWID) for a capture timestamp and URL. No network requests are made.")]
    async fn pwid_generate(&self, params: Parameters<PwidGenerateParams>) -> Result<CallToolResult, McpError> {
        let config = self.service.config();
        pwid::generate_impl(&config.archive_id, config.pwid_layout, params.0)
    }

    #[tool(description = "Parse a PWID given as a URN, percent-encoded URN or base64 token.")]
    async fn pwid_parse(&self, params: Parameters<PwidParseParams>) -> Result<CallToolResult, McpError> {
        pwid::parse_impl(params.0)
    }

    #[tool(description = "Purge render cache entries: expired ones, all but the newest max_entries, or all.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(self.service.cache(), params.0).await
    }
}

impl ServerHandler for McpMementoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mcp-memento".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

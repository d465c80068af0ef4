//! MCP tool surface over the spec query engine.
//!
//! This is a thin dispatch layer: argument structs deserialize into the core filter
//! types, results serialize to pretty JSON text content, and lookup failures come back
//! as error-flagged tool results rather than protocol errors, so a calling agent sees
//! the message and can correct its arguments.

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ErrorCode, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, schemars, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use unrelated_spec_tools::query::{EndpointFilter, SchemaFilter, SpecExplorer};
use unrelated_spec_tools::resolver::DEFAULT_MAX_DEPTH;

/// MCP service exposing spec query tools.
#[derive(Clone)]
pub struct SpecExplorerService {
    explorer: Arc<SpecExplorer>,
    tool_router: ToolRouter<Self>,
}

impl SpecExplorerService {
    #[must_use]
    pub fn new(explorer: Arc<SpecExplorer>) -> Self {
        Self {
            explorer,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchEndpointsRequest {
    #[schemars(description = "Case-insensitive regex matched against endpoint paths, e.g. '^/users'")]
    pub path_pattern: Option<String>,

    #[schemars(description = "HTTP method to match exactly, case-insensitive, e.g. 'GET'")]
    pub method: Option<String>,

    #[schemars(description = "Match endpoints sharing at least one of these tags")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Case-insensitive regex matched against summaries and descriptions")]
    pub description: Option<String>,

    #[schemars(description = "Maximum results per page (default 20)")]
    pub limit: Option<usize>,

    #[schemars(description = "Results to skip before the page starts (default 0)")]
    pub offset: Option<usize>,
}

impl From<SearchEndpointsRequest> for EndpointFilter {
    fn from(request: SearchEndpointsRequest) -> Self {
        Self {
            path_pattern: request.path_pattern,
            method: request.method,
            tags: request.tags,
            description: request.description,
            limit: request.limit,
            offset: request.offset,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetEndpointDetailsRequest {
    #[schemars(description = "Exact endpoint path as it appears in the spec, e.g. '/pets/{petId}'")]
    pub path: String,

    #[schemars(description = "HTTP method of the operation, case-insensitive")]
    pub method: String,

    #[schemars(description = "Expand $ref pointers in the result (default true)")]
    pub resolve_refs: Option<bool>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSchemasRequest {
    #[schemars(description = "Case-insensitive regex matched against schema names")]
    pub name_pattern: Option<String>,

    #[schemars(description = "Case-insensitive substring matched against property names")]
    pub property_name: Option<String>,

    #[schemars(description = "Maximum results per page (default 20)")]
    pub limit: Option<usize>,

    #[schemars(description = "Results to skip before the page starts (default 0)")]
    pub offset: Option<usize>,
}

impl From<SearchSchemasRequest> for SchemaFilter {
    fn from(request: SearchSchemasRequest) -> Self {
        Self {
            name_pattern: request.name_pattern,
            property_name: request.property_name,
            limit: request.limit,
            offset: request.offset,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSchemaDetailsRequest {
    #[schemars(description = "Exact schema name from components.schemas")]
    pub schema_name: String,

    #[schemars(description = "Expand $ref pointers in the schema (default true)")]
    pub resolve_refs: Option<bool>,

    #[schemars(description = "Maximum number of $ref indirections to expand (default 5)")]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GetOpenapiSpecRequest {
    #[schemars(description = "Section to return: info, paths, components, tags, servers, or full (default full)")]
    pub section: Option<String>,

    #[schemars(description = "Case-insensitive regex narrowing returned path keys (paths/full sections only)")]
    pub path_filter: Option<String>,
}

#[tool_router]
impl SpecExplorerService {
    #[tool(
        description = "Search the API's endpoints by path pattern, HTTP method, tags, or description text. Returns a paginated list of endpoint summaries."
    )]
    pub async fn search_endpoints(
        &self,
        Parameters(request): Parameters<SearchEndpointsRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.explorer.search_endpoints(&request.into()).await {
            Ok(page) => json_content(&page),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Get the full operation object for one endpoint by exact path and method, with path-level and operation-level parameters merged and $refs optionally expanded."
    )]
    pub async fn get_endpoint_details(
        &self,
        Parameters(request): Parameters<GetEndpointDetailsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let resolve_refs = request.resolve_refs.unwrap_or(true);
        match self
            .explorer
            .endpoint_details(&request.path, &request.method, resolve_refs)
            .await
        {
            Ok(details) => json_content(&details),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Search the API's named schemas by name pattern or property name. Returns a paginated list of schema summaries."
    )]
    pub async fn search_schemas(
        &self,
        Parameters(request): Parameters<SearchSchemasRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.explorer.search_schemas(&request.into()).await {
            Ok(page) => json_content(&page),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Get one named schema from components.schemas, with $refs optionally expanded up to maxDepth indirections."
    )]
    pub async fn get_schema_details(
        &self,
        Parameters(request): Parameters<GetSchemaDetailsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let resolve_refs = request.resolve_refs.unwrap_or(true);
        let max_depth = request.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
        match self
            .explorer
            .schema_details(&request.schema_name, resolve_refs, max_depth)
            .await
        {
            Ok(details) => json_content(&details),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Get a raw section of the OpenAPI document (info, paths, components, tags, servers, or full), optionally narrowing paths with a regex filter."
    )]
    pub async fn get_openapi_spec(
        &self,
        Parameters(request): Parameters<GetOpenapiSpecRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .explorer
            .spec_section(request.section.as_deref(), request.path_filter.as_deref())
            .await
        {
            Ok(section) => json_content(&section),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

#[tool_handler]
impl ServerHandler for SpecExplorerService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Query tools over a remote OpenAPI spec. Use 'search_endpoints' and \
                 'search_schemas' to discover operations and models, 'get_endpoint_details' \
                 and 'get_schema_details' for full definitions with $refs expanded, and \
                 'get_openapi_spec' for raw document sections."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

fn json_content<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::new(
            ErrorCode::INTERNAL_ERROR,
            format!("Failed to serialize result: {e}"),
            None,
        )
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

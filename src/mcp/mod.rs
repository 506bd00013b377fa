// src/mcp/mod.rs
// MCP server implementation: unified local-fast reads + official fallback.

use std::sync::Arc;

use rmcp::{
    ErrorData, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParams, CallToolResult, Content, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::EnvConfig;
use crate::handlers::LocalCache;
use crate::reader::LinearLocalReader;
use crate::router;
use crate::session::OfficialSessionManager;
use crate::store::SnapshotCatalog;

/// MCP server state: the reader, the upstream session, and the router that
/// arbitrates between them.
#[derive(Clone)]
pub struct LinearFastServer {
    pub reader: Arc<LinearLocalReader>,
    pub official: Arc<OfficialSessionManager>,
    pub router: Arc<router::ToolRouter>,
    tool_router: ToolRouter<Self>,
}

impl LinearFastServer {
    pub fn new(config: &EnvConfig) -> Self {
        let catalog = SnapshotCatalog::new(&config.cache.db_path);
        let reader = Arc::new(LinearLocalReader::new(
            config.cache.clone(),
            Box::new(catalog),
        ));
        let official = Arc::new(OfficialSessionManager::new(config.official.clone()));
        let local = Arc::new(LocalCache::new(reader.clone()));
        let call_router = Arc::new(router::ToolRouter::new(
            local,
            official.clone(),
            config.coherence_window,
            config.notion_url.clone(),
        ));

        Self {
            reader,
            official,
            router: call_router,
            tool_router: Self::tool_router(),
        }
    }

    /// Route a read tool and serialize the JSON value for the client.
    async fn read<T: Serialize>(&self, tool_name: &str, request: T) -> Result<String, String> {
        let args = serde_json::to_value(request).map_err(|e| e.to_string())?;
        let value = self
            .router
            .call_read(tool_name, args)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string(&value).map_err(|e| e.to_string())
    }

    fn to_json(value: &Value) -> Result<String, String> {
        serde_json::to_string(value).map_err(|e| e.to_string())
    }
}

/// Serialize a routed value into a text tool result; routing errors become
/// error results rather than protocol errors.
fn tool_result(result: Result<String, String>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => Ok(CallToolResult {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: Some(false),
            meta: None,
        }),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
    }
}

// Request types for tools with parameters

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListIssuesRequest {
    #[schemars(description = "Filter by user name or email")]
    pub assignee: Option<String>,
    #[schemars(description = "Filter by team key or name")]
    pub team: Option<String>,
    #[schemars(description = "Filter by state name or type (e.g. 'Todo', 'started'). Case-insensitive.")]
    pub state: Option<String>,
    #[schemars(description = "Filter by exact numeric priority level")]
    pub priority: Option<i64>,
    #[schemars(description = "Filter by project name or ID")]
    pub project: Option<String>,
    #[schemars(description = "Case-insensitive substring search in issue titles")]
    pub query: Option<String>,
    #[schemars(description = "Sort field: 'updatedAt' (default) or 'createdAt'. Descending.")]
    pub order_by: Option<String>,
    #[schemars(description = "Max issues to return (default 50). 0 or negative returns all.")]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetIssueRequest {
    #[schemars(description = "Issue identifier (e.g. 'ENG-123')")]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListProjectsRequest {
    #[schemars(description = "Team name or key to filter by")]
    pub team: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueryRequest {
    #[schemars(description = "Name, key, or identifier to search for")]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListIssueStatusesRequest {
    #[schemars(description = "Team key, name, or ID")]
    pub team: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetIssueStatusRequest {
    #[schemars(description = "Team key, name, or ID")]
    pub team: String,
    #[schemars(description = "Status name to search for. Optional if id is provided.")]
    pub name: Option<String>,
    #[schemars(description = "Status ID to look up. Optional if name is provided.")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCommentsRequest {
    #[schemars(description = "Issue identifier (e.g. 'ENG-123')")]
    pub issue_id: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListIssueLabelsRequest {
    #[schemars(description = "Team key or name to filter by. Returns all labels if omitted.")]
    pub team: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCyclesRequest {
    #[schemars(description = "Team ID or name")]
    pub team_id: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListDocumentsRequest {
    #[schemars(description = "Project ID or name to filter by. Returns all documents if omitted.")]
    pub project: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetDocumentRequest {
    #[schemars(description = "Document identifier")]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ProjectRequest {
    #[schemars(description = "Project name or identifier")]
    pub project: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetMilestoneRequest {
    #[schemars(description = "Project name or identifier")]
    pub project: String,
    #[schemars(description = "Milestone name or ID to match")]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetStatusUpdatesRequest {
    #[schemars(description = "Update type. Local cache only supports 'project'; others fall back to official MCP.")]
    pub r#type: String,
    #[schemars(description = "Specific status update ID")]
    pub id: Option<String>,
    #[schemars(description = "Project name or identifier to filter by")]
    pub project: Option<String>,
    #[schemars(description = "Initiative filter (official MCP only)")]
    pub initiative: Option<String>,
    #[schemars(description = "User name or identifier to filter by")]
    pub user: Option<String>,
    #[schemars(description = "Include archived updates (official MCP only)")]
    pub include_archived: Option<bool>,
    #[schemars(description = "Sort by 'createdAt' (default) or 'updatedAt'. Descending.")]
    pub order_by: Option<String>,
    #[schemars(description = "Max results (default 50). 0 returns all.")]
    pub limit: Option<i64>,
    #[schemars(description = "Pagination cursor (official MCP only)")]
    pub cursor: Option<String>,
    #[schemars(description = "Filter by creation date (official MCP only)")]
    pub created_at: Option<String>,
    #[schemars(description = "Filter by update date (official MCP only)")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct OfficialCallToolRequest {
    #[schemars(description = "Official tool name")]
    pub name: String,
    #[schemars(description = "Tool arguments as a JSON object")]
    pub args: Option<Value>,
}

#[tool_router]
impl LinearFastServer {
    #[tool(description = "List issues with optional filtering and sorting.")]
    async fn list_issues(
        &self,
        Parameters(req): Parameters<ListIssuesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_issues", req).await)
    }

    #[tool(description = "Retrieve full details of a specific issue by identifier.")]
    async fn get_issue(
        &self,
        Parameters(req): Parameters<GetIssueRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_issue", req).await)
    }

    #[tool(description = "Retrieve all teams from the workspace, sorted by key.")]
    async fn list_teams(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_teams", serde_json::json!({})).await)
    }

    #[tool(description = "Retrieve projects, optionally filtered by team, sorted by name.")]
    async fn list_projects(
        &self,
        Parameters(req): Parameters<ListProjectsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_projects", req).await)
    }

    #[tool(description = "Retrieve a team by name or key, with issue counts by state.")]
    async fn get_team(
        &self,
        Parameters(req): Parameters<QueryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_team", req).await)
    }

    #[tool(description = "Retrieve a project by name or slug ID, with issue counts by state.")]
    async fn get_project(
        &self,
        Parameters(req): Parameters<QueryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_project", req).await)
    }

    #[tool(description = "List all workspace users with assigned issue counts.")]
    async fn list_users(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_users", serde_json::json!({})).await)
    }

    #[tool(description = "Retrieve a user by name or email, with issue counts by state.")]
    async fn get_user(
        &self,
        Parameters(req): Parameters<QueryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_user", req).await)
    }

    #[tool(description = "List all issue statuses (workflow states) for a team.")]
    async fn list_issue_statuses(
        &self,
        Parameters(req): Parameters<ListIssueStatusesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_issue_statuses", req).await)
    }

    #[tool(description = "Get a single issue status by name or ID within a team.")]
    async fn get_issue_status(
        &self,
        Parameters(req): Parameters<GetIssueStatusRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_issue_status", req).await)
    }

    #[tool(description = "List all comments for a specific issue, oldest first.")]
    async fn list_comments(
        &self,
        Parameters(req): Parameters<ListCommentsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_comments", req).await)
    }

    #[tool(description = "List all issue labels, optionally filtered by team, sorted by name.")]
    async fn list_issue_labels(
        &self,
        Parameters(req): Parameters<ListIssueLabelsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_issue_labels", req).await)
    }

    #[tool(description = "Retrieve all initiatives sorted alphabetically by name.")]
    async fn list_initiatives(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_initiatives", serde_json::json!({})).await)
    }

    #[tool(description = "Retrieve a single initiative by name or identifier.")]
    async fn get_initiative(
        &self,
        Parameters(req): Parameters<QueryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_initiative", req).await)
    }

    #[tool(description = "Retrieve cycles for a team, newest first.")]
    async fn list_cycles(
        &self,
        Parameters(req): Parameters<ListCyclesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_cycles", req).await)
    }

    #[tool(description = "Retrieve documents, optionally filtered by project, newest first.")]
    async fn list_documents(
        &self,
        Parameters(req): Parameters<ListDocumentsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_documents", req).await)
    }

    #[tool(description = "Retrieve a document by ID.")]
    async fn get_document(
        &self,
        Parameters(req): Parameters<GetDocumentRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_document", req).await)
    }

    #[tool(description = "List all milestones for a project in sort order.")]
    async fn list_milestones(
        &self,
        Parameters(req): Parameters<ProjectRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_milestones", req).await)
    }

    #[tool(description = "Retrieve a specific milestone in a project by name or ID.")]
    async fn get_milestone(
        &self,
        Parameters(req): Parameters<GetMilestoneRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_milestone", req).await)
    }

    #[tool(
        description = "Retrieve status updates with filtering. Local cache supports type='project' only; other filters fall back to official MCP."
    )]
    async fn get_status_updates(
        &self,
        Parameters(req): Parameters<GetStatusUpdatesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("get_status_updates", req).await)
    }

    #[tool(description = "List all status updates for a project, newest first.")]
    async fn list_project_updates(
        &self,
        Parameters(req): Parameters<ProjectRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(self.read("list_project_updates", req).await)
    }

    #[tool(
        description = "Call any official Linear MCP tool by name. Use this for write operations and official-only tools."
    )]
    async fn official_call_tool(
        &self,
        Parameters(req): Parameters<OfficialCallToolRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = req.args.unwrap_or_else(|| serde_json::json!({}));
        let result = match self.router.call_official(&req.name, args).await {
            Ok(value) => Self::to_json(&value),
            Err(e) => Err(e.to_string()),
        };
        tool_result(result)
    }

    #[tool(description = "List tool names currently available from official Linear MCP.")]
    async fn list_official_tools(&self) -> Result<CallToolResult, ErrorData> {
        let result = match self.router.list_official_tools().await {
            Ok(tools) => Self::to_json(&serde_json::json!(tools)),
            Err(e) => Err(e.to_string()),
        };
        tool_result(result)
    }

    #[tool(
        description = "Force re-authentication of the official Linear MCP OAuth token. Clears cached tokens and disconnects; the next call triggers a fresh login flow."
    )]
    async fn reauth_official(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(Self::to_json(&self.router.reauth_official().await))
    }

    #[tool(
        description = "Clear Notion MCP OAuth token cache for re-authentication. Override URL via NOTION_OFFICIAL_MCP_URL."
    )]
    async fn reauth_notion(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(Self::to_json(&self.router.reauth_notion()))
    }

    #[tool(description = "Clear OAuth tokens for both Linear and Notion MCP servers.")]
    async fn reauth_all(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(Self::to_json(&self.router.reauth_all().await))
    }

    #[tool(description = "Force reload of local cache and return health state.")]
    async fn refresh_cache(&self) -> Result<CallToolResult, ErrorData> {
        let result = match self.router.refresh_local_cache().await {
            Ok(health) => Self::to_json(&health),
            Err(e) => Err(e),
        };
        tool_result(result)
    }

    #[tool(description = "Return local+official health and coherence-window state.")]
    async fn get_cache_health(&self) -> Result<CallToolResult, ErrorData> {
        tool_result(Self::to_json(&self.router.get_health()))
    }
}

impl ServerHandler for LinearFastServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "linear-fast".into(),
                title: Some("Linear Fast (Local + Official)".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Unified Linear server. Read operations are served from the local \
                 Linear.app cache first for speed, and automatically fall back to \
                 official Linear MCP when the local cache is unsupported, degraded, \
                 or stale-sensitive. Write operations use official Linear MCP."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let tool_name = request.name.to_string();
            let start = std::time::Instant::now();

            let ctx = ToolCallContext::new(self, request, context);
            let result = self.tool_router.call(ctx).await;

            debug!(
                tool = %tool_name,
                duration_ms = start.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "Tool call finished"
            );

            result
        }
    }
}

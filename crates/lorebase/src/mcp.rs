//! MCP tool surface.
//!
//! Exposes retrieval and visibility tools over the MCP JSON-RPC protocol.
//! User identity arrives as an opaque string: the HTTP transport extracts
//! it from the `X-User-Name` header, the stdio transport passes it through
//! the optional `user` argument.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::{json, Value};

use lorebase_core::{Error, LogicalPath};

use crate::services::Services;

/// Bridges the search engine and state store to MCP clients.
///
/// Every session shares the same services behind `Arc`.
#[derive(Clone)]
pub struct McpSurface {
    services: Arc<Services>,
    /// Identity applied when a call carries no `user` argument.
    default_user: Option<String>,
}

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    schema: Value,
    read_only: bool,
}

fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "search",
            description: "Search indexed documents with hybrid semantic + keyword retrieval.",
            schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query text"},
                    "limit": {"type": "integer", "description": "Maximum results (<= 100)"},
                    "include_folders": {"type": "array", "items": {"type": "string"}},
                    "exclude_folders": {"type": "array", "items": {"type": "string"}},
                    "user": {"type": "string", "description": "Caller identity"}
                },
                "required": ["query"]
            }),
            read_only: true,
        },
        ToolSpec {
            name: "list_indexed_folders",
            description: "List folders with index status, file and chunk counts.",
            schema: json!({"type": "object", "properties": {}}),
            read_only: true,
        },
        ToolSpec {
            name: "get_file",
            description: "Full text of an indexed file, chunks merged in order.",
            schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"}
                },
                "required": ["file_path"]
            }),
            read_only: true,
        },
        ToolSpec {
            name: "get_chunk_range",
            description: "Merged text of a chunk range of an indexed file (max 20 chunks).",
            schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "first_chunk": {"type": "integer"},
                    "last_chunk": {"type": "integer"}
                },
                "required": ["file_path", "first_chunk", "last_chunk"]
            }),
            read_only: true,
        },
        ToolSpec {
            name: "get_file_uri",
            description: "Issue an ephemeral download URI for an indexed file.",
            schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"}
                },
                "required": ["file_path"]
            }),
            read_only: true,
        },
        ToolSpec {
            name: "set_folder_active",
            description: "Toggle a folder's search visibility for the calling user.",
            schema: json!({
                "type": "object",
                "properties": {
                    "folder_path": {"type": "string"},
                    "active": {"type": "boolean"},
                    "user": {"type": "string"}
                },
                "required": ["folder_path", "active"]
            }),
            read_only: false,
        },
        ToolSpec {
            name: "get_folder_active_states",
            description: "The calling user's folder visibility map.",
            schema: json!({
                "type": "object",
                "properties": {
                    "user": {"type": "string"}
                }
            }),
            read_only: true,
        },
    ]
}

fn to_mcp_tool(spec: &ToolSpec) -> Tool {
    let input_schema = match &spec.schema {
        Value::Object(map) => Arc::new(map.clone()),
        _ => Arc::new(serde_json::Map::new()),
    };
    Tool {
        name: Cow::Borrowed(spec.name),
        title: None,
        description: Some(Cow::Borrowed(spec.description)),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(spec.read_only)),
        icons: None,
        meta: None,
    }
}

fn arg_str(args: &Value, key: &str) -> Result<String, McpError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            McpError::new(
                ErrorCode::INVALID_PARAMS,
                format!("missing required argument: {key}"),
                None,
            )
        })
}

impl McpSurface {
    pub fn new(services: Arc<Services>, default_user: Option<String>) -> Self {
        Self {
            services,
            default_user,
        }
    }

    fn user_from(&self, args: &Value) -> Option<String> {
        args.get("user")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| self.default_user.clone())
    }

    async fn dispatch(&self, name: &str, args: &Value) -> Result<Value, Error> {
        match name {
            "search" => {
                let request = lorebase_search::SearchRequest {
                    query: args.get("query").and_then(Value::as_str).unwrap_or("").to_string(),
                    limit: args
                        .get("limit")
                        .and_then(Value::as_u64)
                        .map(|l| l as usize),
                    include_folders: parse_path_list(args.get("include_folders"))?,
                    exclude_folders: parse_path_list(args.get("exclude_folders"))?.unwrap_or_default(),
                    user: self.user_from(args),
                    with_context: false,
                };
                let hits = self.services.search.search(&request).await?;
                Ok(serde_json::to_value(hits)?)
            }
            "list_indexed_folders" => {
                let folders = self.services.search.list_indexed_folders().await?;
                Ok(serde_json::to_value(folders)?)
            }
            "get_file" => {
                let path = LogicalPath::parse(
                    args.get("file_path").and_then(Value::as_str).unwrap_or(""),
                )?;
                let content = self.services.search.get_file(&path).await?;
                Ok(serde_json::to_value(content)?)
            }
            "get_chunk_range" => {
                let path = LogicalPath::parse(
                    args.get("file_path").and_then(Value::as_str).unwrap_or(""),
                )?;
                let first = args.get("first_chunk").and_then(Value::as_u64).unwrap_or(0) as u32;
                let last = args.get("last_chunk").and_then(Value::as_u64).unwrap_or(0) as u32;
                let range = self.services.search.get_chunk_range(&path, first, last).await?;
                Ok(serde_json::to_value(range)?)
            }
            "get_file_uri" => {
                let path = LogicalPath::parse(
                    args.get("file_path").and_then(Value::as_str).unwrap_or(""),
                )?;
                // Only indexed files get download tokens.
                self.services
                    .state
                    .get_file(&path)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("file '{path}' is not indexed")))?;
                Ok(json!({ "uri": self.services.uris.issue(&path) }))
            }
            "set_folder_active" => {
                let user = self
                    .user_from(args)
                    .ok_or_else(|| Error::PermissionDenied("user identity required".into()))?;
                let path = LogicalPath::parse(
                    args.get("folder_path").and_then(Value::as_str).unwrap_or(""),
                )?;
                let active = args.get("active").and_then(Value::as_bool).unwrap_or(true);
                self.services.state.set_visibility(&user, &path, active).await?;
                Ok(json!({ "folder_path": path.as_str(), "active": active }))
            }
            "get_folder_active_states" => {
                let user = self
                    .user_from(args)
                    .ok_or_else(|| Error::PermissionDenied("user identity required".into()))?;
                let map = self.services.state.visibility_map(&user).await?;
                Ok(serde_json::to_value(map)?)
            }
            other => Err(Error::NotFound(format!("no tool named '{other}'"))),
        }
    }
}

fn parse_path_list(value: Option<&Value>) -> Result<Option<Vec<LogicalPath>>, Error> {
    match value.and_then(Value::as_array) {
        Some(list) => {
            let mut out = Vec::with_capacity(list.len());
            for item in list {
                let raw = item
                    .as_str()
                    .ok_or_else(|| Error::InvalidPath("folder list items must be strings".into()))?;
                out.push(LogicalPath::parse(raw)?);
            }
            Ok(Some(out))
        }
        None => Ok(None),
    }
}

impl McpSurface {
    fn get_tool(&self, name: &str) -> Option<Tool> {
        tool_specs().iter().find(|t| t.name == name).map(to_mcp_tool)
    }
}

impl ServerHandler for McpSurface {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "lorebase".to_string(),
                title: Some("Lorebase".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Lorebase — self-hosted knowledge base with hybrid search. \
                 Use search to find relevant chunks, get_file / get_chunk_range to read \
                 indexed content, and list_indexed_folders to see what is searchable."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = tool_specs().iter().map(to_mcp_tool).collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if !tool_specs().iter().any(|t| t.name == request.name) {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            ));
        }

        let args = request
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        // Surface missing required string args as INVALID_PARAMS before the
        // dispatcher turns them into domain errors.
        if request.name == "search" {
            arg_str(&args, "query")?;
        }

        match self.dispatch(&request.name, &args).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_has_an_object_schema() {
        for spec in tool_specs() {
            assert!(spec.schema.is_object(), "{} schema", spec.name);
            let tool = to_mcp_tool(&spec);
            assert!(tool.description.is_some());
        }
    }

    #[test]
    fn surface_exposes_the_seven_tools() {
        let names: Vec<&str> = tool_specs().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "search",
                "list_indexed_folders",
                "get_file",
                "get_chunk_range",
                "get_file_uri",
                "set_folder_active",
                "get_folder_active_states",
            ]
        );
    }

    #[test]
    fn path_list_parsing() {
        let value = json!(["docs", "notes/sub"]);
        let parsed = parse_path_list(Some(&value)).unwrap().unwrap();
        assert_eq!(parsed.len(), 2);

        let bad = json!(["../escape"]);
        assert!(parse_path_list(Some(&bad)).is_err());

        assert!(parse_path_list(None).unwrap().is_none());
    }
}

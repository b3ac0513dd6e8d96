//! MCP server core
//!
//! Routes JSON-RPC requests to the nine published tools. All tools are
//! bound to the agent scope the engine was initialized with.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;

pub struct McpServer {
    engine: Engine,
    initialized: bool,
}

impl McpServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            initialized: false,
        }
    }

    /// Handle one JSON-RPC request; `None` for notifications.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("Rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's protocol version when it is older than ours;
        // clients reject servers that answer with a newer one
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!(
            "MCP session initialized (protocol {}, agent {})",
            negotiated, self.engine.agent_id
        );

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "mnema".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: None,
                prompts: None,
            },
            instructions: Some(
                "mnema is your persistent memory. Use remember to store important facts, \
                 recall to search past knowledge, and boot at session start to load your \
                 identity. Memories decay naturally over time unless recalled; reflect runs \
                 the maintenance cycle. Use forget when the user says something was wrong."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "remember".to_string(),
                description: Some(
                    "Store a memory. Every write passes the admission guard, which \
                     deduplicates, updates URI-anchored memories in place, merges \
                     near-duplicates, and rejects noise."
                        .to_string(),
                ),
                input_schema: tools::remember::schema(),
            },
            ToolDescription {
                name: "recall".to_string(),
                description: Some(
                    "Search memories with hybrid BM25 + semantic retrieval and \
                     intent-aware ranking. Recalled memories are strengthened and decay \
                     slower afterwards."
                        .to_string(),
                ),
                input_schema: tools::recall::schema(),
            },
            ToolDescription {
                name: "recall_path".to_string(),
                description: Some(
                    "Fetch a memory by its stable URI (exact or prefix), optionally with \
                     linked neighbors."
                        .to_string(),
                ),
                input_schema: tools::recall_path::schema(),
            },
            ToolDescription {
                name: "boot".to_string(),
                description: Some(
                    "Load the identity working set at session start: all identity \
                     memories plus pinned core URIs."
                        .to_string(),
                ),
                input_schema: tools::boot::schema(),
            },
            ToolDescription {
                name: "forget".to_string(),
                description: Some(
                    "Forget a memory: soft (vitality fades) or hard (delete with a \
                     tombstone snapshot)."
                        .to_string(),
                ),
                input_schema: tools::forget::schema(),
            },
            ToolDescription {
                name: "link".to_string(),
                description: Some(
                    "Manage typed associations between memories: create, query, or \
                     traverse up to N hops."
                        .to_string(),
                ),
                input_schema: tools::link::schema(),
            },
            ToolDescription {
                name: "snapshot".to_string(),
                description: Some(
                    "List a memory's history or roll it back to an earlier snapshot."
                        .to_string(),
                ),
                input_schema: tools::snapshot::schema(),
            },
            ToolDescription {
                name: "reflect".to_string(),
                description: Some(
                    "Run sleep-cycle maintenance: decay (forgetting curve), tidy \
                     (archive collapsed events), govern (integrity sweep), all, reindex, \
                     or embed (backfill vectors)."
                        .to_string(),
                ),
                input_schema: tools::reflect::schema(),
            },
            ToolDescription {
                name: "status".to_string(),
                description: Some(
                    "Memory counts by type and priority, path/link/snapshot totals, and \
                     provider configuration."
                        .to_string(),
                ),
                input_schema: tools::status::schema(),
            },
        ];

        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let engine = &self.engine;
        let outcome = match request.name.as_str() {
            "remember" => tools::remember::execute(engine, request.arguments).await,
            "recall" => tools::recall::execute(engine, request.arguments).await,
            "recall_path" => tools::recall_path::execute(engine, request.arguments).await,
            "boot" => tools::boot::execute(engine, request.arguments).await,
            "forget" => tools::forget::execute(engine, request.arguments).await,
            "link" => tools::link::execute(engine, request.arguments).await,
            "snapshot" => tools::snapshot::execute(engine, request.arguments).await,
            "reflect" => tools::reflect::execute(engine, request.arguments).await,
            "status" => tools::status::execute(engine, request.arguments).await,
            unknown => Err(format!("Unknown tool '{}'", unknown)),
        };

        let result = match outcome {
            Ok(value) => CallToolResult::from_value(&value),
            Err(message) => CallToolResult::from_error(&message),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

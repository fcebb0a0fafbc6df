//! MCP protocol engine.
//!
//! The engine owns request semantics (lifecycle, tool listing, tool calls).
//! Transports hand it parsed JSON-RPC messages and serialize whatever it
//! returns; the tool surface is injected as a [`ToolHandlers`] object.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{McpError, Result};
use crate::protocol::{
    methods, CallToolParams, Implementation, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ToolDefinition, ToolResult, ToolsCapability, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Server name reported during initialization.
pub const SERVER_NAME: &str = "tiddlywiki-mcp";

/// The two handlers the engine delegates tool requests to.
#[async_trait]
pub trait ToolHandlers: Send + Sync {
    /// Definitions of the active tools, in registration order.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Run a tool. `Err(McpError::UnknownTool)` for names that are not
    /// registered; tool-level failures are `Ok` results with `isError` set.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult>;
}

/// Answers JSON-RPC messages for one or more sessions.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Answer one request. Failures are JSON-RPC error responses.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse;

    /// Consume one notification.
    async fn handle_notification(&self, notification: JsonRpcNotification);
}

/// Pick the protocol version to answer an `initialize` with.
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// MCP engine serving the tools of a [`ToolHandlers`] implementation.
pub struct McpEngine {
    info: Implementation,
    instructions: Option<String>,
    tools: Arc<dyn ToolHandlers>,
}

impl McpEngine {
    /// Engine reporting [`SERVER_NAME`] and the crate version.
    pub fn new(tools: Arc<dyn ToolHandlers>) -> Self {
        Self {
            info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
            tools,
        }
    }

    /// Instructions returned to clients on initialize.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Name and version sent in the `initialize` result.
    pub fn server_info(&self) -> &Implementation {
        &self.info
    }

    fn initialize(&self, params: InitializeParams) -> InitializeResult {
        let version = negotiate_protocol_version(&params.protocol_version);
        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = version,
            "Client initializing"
        );

        InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        }
    }

    async fn call_tool(&self, params: CallToolParams) -> std::result::Result<Value, JsonRpcError> {
        tracing::debug!(tool = %params.name, "tools/call");

        match self.tools.call_tool(&params.name, params.arguments).await {
            Ok(result) => to_result_value(&result),
            Err(McpError::UnknownTool(name)) => {
                tracing::warn!(tool = %name, "Call to unknown tool");
                Err(JsonRpcError::invalid_params(format!("Unknown tool: {}", name)))
            }
            Err(e) => {
                tracing::error!(tool = %params.name, error = %e, "Tool call failed");
                Err(JsonRpcError::internal_error(e.to_string()))
            }
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let params: InitializeParams = parse_params(request.params)?;
                to_result_value(&self.initialize(params))
            }
            methods::PING => Ok(Value::Object(Default::default())),
            methods::TOOLS_LIST => to_result_value(&ListToolsResult {
                tools: self.tools.list_tools(),
            }),
            methods::TOOLS_CALL => {
                let params: CallToolParams = parse_params(request.params)?;
                self.call_tool(params).await
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_result_value<T: serde::Serialize>(value: &T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[async_trait]
impl ProtocolEngine for McpEngine {
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(error) => JsonRpcResponse::error(Some(id), error),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::INITIALIZED => tracing::debug!("Client initialized"),
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }
}

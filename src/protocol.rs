//! MCP protocol types based on JSON-RPC 2.0.
//!
//! Only the subset the tiddler gateway speaks is modelled: lifecycle
//! (`initialize`, `ping`) and tools (`tools/list`, `tools/call`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The JSON-RPC version. MUST be "2.0".
pub const JSONRPC_VERSION: &str = "2.0";

/// The latest supported MCP protocol version.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// All supported MCP protocol versions (newest first).
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Method names handled by the engine.
pub mod methods {
    /// Session handshake; the only request accepted without a session
    pub const INITIALIZE: &str = "initialize";
    /// Liveness check
    pub const PING: &str = "ping";
    /// List the registered tools
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool by name
    pub const TOOLS_CALL: &str = "tools/call";
    /// Client notification that the handshake is complete
    pub const INITIALIZED: &str = "notifications/initialized";
}

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Body is not valid JSON
    ParseError = -32700,
    /// Not a valid JSON-RPC message, or not allowed in this session state
    InvalidRequest = -32600,
    /// Unknown method
    MethodNotFound = -32601,
    /// Bad method parameters, including unknown tool names
    InvalidParams = -32602,
    /// Failure inside the server
    InternalError = -32603,
}

impl ErrorCode {
    /// Numeric code as sent on the wire.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// See [`ErrorCode`]
    pub code: i32,
    /// Human-readable description
    pub message: String,
    /// Optional extra detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Error with a standard code and no data.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// `-32700`
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// `-32600`
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// `-32601` naming the method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    /// `-32602`
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// `-32603`
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Request ID: a string or a number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String id
    String(String),
    /// Numeric id
    Number(i64),
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        RequestId::Number(i64::from(n))
    }
}

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always [`JSONRPC_VERSION`]
    pub jsonrpc: String,
    /// Echoed in the response
    pub id: RequestId,
    /// Method name, see [`methods`]
    pub method: String,
    /// Method parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Request without params.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Set the params.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC 2.0 notification (no id, no response)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always [`JSONRPC_VERSION`]
    pub jsonrpc: String,
    /// Notification name
    pub method: String,
    /// Notification parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response (success)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResultResponse {
    /// Always [`JSONRPC_VERSION`]
    pub jsonrpc: String,
    /// Id of the request being answered
    pub id: RequestId,
    /// Method result
    pub result: Value,
}

/// JSON-RPC 2.0 response (error)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    /// Always [`JSONRPC_VERSION`]
    pub jsonrpc: String,
    /// Id of the request being answered; `null` when it could not be read
    pub id: Option<RequestId>,
    /// What went wrong
    pub error: JsonRpcError,
}

/// JSON-RPC 2.0 response (either success or error)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponse {
    /// Success
    Result(JsonRpcResultResponse),
    /// Failure
    Error(JsonRpcErrorResponse),
}

impl JsonRpcResponse {
    /// Success response.
    pub fn result(id: RequestId, result: Value) -> Self {
        Self::Result(JsonRpcResultResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }

    /// Error response.
    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self::Error(JsonRpcErrorResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        })
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcResponse::Error(_))
    }
}

/// One incoming JSON-RPC message, classified by shape.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Has a method and an id; expects a response
    Request(JsonRpcRequest),
    /// Has a method but no id
    Notification(JsonRpcNotification),
    /// A response or result sent by the client; accepted and ignored
    Response,
}

impl IncomingMessage {
    /// Classify a raw JSON value.
    pub fn from_value(value: Value) -> Result<Self, JsonRpcError> {
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some_and(|id| !id.is_null());

        let message = match (has_method, has_id) {
            (true, true) => IncomingMessage::Request(
                serde_json::from_value(value)
                    .map_err(|e| JsonRpcError::invalid_request(format!("Invalid request: {}", e)))?,
            ),
            (true, false) => IncomingMessage::Notification(
                serde_json::from_value(value).map_err(|e| {
                    JsonRpcError::invalid_request(format!("Invalid notification: {}", e))
                })?,
            ),
            (false, _) if value.get("result").is_some() || value.get("error").is_some() => {
                IncomingMessage::Response
            }
            _ => {
                return Err(JsonRpcError::invalid_request(
                    "Message is neither a request, notification nor response",
                ))
            }
        };

        if let IncomingMessage::Request(req) = &message {
            if req.jsonrpc != JSONRPC_VERSION {
                return Err(JsonRpcError::invalid_request(format!(
                    "Invalid JSON-RPC version: expected '{}', got '{}'",
                    JSONRPC_VERSION, req.jsonrpc
                )));
            }
        }

        Ok(message)
    }

    /// Whether this is an `initialize` request.
    pub fn is_initialize(&self) -> bool {
        matches!(self, IncomingMessage::Request(req) if req.method == methods::INITIALIZE)
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Params of `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Version the client would like to speak
    pub protocol_version: String,
    /// Client capabilities (not inspected)
    #[serde(default)]
    pub capabilities: Value,
    /// Client name and version
    pub client_info: Implementation,
}

/// Name and version of a client or server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Implementation {
    /// Program name
    pub name: String,
    /// Program version
    pub version: String,
}

/// Result of `initialize`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version
    pub protocol_version: String,
    /// What the server offers
    pub capabilities: ServerCapabilities,
    /// Server name and version
    pub server_info: Implementation,
    /// Usage hints for the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Capabilities advertised by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Present when the server has tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Tool capability flags.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Always false: the tool set is fixed for the server's lifetime
    pub list_changed: bool,
}

// =============================================================================
// Tools
// =============================================================================

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ListToolsResult {
    /// Registered tools in registration order
    pub tools: Vec<ToolDefinition>,
}

/// Tool definition as returned by tools/list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// What the tool does, written for the model
    pub description: String,
    /// JSON Schema of the arguments object
    pub input_schema: Value,
    /// JSON Schema of `structuredContent`, when the tool returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Behaviour hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

/// Behaviour hints for clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// The tool does not modify the wiki
    pub read_only_hint: bool,
    /// The tool may remove data
    pub destructive_hint: bool,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    /// Tool to invoke
    pub name: String,
    /// Tool arguments; `null` when omitted
    #[serde(default)]
    pub arguments: Value,
}

/// Content block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
}

impl Content {
    /// The block's text.
    pub fn as_text(&self) -> &str {
        match self {
            Content::Text { text } => text,
        }
    }
}

/// Result of a tool invocation.
///
/// A result with `is_error` set is still a successful protocol response;
/// the failure is reported inside the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Content blocks shown to the model
    pub content: Vec<Content>,
    /// Set when the tool failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Machine-readable result matching the tool's output schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolResult {
    /// Single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: None,
            structured_content: None,
        }
    }

    /// Single text block flagged as an error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text {
                text: message.into(),
            }],
            is_error: Some(true),
            structured_content: None,
        }
    }

    /// Pretty-printed JSON text block.
    pub fn json(value: &Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_default())
    }

    /// JSON text block plus `structuredContent`, for tools that declare an
    /// output schema.
    pub fn structured(value: Value) -> Self {
        let mut result = Self::json(&value);
        result.structured_content = Some(value);
        result
    }

    /// Whether the tool reported a failure.
    pub fn is_error(&self) -> bool {
        self.is_error == Some(true)
    }

    /// Text of the first content block.
    pub fn first_text(&self) -> &str {
        self.content.first().map(Content::as_text).unwrap_or("")
    }
}

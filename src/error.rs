//! Error types for the gateway.

use thiserror::Error;

/// Errors raised by the gateway, the tool registry and the tiddler store.
///
/// Tool-level failures never leave the dispatch boundary as an `McpError`;
/// they are folded into a [`ToolResult`](crate::ToolResult) with `isError`
/// set. `UnknownTool` is the one dispatch error that propagates.
#[derive(Debug, Error)]
pub enum McpError {
    /// Tool name is not registered (or excluded by read-only mode)
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed validation
    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArg {
        /// Tool being called
        tool: String,
        /// What was wrong with the arguments
        reason: String,
    },

    /// A request referenced a session id that is not tracked
    #[error("No transport found for session: {0}")]
    SessionNotFound(String),

    /// Host request could not be turned into a standard request
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Transport or host I/O failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Filter expression could not be parsed or evaluated
    #[error("Filter error: {0}")]
    Filter(String),

    /// The tiddler store rejected an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration value
    #[error("Invalid configuration for {key}: {reason}")]
    Config {
        /// Setting name
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// File or socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal state
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, McpError>;

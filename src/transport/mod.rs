//! Session transports.
//!
//! A transport owns one protocol session. It consumes requests in the
//! standard `http` request form and produces standard responses; the
//! [`adapter`] module converts between that form and the host server's
//! request/response objects.

pub mod adapter;
pub mod host;
pub mod streamable;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};

use crate::error::Result;

pub use streamable::StreamableHttpTransport;

/// Header carrying the session identifier.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header carrying the negotiated protocol version.
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Request with an absolute URL and a fully buffered body.
pub type StandardRequest = axum::http::Request<Bytes>;

/// Response whose body may be streamed.
pub type StandardResponse = axum::http::Response<Body>;

/// Produces fresh session identifiers.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Random UUID v4 session identifiers.
pub fn uuid_generator() -> IdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

/// One protocol session's transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifier assigned during initialization, if any yet.
    fn session_id(&self) -> Option<String>;

    /// Handle one request addressed to this session. Protocol failures are
    /// HTTP responses; `Err` means the transport itself failed.
    async fn handle_request(&self, request: StandardRequest) -> Result<StandardResponse>;

    /// Release the session. Later requests fail with a transport error.
    async fn close(&self) -> Result<()>;
}

//! Streamable HTTP transport for a single MCP session.
//!
//! Requests are JSON-RPC messages POSTed as `application/json`. The first
//! accepted request must be `initialize`; it assigns the session id, which
//! the client then sends back in the `mcp-session-id` header. Responses are
//! plain JSON, or an SSE stream of `message` events when the client accepts
//! `text/event-stream`.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::sse::Event;
use axum::response::{IntoResponse, Response, Sse};
use futures::StreamExt;

use crate::engine::ProtocolEngine;
use crate::error::{McpError, Result};
use crate::protocol::{IncomingMessage, JsonRpcError, JsonRpcResponse, SUPPORTED_PROTOCOL_VERSIONS};
use crate::transport::{
    IdGenerator, StandardRequest, StandardResponse, Transport, MCP_PROTOCOL_VERSION_HEADER,
    MCP_SESSION_ID_HEADER,
};

/// SSE event type for JSON-RPC messages
const SSE_MESSAGE_EVENT: &str = "message";

/// Transport for one session, connected to a protocol engine.
pub struct StreamableHttpTransport {
    id_generator: IdGenerator,
    session_id: OnceLock<String>,
    engine: OnceLock<Arc<dyn ProtocolEngine>>,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    /// Unconnected transport; the session id is drawn from `id_generator`
    /// on `initialize`.
    pub fn new(id_generator: IdGenerator) -> Self {
        Self {
            id_generator,
            session_id: OnceLock::new(),
            engine: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the engine that answers this session's requests.
    pub fn connect(&self, engine: Arc<dyn ProtocolEngine>) -> Result<()> {
        self.engine
            .set(engine)
            .map_err(|_| McpError::Transport("transport is already connected".to_string()))
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn engine(&self) -> Result<Arc<dyn ProtocolEngine>> {
        self.engine
            .get()
            .cloned()
            .ok_or_else(|| McpError::Transport("transport is not connected".to_string()))
    }

    /// Check the session header of a non-initialize request.
    fn validate_session(&self, headers: &HeaderMap) -> Option<StandardResponse> {
        let Some(expected) = self.session_id.get() else {
            return Some(rejection(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request("Bad Request: Server not initialized"),
            ));
        };

        match headers.get(MCP_SESSION_ID_HEADER).and_then(|v| v.to_str().ok()) {
            None => Some(rejection(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request("Bad Request: Mcp-Session-Id header is required"),
            )),
            Some(id) if id != expected => Some(rejection(
                StatusCode::NOT_FOUND,
                JsonRpcError::invalid_request("Session not found"),
            )),
            Some(_) => None,
        }
    }

    fn validate_protocol_version(headers: &HeaderMap) -> Option<StandardResponse> {
        let version = headers
            .get(MCP_PROTOCOL_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())?;
        if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
            return None;
        }
        Some(rejection(
            StatusCode::BAD_REQUEST,
            JsonRpcError::invalid_request(format!(
                "Bad Request: Unsupported protocol version: {} (supported versions: {})",
                version,
                SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            )),
        ))
    }

    async fn handle_post(&self, request: StandardRequest) -> Result<StandardResponse> {
        let (parts, body) = request.into_parts();

        if !is_json_content(&parts.headers) {
            return Ok(rejection(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                JsonRpcError::invalid_request(
                    "Unsupported Media Type: Content-Type must be application/json",
                ),
            ));
        }

        let raw: serde_json::Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return Ok(rejection(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::parse_error(format!("Parse error: {}", e)),
                ))
            }
        };

        let (values, is_batch) = match raw {
            serde_json::Value::Array(items) => (items, true),
            single => (vec![single], false),
        };
        if values.is_empty() {
            return Ok(rejection(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request("Invalid Request: empty batch"),
            ));
        }

        let messages = match values
            .into_iter()
            .map(IncomingMessage::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()
        {
            Ok(messages) => messages,
            Err(error) => return Ok(rejection(StatusCode::BAD_REQUEST, error)),
        };

        if messages.iter().any(IncomingMessage::is_initialize) {
            if self.session_id.get().is_some() {
                return Ok(rejection(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::invalid_request("Invalid Request: Server already initialized"),
                ));
            }
            if messages.len() > 1 {
                return Ok(rejection(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::invalid_request(
                        "Invalid Request: Only one initialization request is allowed",
                    ),
                ));
            }

            let id = (self.id_generator)();
            self.session_id
                .set(id.clone())
                .map_err(|_| McpError::Transport("session id already assigned".to_string()))?;
            tracing::debug!(session_id = %id, "Session initialized");
        } else {
            if let Some(rejected) = self.validate_session(&parts.headers) {
                return Ok(rejected);
            }
            if let Some(rejected) = Self::validate_protocol_version(&parts.headers) {
                return Ok(rejected);
            }
        }

        let engine = self.engine()?;
        let mut requests = Vec::new();
        for message in messages {
            match message {
                IncomingMessage::Request(request) => requests.push(request),
                IncomingMessage::Notification(notification) => {
                    engine.handle_notification(notification).await
                }
                IncomingMessage::Response => {}
            }
        }

        if requests.is_empty() {
            return Ok(StatusCode::ACCEPTED.into_response());
        }

        let mut response = if accepts_event_stream(&parts.headers) {
            // Responses are produced as the client reads the stream
            let events = futures::stream::iter(requests).then(move |request| {
                let engine = engine.clone();
                async move {
                    let response = engine.handle_request(request).await;
                    Ok::<_, Infallible>(sse_event(&response))
                }
            });
            Sse::new(events).into_response()
        } else {
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                responses.push(engine.handle_request(request).await);
            }
            let body = if is_batch {
                serde_json::to_vec(&responses)?
            } else {
                serde_json::to_vec(&responses[0])?
            };
            json_response(StatusCode::OK, body)
        };

        if let Some(id) = self.session_id.get() {
            let value = HeaderValue::from_str(id).map_err(|e| {
                McpError::Transport(format!("session id is not a valid header value: {}", e))
            })?;
            response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
        Ok(response)
    }

    fn handle_delete(&self, request: &StandardRequest) -> StandardResponse {
        if let Some(rejected) = self.validate_session(request.headers()) {
            return rejected;
        }
        self.closed.store(true, Ordering::Release);
        tracing::debug!(session_id = ?self.session_id.get(), "Session terminated by client");
        StatusCode::OK.into_response()
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn session_id(&self) -> Option<String> {
        self.session_id.get().cloned()
    }

    async fn handle_request(&self, request: StandardRequest) -> Result<StandardResponse> {
        if self.is_closed() {
            return Err(McpError::Transport("transport is closed".to_string()));
        }

        let method = request.method().clone();
        if method == Method::POST {
            self.handle_post(request).await
        } else if method == Method::DELETE {
            Ok(self.handle_delete(&request))
        } else {
            let mut response = rejection(
                StatusCode::METHOD_NOT_ALLOWED,
                JsonRpcError::invalid_request("Method not allowed"),
            );
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST, DELETE"));
            Ok(response)
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(session_id = ?self.session_id.get(), "Transport closed");
        }
        Ok(())
    }
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|accept| accept.contains("text/event-stream"))
}

fn sse_event(response: &JsonRpcResponse) -> Event {
    match Event::default().event(SSE_MESSAGE_EVENT).json_data(response) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize SSE response");
            Event::default().event(SSE_MESSAGE_EVENT).data("{}")
        }
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> StandardResponse {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// JSON-RPC error body with a null id.
fn rejection(status: StatusCode, error: JsonRpcError) -> StandardResponse {
    tracing::debug!(status = %status, message = %error.message, "Rejecting request");
    let body = serde_json::to_vec(&JsonRpcResponse::error(None, error)).unwrap_or_default();
    json_response(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcNotification, JsonRpcRequest};
    use axum::body::Bytes;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct PingEngine {
        notifications: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProtocolEngine for PingEngine {
        async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
            JsonRpcResponse::result(request.id, json!({"method": request.method}))
        }

        async fn handle_notification(&self, notification: JsonRpcNotification) {
            self.notifications.lock().unwrap().push(notification.method);
        }
    }

    fn transport() -> (StreamableHttpTransport, Arc<PingEngine>) {
        let engine = Arc::new(PingEngine::default());
        let transport = StreamableHttpTransport::new(Arc::new(|| "session-1".to_string()));
        transport.connect(engine.clone()).unwrap();
        (transport, engine)
    }

    fn post(body: Value, session: Option<&str>) -> StandardRequest {
        let mut builder = axum::http::Request::builder()
            .method(Method::POST)
            .uri("http://localhost/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(id) = session {
            builder = builder.header(MCP_SESSION_ID_HEADER, id);
        }
        builder.body(Bytes::from(body.to_string())).unwrap()
    }

    fn init() -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})
    }

    async fn body_json(response: StandardResponse) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_assigns_session_header() {
        let (transport, _) = transport();
        assert!(transport.session_id().is_none());

        let response = transport.handle_request(post(init(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[MCP_SESSION_ID_HEADER], "session-1");
        assert_eq!(transport.session_id().as_deref(), Some("session-1"));
        assert_eq!(body_json(response).await["result"]["method"], "initialize");
    }

    #[tokio::test]
    async fn test_reinitialize_rejected() {
        let (transport, _) = transport();
        transport.handle_request(post(init(), None)).await.unwrap();
        let again = transport
            .handle_request(post(init(), Some("session-1")))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_request_before_initialize_rejected() {
        let (transport, _) = transport();
        let response = transport
            .handle_request(post(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(MCP_SESSION_ID_HEADER).is_none());
        let body = body_json(response).await;
        assert!(body["id"].is_null());
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Server not initialized"));
    }

    #[tokio::test]
    async fn test_session_header_checked() {
        let (transport, _) = transport();
        transport.handle_request(post(init(), None)).await.unwrap();
        let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});

        let missing = transport.handle_request(post(list.clone(), None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let wrong = transport
            .handle_request(post(list.clone(), Some("other")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::NOT_FOUND);

        let ok = transport
            .handle_request(post(list, Some("session-1")))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_batch_and_notifications() {
        let (transport, engine) = transport();
        transport.handle_request(post(init(), None)).await.unwrap();

        let only_notification = transport
            .handle_request(post(
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                Some("session-1"),
            ))
            .await
            .unwrap();
        assert_eq!(only_notification.status(), StatusCode::ACCEPTED);
        assert_eq!(
            engine.notifications.lock().unwrap().as_slice(),
            ["notifications/initialized"]
        );

        let batch = transport
            .handle_request(post(
                json!([
                    {"jsonrpc": "2.0", "id": 2, "method": "ping"},
                    {"jsonrpc": "2.0", "id": 3, "method": "tools/list"}
                ]),
                Some("session-1"),
            ))
            .await
            .unwrap();
        let body = body_json(batch).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[1]["id"], 3);
    }

    #[tokio::test]
    async fn test_content_type_and_parse_errors() {
        let (transport, _) = transport();

        let mut plain = post(init(), None);
        plain
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let response = transport.handle_request(plain).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let garbage = axum::http::Request::builder()
            .method(Method::POST)
            .uri("http://localhost/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(b"{not json"))
            .unwrap();
        let response = transport.handle_request(garbage).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], -32700);
        assert!(transport.session_id().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_protocol_version_rejected() {
        let (transport, _) = transport();
        transport.handle_request(post(init(), None)).await.unwrap();

        let mut request = post(
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
            Some("session-1"),
        );
        request.headers_mut().insert(
            MCP_PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static("1999-01-01"),
        );
        let response = transport.handle_request(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_response_frames() {
        let (transport, _) = transport();
        let mut request = post(init(), None);
        request.headers_mut().insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );

        let response = transport.handle_request(request).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[MCP_SESSION_ID_HEADER], "session-1");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("event: message\n"));
        assert!(text.contains("data: {"));
        assert!(text.contains("\"initialize\""));
    }

    #[tokio::test]
    async fn test_get_not_allowed_and_delete_closes() {
        let (transport, _) = transport();
        transport.handle_request(post(init(), None)).await.unwrap();

        let get = axum::http::Request::builder()
            .method(Method::GET)
            .uri("http://localhost/mcp")
            .header(MCP_SESSION_ID_HEADER, "session-1")
            .body(Bytes::new())
            .unwrap();
        let response = transport.handle_request(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST, DELETE");

        let delete = axum::http::Request::builder()
            .method(Method::DELETE)
            .uri("http://localhost/mcp")
            .header(MCP_SESSION_ID_HEADER, "session-1")
            .body(Bytes::new())
            .unwrap();
        let response = transport.handle_request(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(transport.is_closed());

        let after = transport
            .handle_request(post(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}), Some("session-1")))
            .await;
        assert!(matches!(after, Err(McpError::Transport(_))));
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let (transport, engine) = transport();
        assert!(transport.connect(engine).is_err());
    }
}

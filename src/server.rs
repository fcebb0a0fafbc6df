//! HTTP listener.
//!
//! Routes:
//!
//! - `/mcp`: protocol exchange, dispatched to the session's transport
//! - `/health`: liveness plus the number of live sessions
//! - `/.well-known/*`: empty JSON object (no OAuth discovery)
//! - anything else: 404
//!
//! Every response carries CORS headers when the request's `Origin` is in
//! the configured allow-list, and `OPTIONS` requests are answered directly.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{GatewayConfig, WILDCARD_ORIGIN};
use crate::engine::ProtocolEngine;
use crate::error::{McpError, Result};
use crate::session::SessionRegistry;
use crate::transport::host::{ChannelResponse, HostResponse};
use crate::transport::{adapter, uuid_generator, IdGenerator, Transport, MCP_SESSION_ID_HEADER};

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "tiddlywiki-mcp";

/// Largest request body accepted on `/mcp`.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

const NOT_FOUND_MESSAGE: &str = "Not Found. Available endpoints: /mcp, /health";

const CORS_ALLOW_METHODS: &str = "GET, POST, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, MCP-Session-ID, MCP-Protocol-Version";
const CORS_EXPOSE_HEADERS: &str = "MCP-Session-ID";

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the listener is up
    pub status: String,
    /// [`SERVICE_NAME`]
    pub service: String,
    /// Number of registered sessions
    pub active_sessions: usize,
}

/// The MCP HTTP gateway.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    sessions: Arc<SessionRegistry>,
    engine: Arc<dyn ProtocolEngine>,
    id_generator: IdGenerator,
}

impl Gateway {
    /// Create a gateway with an empty session registry. Every session's
    /// transport connects to `engine`.
    pub fn new(config: GatewayConfig, engine: Arc<dyn ProtocolEngine>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionRegistry::new()),
            engine,
            id_generator: uuid_generator(),
        }
    }

    /// Replace the session id generator (random UUIDs by default).
    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// The configuration the gateway was built with.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The live session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Build the axum router for all gateway routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/mcp", any(handle_mcp))
            .route("/health", any(health))
            .route("/.well-known/", any(well_known))
            .route("/.well-known/{*path}", any(well_known))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(self.clone(), cors))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serve until `shutdown` resolves, then close every session before the
    /// listener is released.
    ///
    /// Sessions registered by exchanges still in flight at the first sweep
    /// are closed once the server has drained.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, read_only = self.config.read_only, "TiddlyWiki MCP server listening");
        tracing::info!("MCP endpoint: http://{}/mcp", addr);
        tracing::info!("Health check: http://{}/health", addr);

        let sessions = self.sessions.clone();
        let app = self.router();

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Server closing, cleaning up all transports");
                sessions.close_all().await;
            })
            .await;

        if !self.sessions.is_empty() {
            self.sessions.close_all().await;
        }

        served.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            McpError::Io(e)
        })
    }

    /// Run one `/mcp` exchange, writing the outcome to `host`.
    async fn serve_mcp(self, request: Request, mut host: ChannelResponse) {
        let session_id = request
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let Err(err) = self.exchange(request, &session_id, &mut host).await else {
            return;
        };
        tracing::error!(session_id = %session_id, error = %err, "Error handling MCP request");

        if host.headers_sent() {
            if !host.finished() {
                if let Err(e) = host.end().await {
                    tracing::debug!(error = %e, "Failed to end response");
                }
            }
            return;
        }

        host.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        host.append_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({ "error": err.to_string() }).to_string();
        if let Err(e) = host.write(Bytes::from(body)).await {
            tracing::debug!(error = %e, "Failed to write error response");
        }
        if let Err(e) = host.end().await {
            tracing::debug!(error = %e, "Failed to end response");
        }
    }

    async fn exchange(
        &self,
        request: Request,
        session_id: &str,
        host: &mut dyn HostResponse,
    ) -> Result<()> {
        let (parts, body) = request.into_parts();

        let body = if parts.method == Method::POST {
            let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|e| McpError::Transport(format!("failed to read request body: {}", e)))?;
            Some(bytes)
        } else {
            None
        };
        let standard = adapter::to_standard_request(&parts, body)?;

        let response = if session_id.is_empty() {
            let transport = self
                .sessions
                .create_for_new_session(self.id_generator.clone());
            transport.connect(self.engine.clone())?;
            let response = transport.handle_request(standard).await?;
            self.sessions
                .register_from_response(transport, response.status(), response.headers())
                .await;
            response
        } else {
            let transport = self.sessions.resolve(session_id)?;
            let response = transport.handle_request(standard).await?;
            if parts.method == Method::DELETE && response.status().is_success() {
                self.sessions.close(session_id).await;
            }
            response
        };

        adapter::from_standard_response(response, host).await
    }
}

async fn handle_mcp(State(gateway): State<Gateway>, request: Request) -> Response {
    let (host, pending) = ChannelResponse::channel();
    tokio::spawn(gateway.serve_mcp(request, host));
    pending.into_response().await
}

async fn health(State(gateway): State<Gateway>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        active_sessions: gateway.sessions.len(),
    })
}

async fn well_known() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE)
}

/// Log the request, answer preflights, and attach CORS headers.
async fn cors(State(gateway): State<Gateway>, request: Request, next: Next) -> Response {
    tracing::info!(method = %request.method(), path = %request.uri().path(), "HTTP request");

    // A request without an Origin is treated as coming from "*"
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(WILDCARD_ORIGIN));
    let allowed_origin = origin
        .to_str()
        .is_ok_and(|o| gateway.config.origin_allowed(o))
        .then_some(origin);

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    if let Some(origin) = allowed_origin {
        apply_cors_headers(response.headers_mut(), origin);
    }
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: HeaderValue) {
    let set = |headers: &mut HeaderMap, name: HeaderName, value: &'static str| {
        headers.insert(name, HeaderValue::from_static(value));
    };

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    set(headers, header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS);
    set(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS);
    set(headers, header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
    set(headers, header::ACCESS_CONTROL_EXPOSE_HEADERS, CORS_EXPOSE_HEADERS);
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}

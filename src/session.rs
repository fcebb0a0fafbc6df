//! MCP session management.
//!
//! Maps session identifiers to the transport that owns each session. The
//! map lock is only held for lookups and updates, never while a transport
//! is handling a request or closing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::{HeaderMap, StatusCode};

use crate::error::{McpError, Result};
use crate::transport::{IdGenerator, StreamableHttpTransport, Transport, MCP_SESSION_ID_HEADER};

/// Registry of live session transports.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<dyn Transport>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Transport>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the transport for a session.
    pub fn resolve(&self, session_id: &str) -> Result<Arc<dyn Transport>> {
        self.lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| McpError::SessionNotFound(session_id.to_string()))
    }

    /// Create an unregistered transport for a request that carries no
    /// session id. It is registered by [`register_from_response`] once it
    /// reports one.
    ///
    /// [`register_from_response`]: SessionRegistry::register_from_response
    pub fn create_for_new_session(&self, id_generator: IdGenerator) -> Arc<StreamableHttpTransport> {
        Arc::new(StreamableHttpTransport::new(id_generator))
    }

    /// Register a fresh transport under the session id announced in its
    /// response headers.
    ///
    /// A transport whose response carries no session id (the request was
    /// rejected before initialization) is closed and not retained.
    pub async fn register_from_response(
        &self,
        transport: Arc<dyn Transport>,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Option<String> {
        let session_id = headers
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match session_id {
            Some(id) => {
                if self.record(id.clone(), transport) {
                    tracing::info!(session_id = %id, "Created new session");
                }
                Some(id)
            }
            None => {
                tracing::warn!(
                    status = %status,
                    "Transport did not establish a session, discarding it"
                );
                if let Err(e) = transport.close().await {
                    tracing::debug!(error = %e, "Error closing discarded transport");
                }
                None
            }
        }
    }

    /// Record a transport under `session_id`.
    ///
    /// An id keeps the transport it was first recorded with; returns whether
    /// the transport was recorded.
    pub fn record(&self, session_id: String, transport: Arc<dyn Transport>) -> bool {
        let mut sessions = self.lock();
        if sessions.contains_key(&session_id) {
            tracing::warn!(session_id = %session_id, "Session id already registered");
            return false;
        }
        sessions.insert(session_id, transport);
        true
    }

    /// Close a session's transport and remove it.
    ///
    /// Close failures are logged; the entry is removed regardless.
    pub async fn close(&self, session_id: &str) {
        let transport = self.lock().get(session_id).cloned();

        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                tracing::error!(session_id = %session_id, error = %e, "Error closing transport");
            }
        }

        if self.lock().remove(session_id).is_some() {
            tracing::info!(session_id = %session_id, "Session closed");
        }
    }

    /// Close every session.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.lock().keys().cloned().collect();
        tracing::info!(count = ids.len(), "Closing all sessions");
        for id in ids {
            self.close(&id).await;
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `session_id` is registered.
    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }
}

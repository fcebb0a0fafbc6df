//! Host server response objects.
//!
//! [`HostResponse`] is the minimal surface the adapter needs from the host
//! server's native response: status and headers, chunked body writes, and
//! an end signal. [`ChannelResponse`] implements it for axum by handing the
//! response head over a oneshot channel and streaming body chunks through a
//! bounded channel, so a handler can return as soon as the head is known
//! while the body is still being produced.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{McpError, Result};

/// Body chunks buffered between the writer and the client connection.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// A host server's native response object.
#[async_trait]
pub trait HostResponse: Send {
    /// Whether status and headers have been committed to the client.
    fn headers_sent(&self) -> bool;

    /// Whether [`end`](HostResponse::end) has been called.
    fn finished(&self) -> bool;

    /// Ignored once headers are sent.
    fn set_status(&mut self, status: StatusCode);

    /// Ignored once headers are sent.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Write one body chunk, committing the head first if needed.
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Finish the response. Must be called exactly once.
    async fn end(&mut self) -> Result<()>;
}

struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
}

/// [`HostResponse`] backed by channels feeding an axum [`Response`].
pub struct ChannelResponse {
    status: StatusCode,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::Sender<Bytes>>,
    disconnected: bool,
}

/// The receiving half of a [`ChannelResponse`].
pub struct PendingResponse {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::Receiver<Bytes>,
}

impl ChannelResponse {
    /// A writer and the response it feeds.
    pub fn channel() -> (ChannelResponse, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

        let response = ChannelResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
            disconnected: false,
        };
        (response, PendingResponse { head_rx, body_rx })
    }

    fn commit_head(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            let head = ResponseHead {
                status: self.status,
                headers: std::mem::take(&mut self.headers),
            };
            if tx.send(head).is_err() {
                tracing::debug!("Client went away before response headers were sent");
                self.disconnected = true;
            }
        }
    }
}

#[async_trait]
impl HostResponse for ChannelResponse {
    fn headers_sent(&self) -> bool {
        self.head_tx.is_none()
    }

    fn finished(&self) -> bool {
        self.body_tx.is_none()
    }

    fn set_status(&mut self, status: StatusCode) {
        if !self.headers_sent() {
            self.status = status;
        }
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.headers_sent() {
            self.headers.append(name, value);
        }
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.commit_head();

        let Some(tx) = &self.body_tx else {
            return Err(McpError::Transport("write after end of response".to_string()));
        };
        if self.disconnected {
            return Ok(());
        }
        if tx.send(chunk).await.is_err() {
            tracing::debug!("Client disconnected, dropping remaining response body");
            self.disconnected = true;
        }
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        self.commit_head();
        match self.body_tx.take() {
            Some(_) => Ok(()),
            None => Err(McpError::Transport("response already ended".to_string())),
        }
    }
}

impl PendingResponse {
    /// Wait for the head and build a response that streams the body.
    ///
    /// If the writer is dropped before committing a head, a 500 is returned.
    pub async fn into_response(self) -> Response {
        match self.head_rx.await {
            Ok(head) => {
                let stream = ReceiverStream::new(self.body_rx).map(Ok::<_, Infallible>);
                let mut response = Response::new(Body::from_stream(stream));
                *response.status_mut() = head.status;
                *response.headers_mut() = head.headers;
                response
            }
            Err(_) => {
                tracing::error!("Response writer dropped before sending headers");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records everything written to it.
    #[derive(Debug, Default)]
    pub struct RecordingResponse {
        pub status: Option<StatusCode>,
        pub headers: HeaderMap,
        pub chunks: Vec<Bytes>,
        pub end_calls: usize,
        pub fail_writes: bool,
    }

    impl RecordingResponse {
        pub fn body(&self) -> Vec<u8> {
            self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
        }
    }

    #[async_trait]
    impl HostResponse for RecordingResponse {
        fn headers_sent(&self) -> bool {
            !self.chunks.is_empty() || self.end_calls > 0
        }

        fn finished(&self) -> bool {
            self.end_calls > 0
        }

        fn set_status(&mut self, status: StatusCode) {
            self.status = Some(status);
        }

        fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
            self.headers.append(name, value);
        }

        async fn write(&mut self, chunk: Bytes) -> Result<()> {
            if self.fail_writes {
                return Err(McpError::Transport("socket closed".to_string()));
            }
            self.chunks.push(chunk);
            Ok(())
        }

        async fn end(&mut self) -> Result<()> {
            self.end_calls += 1;
            Ok(())
        }
    }
}

//! Conversion between host HTTP objects and the standard request/response
//! form the transports consume.

use axum::body::Bytes;
use axum::http::{header, request, Method, Request, Uri};
use futures::StreamExt;

use crate::error::{McpError, Result};
use crate::transport::host::HostResponse;
use crate::transport::{StandardRequest, StandardResponse};

/// Build a standard request from a host request head and its buffered body.
///
/// The URL is made absolute from the `Host` header (`localhost` when
/// absent). Every header value is carried over, repeated headers included.
/// Bodies are dropped for GET and HEAD.
pub fn to_standard_request(parts: &request::Parts, body: Option<Bytes>) -> Result<StandardRequest> {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri: Uri = format!("http://{}{}", host, path)
        .parse()
        .map_err(|e| McpError::MalformedRequest(format!("invalid request URL: {}", e)))?;

    let body = if parts.method == Method::GET || parts.method == Method::HEAD {
        Bytes::new()
    } else {
        body.unwrap_or_default()
    };

    let mut request = Request::new(body);
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.version_mut() = parts.version;
    let headers = request.headers_mut();
    for (name, value) in parts.headers.iter() {
        headers.append(name.clone(), value.clone());
    }

    Ok(request)
}

/// Write a standard response to the host response.
///
/// Status and headers are copied first, then each body chunk is written as
/// it becomes available, and the host response is ended exactly once. A
/// failure part way through leaves the host response un-ended so the caller
/// can decide how to finish it.
pub async fn from_standard_response(
    response: StandardResponse,
    host: &mut dyn HostResponse,
) -> Result<()> {
    let (parts, body) = response.into_parts();

    host.set_status(parts.status);
    for (name, value) in parts.headers.iter() {
        host.append_header(name.clone(), value.clone());
    }

    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk
            .map_err(|e| McpError::Transport(format!("failed to read response body: {}", e)))?;
        host.write(chunk).await?;
    }

    host.end().await
}

// crates/secure-audit-mcp/src/transport/http.rs
// ============================================================================
// Module: HTTP Request/Response Transport
// Description: One JSON-RPC exchange per HTTP POST.
// Purpose: Serve concurrent stateless callers over HTTP.
// Dependencies: axum, tokio, tokio-util
// ============================================================================

//! ## Overview
//! `POST /rpc` carries one JSON-RPC frame. The body is bounded before it is
//! read; the exchange then runs through the same connection driver as every
//! other transport, on its own task so a disconnecting client cannot abort
//! an invocation half way. Every reply carries `Connection: close`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::invocation::TransportKind;
use crate::protocol::INVALID_REQUEST;
use crate::protocol::JsonRpcResponse;
use crate::protocol::PARSE_ERROR;
use crate::protocol::PAYLOAD_TOO_LARGE;
use crate::protocol::ProtocolHandler;
use crate::transport::ConnectionContext;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::transport::serve_connection;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state of the HTTP transport.
#[derive(Clone)]
pub struct HttpState {
    /// Protocol handler.
    protocol: Arc<ProtocolHandler>,
    /// Largest accepted body.
    max_body_bytes: usize,
    /// Server shutdown signal.
    shutdown: CancellationToken,
}

impl HttpState {
    /// Creates the transport state.
    #[must_use]
    pub const fn new(
        protocol: Arc<ProtocolHandler>,
        max_body_bytes: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            max_body_bytes,
            shutdown,
        }
    }
}

/// Builds the `POST /rpc` router.
pub fn http_routes(state: HttpState) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

// ============================================================================
// SECTION: Exchange Transport
// ============================================================================

/// Single-frame transport wrapping one HTTP exchange.
struct HttpExchange {
    /// Pending request body or the error reading it.
    body: Option<Result<Vec<u8>, TransportError>>,
    /// Captured reply.
    reply: Option<JsonRpcResponse>,
}

#[async_trait]
impl Transport for HttpExchange {
    fn kind(&self) -> TransportKind {
        TransportKind::RequestResponse
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.body.take().transpose()
    }

    async fn reply(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        self.reply = Some(response.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /rpc`.
async fn handle_rpc(State(state): State<HttpState>, request: Request) -> Response {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    let caller = peer.map_or_else(|| "http:unknown".to_string(), |addr| format!("http:{}", addr.ip()));
    let declared = declared_length(request.headers());
    let body = read_body(request.into_body(), declared, state.max_body_bytes).await;

    let conn = ConnectionContext::new(TransportKind::RequestResponse, caller, state.shutdown.child_token());
    if let Err(err) = &body
        && !err.is_recoverable()
    {
        return into_http(Some(state.protocol.reject(&conn, err, serde_json::Value::Null)));
    }
    let protocol = Arc::clone(&state.protocol);
    let task = tokio::spawn(async move {
        let mut exchange = HttpExchange {
            body: Some(body),
            reply: None,
        };
        let _ = serve_connection(&mut exchange, &protocol, &conn).await;
        exchange.reply
    });
    match task.await {
        Ok(reply) => into_http(reply),
        Err(err) => {
            state.protocol.observability().emit(
                LogRecord::new(Component::Http, LogLevel::Error, "exchange task failed")
                    .with_field("error_kind", "TransportError")
                    .with_field("detail", err.to_string()),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, [(header::CONNECTION, "close")]).into_response()
        }
    }
}

/// Reads the body, refusing anything over `limit`. Only the size limit maps
/// to [`TransportError::PayloadTooLarge`]; a body that breaks off mid-read is
/// an I/O failure.
pub(crate) async fn read_body(
    body: Body,
    declared: Option<usize>,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    if let Some(actual) = declared
        && actual > limit
    {
        return Err(TransportError::PayloadTooLarge {
            limit,
            actual,
        });
    }
    let mut frames = body.into_data_stream();
    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = frames.next().await {
        let chunk = chunk.map_err(|err| TransportError::Io(err.to_string()))?;
        let actual = buffer.len().saturating_add(chunk.len());
        if actual > limit {
            return Err(TransportError::PayloadTooLarge {
                limit,
                actual,
            });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

/// Parses the `Content-Length` header.
pub(crate) fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Converts a JSON-RPC reply into an HTTP response.
fn into_http(reply: Option<JsonRpcResponse>) -> Response {
    let Some(reply) = reply else {
        return (StatusCode::ACCEPTED, [(header::CONNECTION, "close")]).into_response();
    };
    let status = match reply.error_code() {
        Some(PARSE_ERROR | INVALID_REQUEST) => StatusCode::BAD_REQUEST,
        Some(PAYLOAD_TOO_LARGE) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::OK,
    };
    (
        status,
        [(header::CONTENT_TYPE, "application/json"), (header::CONNECTION, "close")],
        reply.to_bytes(),
    )
        .into_response()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test-only assertions."
    )]

    use axum::body::Body;
    use axum::body::Bytes;

    use super::read_body;
    use crate::transport::TransportError;

    fn chunked(chunks: Vec<Result<Bytes, std::io::Error>>) -> Body {
        Body::from_stream(tokio_stream::iter(chunks))
    }

    #[tokio::test]
    async fn body_within_limit_is_collected() {
        let body = chunked(vec![Ok(Bytes::from_static(b"{\"a\"")), Ok(Bytes::from_static(b":1}"))]);
        assert_eq!(read_body(body, None, 64).await.unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn undeclared_oversized_body_is_too_large() {
        let body = chunked(vec![Ok(Bytes::from(vec![b'x'; 40])), Ok(Bytes::from(vec![b'y'; 40]))]);
        let err = read_body(body, None, 64).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::PayloadTooLarge {
                limit: 64,
                actual: 80
            }
        );
    }

    #[tokio::test]
    async fn aborted_body_is_an_io_error() {
        let body = chunked(vec![
            Ok(Bytes::from_static(b"{\"jsonrpc\"")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset")),
        ]);
        let err = read_body(body, Some(40), 64).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)), "unexpected {err:?}");
        assert!(!err.is_recoverable());
    }
}

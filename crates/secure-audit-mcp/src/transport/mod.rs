// crates/secure-audit-mcp/src/transport/mod.rs
// ============================================================================
// Module: Transport Adapters
// Description: Transport trait, connection context, and the connection driver.
// Purpose: Share one receive -> protocol -> reply loop across transports.
// Dependencies: async-trait, tokio-util, thiserror
// ============================================================================

//! ## Overview
//! Every adapter implements [`Transport`]: it yields raw frames and writes
//! replies. [`serve_connection`] drives one connection sequentially, so
//! replies leave in the order requests arrived. Recoverable framing errors
//! are answered and the loop continues; anything else closes the
//! connection without touching other connections.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::invocation::TransportKind;
use crate::protocol::INVALID_REQUEST;
use crate::protocol::JsonRpcResponse;
use crate::protocol::PARSE_ERROR;
use crate::protocol::PAYLOAD_TOO_LARGE;
use crate::protocol::ProtocolHandler;

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod pipe;
pub mod stream;

pub use http::HttpState;
pub use http::http_routes;
pub use pipe::PipeTransport;
pub use stream::StreamHub;
pub use stream::StreamSettings;
pub use stream::stream_routes;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Transport-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Frame is not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),
    /// Frame is not a valid JSON-RPC request.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Frame exceeds the size limit.
    #[error("payload of {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit.
        limit: usize,
        /// Declared or observed size.
        actual: usize,
    },
    /// A header block could not be trusted and was skipped.
    #[error("framing lost: {0}")]
    Desync(String),
    /// Peer went away.
    #[error("connection closed")]
    Closed,
    /// Underlying I/O failed.
    #[error("transport io error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns true when the connection can continue after replying. Only a
    /// closed peer or a failed read/write ends the connection.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed | Self::Io(_))
    }

    /// JSON-RPC error code used when replying to this failure.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::PayloadTooLarge {
                ..
            } => PAYLOAD_TOO_LARGE,
            Self::Malformed(_) | Self::Desync(_) | Self::Closed | Self::Io(_) => INVALID_REQUEST,
        }
    }
}

// ============================================================================
// SECTION: Connection Context
// ============================================================================

/// Identity and lifetime of one connection or exchange.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Transport kind.
    pub transport: TransportKind,
    /// Connection identifier used in logs.
    pub connection_id: String,
    /// Caller label attached to invocations.
    pub caller: String,
    /// Cancelled when the connection ends.
    pub cancel: CancellationToken,
}

impl ConnectionContext {
    /// Creates a context with a fresh connection id.
    #[must_use]
    pub fn new(transport: TransportKind, caller: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            transport,
            connection_id: uuid::Uuid::new_v4().simple().to_string(),
            caller: caller.into(),
            cancel,
        }
    }

    /// Uses an existing identifier instead of a generated one.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }
}

// ============================================================================
// SECTION: Transport Trait
// ============================================================================

/// A source of request frames and a sink for replies.
#[async_trait]
pub trait Transport: Send {
    /// Transport kind.
    fn kind(&self) -> TransportKind;

    /// Waits for the next frame; `Ok(None)` means the peer closed cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for malformed, oversized, or failed reads.
    async fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Delivers one reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the reply cannot be written.
    async fn reply(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError>;

    /// Releases the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when shutdown fails.
    async fn close(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Serves one connection until the peer closes, a fatal error occurs, or
/// the connection is cancelled.
///
/// # Errors
///
/// Returns the fatal [`TransportError`] that ended the connection.
pub async fn serve_connection<T>(
    transport: &mut T,
    protocol: &ProtocolHandler,
    conn: &ConnectionContext,
) -> Result<(), TransportError>
where
    T: Transport + ?Sized,
{
    let observability = protocol.observability();
    let component = transport.kind().component();
    observability.emit(
        LogRecord::new(component, LogLevel::Debug, "connection opened")
            .with_field("connection", conn.connection_id.as_str())
            .with_field("caller", conn.caller.as_str()),
    );
    let outcome = drive(transport, protocol, conn).await;
    let closed = transport.close().await;
    let outcome = outcome.and(closed);
    let record = match &outcome {
        Ok(()) => LogRecord::new(component, LogLevel::Debug, "connection closed"),
        Err(err) => LogRecord::new(component, LogLevel::Warning, "connection failed")
            .with_field("error_kind", "TransportError")
            .with_field("error", err.to_string()),
    };
    observability.emit(record.with_field("connection", conn.connection_id.as_str()));
    outcome
}

/// Receive -> handle -> reply loop.
async fn drive<T>(
    transport: &mut T,
    protocol: &ProtocolHandler,
    conn: &ConnectionContext,
) -> Result<(), TransportError>
where
    T: Transport + ?Sized,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = conn.cancel.cancelled() => return Ok(()),
            frame = transport.receive() => frame,
        };
        let reply = match frame {
            Ok(Some(bytes)) => protocol.handle_frame(&bytes, conn).await,
            Ok(None) => return Ok(()),
            Err(err) if err.is_recoverable() => {
                Some(protocol.reject(conn, &err, serde_json::Value::Null))
            }
            Err(err) => return Err(err),
        };
        if let Some(reply) = reply {
            transport.reply(&reply).await?;
        }
    }
}

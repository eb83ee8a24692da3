// crates/secure-audit-mcp/src/transport/stream.rs
// ============================================================================
// Module: Event Stream Transport
// Description: Server-sent event sessions with a POST back-channel.
// Purpose: Serve long-lived callers with heartbeats and cancellation.
// Dependencies: axum, tokio, tokio-stream, tokio-util, uuid
// ============================================================================

//! ## Overview
//! `GET /sse` opens a session. The first event (`endpoint`) names the URL the
//! caller POSTs frames to; replies come back on the stream as `message`
//! events in the order frames were accepted, interleaved with `heartbeat`
//! events. Each session owns a cancellation token. Dropping the
//! [`SessionStream`] (the client went away) cancels it, which stops the
//! heartbeat and cancels any invocation still running for that session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::Sse;
use axum::routing::get;
use axum::routing::post;
use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::Timestamp;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::heartbeat::HeartbeatMonitor;
use crate::invocation::TransportKind;
use crate::protocol::JsonRpcResponse;
use crate::protocol::ProtocolHandler;
use crate::transport::ConnectionContext;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::transport::http::declared_length;
use crate::transport::http::read_body;
use crate::transport::serve_connection;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event pushed to a stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// URL for posting frames to this session.
    Endpoint(String),
    /// Serialized JSON-RPC reply.
    Message(String),
    /// Liveness signal.
    Heartbeat {
        /// Sequence number starting at 1.
        seq: u64,
        /// Emission time.
        at: Timestamp,
    },
}

impl StreamEvent {
    /// Returns the SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Endpoint(_) => "endpoint",
            Self::Message(_) => "message",
            Self::Heartbeat {
                ..
            } => "heartbeat",
        }
    }

    /// Returns the SSE data payload.
    #[must_use]
    pub fn data(&self) -> String {
        match self {
            Self::Endpoint(url) => url.clone(),
            Self::Message(body) => body.clone(),
            Self::Heartbeat {
                seq,
                at,
            } => json!({"seq": seq, "timestamp": at}).to_string(),
        }
    }

    /// Converts the event into its SSE wire form.
    #[must_use]
    pub fn into_sse(self) -> Event {
        Event::default().event(self.name()).data(self.data())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons a posted frame was not queued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// No session with that id.
    #[error("unknown session")]
    NotFound,
    /// Session inbound queue is full.
    #[error("session is busy")]
    Busy,
    /// Session is shutting down.
    #[error("session closed")]
    Closed,
}

// ============================================================================
// SECTION: Hub
// ============================================================================

/// Registry of live stream sessions.
#[derive(Clone)]
pub struct StreamHub {
    /// Shared hub state.
    inner: Arc<HubInner>,
}

/// Shared hub state.
struct HubInner {
    /// Live sessions keyed by id.
    sessions: Mutex<HashMap<String, SessionHandle>>,
    /// Protocol handler.
    protocol: Arc<ProtocolHandler>,
    /// Per-session queue depth, both directions.
    queue_depth: usize,
    /// Heartbeat period.
    heartbeat_interval: Duration,
    /// Largest accepted posted frame.
    max_body_bytes: usize,
    /// Server shutdown signal.
    shutdown: CancellationToken,
}

/// Hub-side view of a session.
struct SessionHandle {
    /// Frames waiting for the session task.
    inbound: mpsc::Sender<Vec<u8>>,
    /// Session cancellation.
    cancel: CancellationToken,
}

/// Tunables for a [`StreamHub`].
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Per-session queue depth.
    pub queue_depth: usize,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Largest accepted posted frame.
    pub max_body_bytes: usize,
}

impl StreamHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new(
        protocol: Arc<ProtocolHandler>,
        settings: StreamSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: Mutex::new(HashMap::new()),
                protocol,
                queue_depth: settings.queue_depth.max(1),
                heartbeat_interval: settings.heartbeat_interval,
                max_body_bytes: settings.max_body_bytes,
                shutdown,
            }),
        }
    }

    /// Locks the session table, recovering from poisoning.
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.inner.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Opens a session and starts its worker and heartbeat tasks.
    #[must_use]
    pub fn open_session(&self, caller: impl Into<String>) -> SessionStream {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let cancel = self.inner.shutdown.child_token();
        let (events_tx, events_rx) = mpsc::channel(self.inner.queue_depth);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.inner.queue_depth);
        let _ = events_tx.try_send(StreamEvent::Endpoint(format!("/messages?session_id={id}")));

        self.sessions().insert(
            id.clone(),
            SessionHandle {
                inbound: inbound_tx,
                cancel: cancel.clone(),
            },
        );
        let observability = Arc::clone(self.inner.protocol.observability());
        observability.emit(
            LogRecord::new(Component::Stream, LogLevel::Info, "session opened")
                .with_field("session_id", id.as_str()),
        );

        HeartbeatMonitor::new(
            self.inner.heartbeat_interval,
            id.clone(),
            events_tx.clone(),
            cancel.clone(),
            observability,
        )
        .spawn();

        let conn = ConnectionContext::new(TransportKind::Stream, caller, cancel.clone())
            .with_connection_id(id.clone());
        let protocol = Arc::clone(&self.inner.protocol);
        let hub = self.clone();
        let session_id = id.clone();
        tokio::spawn(async move {
            let mut transport = SessionTransport {
                inbound: inbound_rx,
                events: events_tx,
            };
            let _ = serve_connection(&mut transport, &protocol, &conn).await;
            hub.close(&session_id);
        });

        SessionStream {
            id: id.clone(),
            events: events_rx,
            _guard: SessionGuard {
                hub: self.clone(),
                id,
            },
        }
    }

    /// Queues a frame for a session.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when the session is unknown, full, or closing.
    pub fn submit(&self, session_id: &str, frame: Vec<u8>) -> Result<(), SubmitError> {
        let sessions = self.sessions();
        let handle = sessions.get(session_id).ok_or(SubmitError::NotFound)?;
        if handle.cancel.is_cancelled() {
            return Err(SubmitError::Closed);
        }
        handle.inbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::Busy,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Cancels and forgets a session. Returns false when it was unknown.
    pub fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions().remove(session_id);
        let Some(handle) = removed else {
            return false;
        };
        handle.cancel.cancel();
        self.inner.protocol.observability().emit(
            LogRecord::new(Component::Stream, LogLevel::Info, "session closed")
                .with_field("session_id", session_id),
        );
        true
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }
}

// ============================================================================
// SECTION: Session Stream
// ============================================================================

/// Event stream of one session; dropping it closes the session.
pub struct SessionStream {
    /// Session id.
    id: String,
    /// Outbound events.
    events: mpsc::Receiver<StreamEvent>,
    /// Closes the session on drop.
    _guard: SessionGuard,
}

impl SessionStream {
    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the next event.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

impl Stream for SessionStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

/// Closes its session when dropped.
struct SessionGuard {
    /// Owning hub.
    hub: StreamHub,
    /// Session id.
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.hub.close(&self.id);
    }
}

// ============================================================================
// SECTION: Session Transport
// ============================================================================

/// Worker-side transport of one session.
struct SessionTransport {
    /// Frames posted by the caller.
    inbound: mpsc::Receiver<Vec<u8>>,
    /// Events pushed to the caller.
    events: mpsc::Sender<StreamEvent>,
}

#[async_trait]
impl Transport for SessionTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn reply(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        let body = String::from_utf8_lossy(&response.to_bytes()).into_owned();
        self.events.send(StreamEvent::Message(body)).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inbound.close();
        Ok(())
    }
}

// ============================================================================
// SECTION: Routes
// ============================================================================

/// Query string of `POST /messages`.
#[derive(Debug, Deserialize)]
struct MessageQuery {
    /// Target session.
    session_id: String,
}

/// Builds the `GET /sse` and `POST /messages` router.
pub fn stream_routes(hub: StreamHub) -> Router {
    Router::new()
        .route("/sse", get(open_stream))
        .route("/messages", post(post_message))
        .layer(DefaultBodyLimit::disable())
        .with_state(hub)
}

/// Caller label for a request.
fn caller_of(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "stream:unknown".to_string(), |info| format!("stream:{}", info.0.ip()))
}

/// Handles `GET /sse`.
async fn open_stream(State(hub): State<StreamHub>, request: Request) -> impl IntoResponse {
    let session = hub.open_session(caller_of(&request));
    Sse::new(session.map(|event| Ok::<Event, Infallible>(event.into_sse())))
}

/// Handles `POST /messages`.
async fn post_message(
    State(hub): State<StreamHub>,
    Query(query): Query<MessageQuery>,
    request: Request,
) -> Response {
    let limit = hub.inner.max_body_bytes;
    let caller = caller_of(&request);
    let declared = declared_length(request.headers());
    let body = match read_body(request.into_body(), declared, limit).await {
        Ok(body) => body,
        Err(err) => {
            let status = match err {
                TransportError::PayloadTooLarge {
                    ..
                } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            };
            let conn = ConnectionContext::new(TransportKind::Stream, caller, CancellationToken::new())
                .with_connection_id(query.session_id);
            let reply = hub.inner.protocol.reject(&conn, &err, serde_json::Value::Null);
            return (status, [(header::CONTENT_TYPE, "application/json")], reply.to_bytes())
                .into_response();
        }
    };
    match hub.submit(&query.session_id, body) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(SubmitError::NotFound) => (StatusCode::NOT_FOUND, "unknown session").into_response(),
        Err(SubmitError::Busy) => (StatusCode::TOO_MANY_REQUESTS, "session is busy").into_response(),
        Err(SubmitError::Closed) => (StatusCode::GONE, "session closed").into_response(),
    }
}

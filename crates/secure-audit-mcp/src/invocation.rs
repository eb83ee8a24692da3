// crates/secure-audit-mcp/src/invocation.rs
// ============================================================================
// Module: Invocation Model
// Description: Invocations, canonical responses, failures, and execution context.
// Purpose: Give every transport one shape for requests and replies.
// Dependencies: secure-audit-core, serde, tokio, tokio-util
// ============================================================================

//! ## Overview
//! An [`Invocation`] is built by a transport adapter from a decoded frame and
//! handed to the dispatcher. Whatever happens next, the dispatcher turns it
//! into exactly one [`Response`]. Handlers see only an [`ExecutionContext`],
//! which carries the correlation id, the deadline, and the cancellation
//! signal for that single call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use secure_audit_core::Component;
use secure_audit_core::InvocationId;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::StoreError;
use secure_audit_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::runtime::RuntimeFlavor;
use tokio_util::sync::CancellationToken;

use crate::observability::Observability;

// ============================================================================
// SECTION: Transport Kind
// ============================================================================

/// Transport an invocation arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Framed messages over stdin/stdout.
    Pipe,
    /// One HTTP request per invocation.
    RequestResponse,
    /// Long-lived server-sent event session.
    Stream,
}

impl TransportKind {
    /// Returns the stable transport label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "pipe",
            Self::RequestResponse => "request_response",
            Self::Stream => "stream",
        }
    }

    /// Returns the log component owned by this transport.
    #[must_use]
    pub const fn component(self) -> Component {
        match self {
            Self::Pipe => Component::Pipe,
            Self::RequestResponse => Component::Http,
            Self::Stream => Component::Stream,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

/// One tool call as received from a transport.
///
/// # Invariants
/// - The id is generated on construction and never reused.
/// - Arguments are untrusted until the input contract accepts them.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Correlation identifier.
    id: InvocationId,
    /// Requested tool name.
    tool_name: String,
    /// Raw arguments object.
    arguments: Value,
    /// Transport of origin.
    transport: TransportKind,
    /// Wall-clock receipt time.
    received_at: Timestamp,
    /// Monotonic receipt time used for deadlines and durations.
    received: Instant,
    /// Caller label reported by the transport.
    caller: String,
}

impl Invocation {
    /// Creates an invocation stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        arguments: Value,
        transport: TransportKind,
        caller: impl Into<String>,
    ) -> Self {
        Self {
            id: InvocationId::generate(),
            tool_name: tool_name.into(),
            arguments,
            transport,
            received_at: Timestamp::now(),
            received: Instant::now(),
            caller: caller.into(),
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn id(&self) -> InvocationId {
        self.id
    }

    /// Returns the requested tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the raw arguments.
    #[must_use]
    pub const fn arguments(&self) -> &Value {
        &self.arguments
    }

    /// Returns the transport of origin.
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns the wall-clock receipt time.
    #[must_use]
    pub const fn received_at(&self) -> Timestamp {
        self.received_at
    }

    /// Returns the monotonic receipt instant.
    #[must_use]
    pub const fn received(&self) -> Instant {
        self.received
    }

    /// Returns the caller label.
    #[must_use]
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Milliseconds elapsed since receipt.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.received.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// Outcome of a dispatched invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Tool produced a result.
    Ok,
    /// Invocation failed.
    Error,
}

impl ResponseStatus {
    /// Returns the stable status label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Failure classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Arguments rejected by the input contract.
    ValidationError,
    /// No tool with the requested name.
    UnknownToolError,
    /// Handler failed while running.
    ExecutionError,
    /// Audit store failed.
    StorageError,
    /// Deadline elapsed before the handler finished.
    TimeoutError,
    /// Transport framing, delivery, or cancellation problem.
    TransportError,
    /// Registry rejected a second tool with the same name.
    DuplicateToolError,
}

impl ErrorKind {
    /// Returns the stable kind label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::UnknownToolError => "UnknownToolError",
            Self::ExecutionError => "ExecutionError",
            Self::StorageError => "StorageError",
            Self::TimeoutError => "TimeoutError",
            Self::TransportError => "TransportError",
            Self::DuplicateToolError => "DuplicateToolError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Caller-safe message.
    pub message: String,
}

/// Canonical reply for one invocation, identical across transports.
///
/// # Invariants
/// - Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the invocation.
    pub invocation_id: InvocationId,
    /// Outcome.
    pub status: ResponseStatus,
    /// Tool output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    /// Time from receipt to completion.
    pub duration_ms: u64,
}

impl Response {
    /// Builds a success response.
    #[must_use]
    pub const fn ok(invocation_id: InvocationId, result: Value, duration_ms: u64) -> Self {
        Self {
            invocation_id,
            status: ResponseStatus::Ok,
            result: Some(result),
            error: None,
            duration_ms,
        }
    }

    /// Builds a failure response from a classified failure.
    #[must_use]
    pub fn failed(invocation_id: InvocationId, failure: &ToolFailure, duration_ms: u64) -> Self {
        Self {
            invocation_id,
            status: ResponseStatus::Error,
            result: None,
            error: Some(ResponseError {
                kind: failure.kind(),
                message: failure.public_message(),
            }),
            duration_ms,
        }
    }

    /// Returns the error kind when the response failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }
}

// ============================================================================
// SECTION: Failures
// ============================================================================

/// Failure raised while resolving, validating, or running a tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolFailure {
    /// Tool name is not registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Arguments violate the input contract.
    #[error("invalid arguments: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Handler failed.
    #[error("{message}")]
    Execution {
        /// Caller-safe message.
        message: String,
        /// Internal detail, logged but never returned.
        detail: Option<String>,
    },
    /// Audit store failed.
    #[error("storage failure: {0}")]
    Storage(StoreError),
    /// Deadline elapsed.
    #[error("tool did not finish within {0} ms")]
    Timeout(u64),
    /// Transport cancelled the call.
    #[error("invocation cancelled by transport")]
    Cancelled,
}

impl ToolFailure {
    /// Builds an execution failure with a caller-safe message.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            detail: None,
        }
    }

    /// Builds a single-message validation failure.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    /// Returns the caller-visible classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) => ErrorKind::UnknownToolError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Execution {
                ..
            } => ErrorKind::ExecutionError,
            Self::Storage(_) => ErrorKind::StorageError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
            Self::Cancelled => ErrorKind::TransportError,
        }
    }

    /// Returns a message safe to send to callers.
    ///
    /// Store internals are not echoed back; they go to the log via
    /// [`ToolFailure::detail`].
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(StoreError::Unavailable(_)) => "audit store unavailable".to_string(),
            Self::Storage(_) => "audit store error".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns internal detail for logs, when any.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Execution {
                detail, ..
            } => detail.clone(),
            Self::Storage(err) => Some(err.to_string()),
            _ => None,
        }
    }

    /// Log level for a completed invocation that failed this way.
    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        match self {
            Self::UnknownTool(_) | Self::Validation(_) | Self::Cancelled => LogLevel::Warning,
            Self::Execution {
                ..
            }
            | Self::Storage(_)
            | Self::Timeout(_) => LogLevel::Error,
        }
    }
}

impl From<StoreError> for ToolFailure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::execution(format!("audit {id} not found")),
            StoreError::Constraint(message) => Self::execution(message),
            other => Self::Storage(other),
        }
    }
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Per-call context handed to tool handlers.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Correlation id of the invocation.
    correlation_id: InvocationId,
    /// Caller label.
    caller: String,
    /// Transport of origin.
    transport: TransportKind,
    /// Absolute deadline.
    deadline: tokio::time::Instant,
    /// Configured budget in milliseconds.
    budget_ms: u64,
    /// Cancellation for this call only.
    cancel: CancellationToken,
    /// Shared log sink.
    observability: Arc<Observability>,
}

impl ExecutionContext {
    /// Creates a context for `invocation`.
    ///
    /// `cancel` is the connection token; the context keeps a child of it so a
    /// handler never cancels its siblings.
    #[must_use]
    pub fn new(
        invocation: &Invocation,
        budget: Duration,
        cancel: &CancellationToken,
        observability: Arc<Observability>,
    ) -> Self {
        let deadline = tokio::time::Instant::from_std(invocation.received()) + budget;
        Self {
            correlation_id: invocation.id(),
            caller: invocation.caller().to_string(),
            transport: invocation.transport(),
            deadline,
            budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            cancel: cancel.child_token(),
            observability,
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> InvocationId {
        self.correlation_id
    }

    /// Returns the caller label.
    #[must_use]
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Returns the transport of origin.
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns the absolute deadline.
    #[must_use]
    pub const fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }

    /// Returns the cancellation token for this call.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails when the call has been cancelled or its deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolFailure::Cancelled`] or [`ToolFailure::Timeout`].
    pub fn checkpoint(&self) -> Result<(), ToolFailure> {
        if self.cancel.is_cancelled() {
            return Err(ToolFailure::Cancelled);
        }
        if tokio::time::Instant::now() >= self.deadline {
            return Err(ToolFailure::Timeout(self.budget_ms));
        }
        Ok(())
    }

    /// Runs a blocking store operation after a checkpoint.
    ///
    /// Once started the operation runs to completion; cancellation is only
    /// observed before it begins.
    ///
    /// # Errors
    ///
    /// Returns the checkpoint failure or the mapped store error.
    pub fn store<T, F>(&self, op: F) -> Result<T, ToolFailure>
    where
        F: FnOnce() -> Result<T, StoreError>,
    {
        self.checkpoint()?;
        run_blocking(op).map_err(ToolFailure::from)
    }

    /// Emits a tool-scoped log record tagged with the correlation id.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.observability.emit(
            LogRecord::new(Component::Tools, level, message).with_correlation(self.correlation_id),
        );
    }

    /// Emits a prepared record tagged with the correlation id.
    pub fn log_record(&self, record: LogRecord) {
        self.observability.emit(record.with_correlation(self.correlation_id));
    }
}

// ============================================================================
// SECTION: Blocking Helpers
// ============================================================================

/// Runs a blocking closure without stalling other tasks on a multi-thread
/// runtime.
pub(crate) fn run_blocking<T>(op: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(op)
        }
        _ => op(),
    }
}

// crates/secure-audit-mcp/src/dispatch.rs
// ============================================================================
// Module: Dispatch Core
// Description: Resolve, validate, execute, and record one tool invocation.
// Purpose: Single code path shared by every transport.
// Dependencies: secure-audit-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`Dispatcher::dispatch`] drives an [`Invocation`] through
//! received -> validated -> executing -> completed/failed and always returns
//! exactly one [`Response`]. Two log records bracket every invocation: a
//! "request received" record when it arrives and a "request completed"
//! record carrying the outcome, both tagged with the invocation id.
//!
//! Execution races the handler against the invocation deadline and the
//! connection's cancellation token. A cancelled call is reported as a
//! `TransportError`; store writes already in progress still finish.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::invocation::ExecutionContext;
use crate::invocation::Invocation;
use crate::invocation::Response;
use crate::invocation::ToolFailure;
use crate::observability::Observability;
use crate::registry::RegistryError;
use crate::registry::ToolRegistry;

// ============================================================================
// SECTION: Phases
// ============================================================================

/// Progress of an invocation through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DispatchPhase {
    /// Accepted from a transport.
    Received,
    /// Tool resolved and arguments accepted.
    Validated,
    /// Handler running.
    Executing,
    /// Handler returned a result.
    Completed,
    /// Invocation failed.
    Failed,
}

impl DispatchPhase {
    /// Returns the stable phase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Transport-agnostic invocation engine.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Frozen tool set.
    registry: Arc<ToolRegistry>,
    /// Log router.
    observability: Arc<Observability>,
    /// Per-invocation time budget.
    deadline: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    #[must_use]
    pub const fn new(
        registry: Arc<ToolRegistry>,
        observability: Arc<Observability>,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            observability,
            deadline,
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Returns the log router.
    #[must_use]
    pub fn observability(&self) -> &Arc<Observability> {
        &self.observability
    }

    /// Returns the per-invocation deadline.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Dispatches one invocation and returns its response.
    pub async fn dispatch(&self, invocation: &Invocation, cancel: &CancellationToken) -> Response {
        self.observability.emit(
            LogRecord::new(Component::Dispatch, LogLevel::Info, "request received")
                .with_correlation(invocation.id())
                .with_field("tool", invocation.tool_name())
                .with_field("transport", invocation.transport().as_str())
                .with_field("caller", invocation.caller())
                .with_field("phase", DispatchPhase::Received.as_str()),
        );

        let mut reached = DispatchPhase::Received;
        let outcome = self.execute(invocation, cancel, &mut reached).await;
        let duration_ms = invocation.elapsed_ms();

        let mut record = LogRecord::new(Component::Dispatch, LogLevel::Info, "request completed")
            .with_correlation(invocation.id())
            .with_field("tool", invocation.tool_name())
            .with_field("transport", invocation.transport().as_str());
        let response = match outcome {
            Ok(result) => {
                record = record
                    .with_field("status", "ok")
                    .with_field("duration_ms", duration_ms)
                    .with_field("phase", DispatchPhase::Completed.as_str());
                Response::ok(invocation.id(), result, duration_ms)
            }
            Err(failure) => {
                record.level = failure.log_level();
                record = record
                    .with_field("status", "error")
                    .with_field("duration_ms", duration_ms)
                    .with_field("phase", DispatchPhase::Failed.as_str())
                    .with_field("reached", reached.as_str())
                    .with_field("error_kind", failure.kind().as_str());
                if record.level == LogLevel::Error
                    && let Some(detail) = failure.detail()
                {
                    record = record.with_field("detail", detail);
                }
                Response::failed(invocation.id(), &failure, duration_ms)
            }
        };
        self.observability.emit(record);
        response
    }

    /// Resolves, validates, and runs the tool.
    async fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        reached: &mut DispatchPhase,
    ) -> Result<Value, ToolFailure> {
        let tool = self.registry.resolve(invocation.tool_name()).map_err(|err| match err {
            RegistryError::UnknownTool(name) => ToolFailure::UnknownTool(name),
            other => ToolFailure::execution(other.to_string()),
        })?;
        tool.contract().validate(invocation.arguments()).map_err(ToolFailure::Validation)?;
        *reached = DispatchPhase::Validated;

        let ctx = ExecutionContext::new(
            invocation,
            self.deadline,
            cancel,
            Arc::clone(&self.observability),
        );
        let handler = tool.handler();
        let budget_ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX);
        *reached = DispatchPhase::Executing;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ToolFailure::Cancelled),
            result = tokio::time::timeout_at(
                ctx.deadline(),
                handler.call(&ctx, invocation.arguments().clone()),
            ) => result.unwrap_or(Err(ToolFailure::Timeout(budget_ms))),
        }
    }
}

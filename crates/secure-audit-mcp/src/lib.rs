// crates/secure-audit-mcp/src/lib.rs
// ============================================================================
// Module: SecureAudit MCP Library
// Description: MCP server for audit-record tools.
// Purpose: Expose audit tools over pipe, HTTP, and event-stream transports.
// Dependencies: secure-audit-core, secure-audit-config, axum, tokio
// ============================================================================

//! ## Overview
//! This crate hosts the transport-agnostic dispatch engine and the adapters
//! around it. A frame arrives on a [`transport::Transport`], the
//! [`protocol::ProtocolHandler`] decodes the JSON-RPC envelope, the
//! [`dispatch::Dispatcher`] resolves the tool from the frozen
//! [`registry::ToolRegistry`], validates and runs it under a deadline, and
//! every step is recorded through [`observability::Observability`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod dispatch;
pub mod heartbeat;
pub mod invocation;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tools;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::Catalog;
pub use dispatch::DispatchPhase;
pub use dispatch::Dispatcher;
pub use heartbeat::HeartbeatMonitor;
pub use invocation::ErrorKind;
pub use invocation::ExecutionContext;
pub use invocation::Invocation;
pub use invocation::Response;
pub use invocation::ResponseStatus;
pub use invocation::ToolFailure;
pub use invocation::TransportKind;
pub use observability::LogSink;
pub use observability::Observability;
pub use protocol::ProtocolHandler;
pub use registry::ToolDescriptor;
pub use registry::ToolHandler;
pub use registry::ToolRegistry;
pub use registry::ToolRegistryBuilder;
pub use server::McpServer;
pub use server::McpServerError;
pub use tools::audit_tool_registry;

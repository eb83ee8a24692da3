// crates/secure-audit-core/src/lib.rs
// ============================================================================
// Module: SecureAudit Core Library
// Description: Public API surface for the SecureAudit core.
// Purpose: Expose audit record types, the audit store contract, and log records.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! SecureAudit core defines the audit record model, the backend-agnostic
//! [`AuditStore`] contract, and the structured [`LogRecord`] shape shared by
//! every transport and tool execution. It carries no transport or protocol
//! knowledge; the MCP crate layers dispatch and adapters on top.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use interfaces::AuditStore;
pub use interfaces::StoreError;
pub use runtime::InMemoryAuditStore;
pub use runtime::RecordWriteGuard;
pub use runtime::RecordWriteLocks;
pub use runtime::SharedAuditStore;

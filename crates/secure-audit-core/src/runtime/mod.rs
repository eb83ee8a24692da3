// crates/secure-audit-core/src/runtime/mod.rs
// ============================================================================
// Module: SecureAudit Runtime
// Description: In-memory audit store and per-record write locks.
// Purpose: Provide a dependency-free store and the write serialization
//          primitive shared with other backends.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod locks;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use locks::RecordWriteGuard;
pub use locks::RecordWriteLocks;
pub use store::InMemoryAuditStore;
pub use store::SharedAuditStore;

// crates/secure-audit-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Durable AuditStore backend using SQLite.
// Purpose: Persist audit records and their trail across restarts.
// Dependencies: secure-audit-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`AuditStore`](secure_audit_core::AuditStore)
//! implementation. Records live in an `audits` table; every create, update,
//! and delete appends a row to `audit_trail` in the same transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::DEFAULT_READ_POOL_SIZE;
pub use store::SqliteAuditStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;

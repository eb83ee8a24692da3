// crates/secure-audit-config/src/lib.rs
// ============================================================================
// Module: SecureAudit Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for secure-audit.toml semantics.
// Dependencies: secure-audit-core, secure-audit-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `secure-audit-config` defines the configuration model for the SecureAudit
//! MCP server: enabled transports, dispatch deadlines, the audit store
//! backend, and log destinations. Loading is strict: unknown keys, oversized
//! files, and out-of-range values are rejected before the server starts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;

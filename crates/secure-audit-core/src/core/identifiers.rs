// crates/secure-audit-core/src/core/identifiers.rs
// ============================================================================
// Module: SecureAudit Identifiers
// Description: Typed identifiers for audit records and tool invocations.
// Purpose: Keep record ids and correlation ids from being mixed up.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Audit records are keyed by a store-assigned integer; invocations are keyed
//! by a random UUID v4 generated at receipt. The invocation id doubles as the
//! correlation id on every log record an invocation produces.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Audit Identifier
// ============================================================================

/// Store-assigned identifier for an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(i64);

impl AuditId {
    /// Creates an audit identifier from its raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for AuditId {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl FromStr for AuditId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Self)
    }
}

// ============================================================================
// SECTION: Invocation Identifier
// ============================================================================

/// Unique identifier assigned to each tool invocation at receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a fresh random invocation identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// crates/secure-audit-core/src/core/mod.rs
// ============================================================================
// Module: SecureAudit Core Types
// Description: Canonical audit record, identifier, time, and log structures.
// Purpose: Provide stable, serializable types for audit tools and logs.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Core types are the canonical source of truth for the tool payloads
//! exchanged over every transport and for the records written by the
//! observability sinks.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod logging;
pub mod record;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::AuditId;
pub use identifiers::InvocationId;
pub use logging::Component;
pub use logging::LogLevel;
pub use logging::LogRecord;
pub use record::AuditFilter;
pub use record::AuditPriority;
pub use record::AuditRecord;
pub use record::AuditStatistics;
pub use record::AuditStatus;
pub use record::AuditTrailEntry;
pub use record::AuditUpdate;
pub use record::DEFAULT_LIST_LIMIT;
pub use record::MAX_LIST_LIMIT;
pub use record::MAX_LIST_OFFSET;
pub use record::MonthlyCount;
pub use record::NewAuditRecord;
pub use record::StatisticsPeriod;
pub use record::TREND_WINDOW_DAYS;
pub use record::TrailAction;
pub use record::UNASSIGNED_AUDITOR;
pub use time::Timestamp;

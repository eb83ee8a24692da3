// crates/secure-audit-core/src/interfaces/mod.rs
// ============================================================================
// Module: SecureAudit Interfaces
// Description: Backend-agnostic audit store contract.
// Purpose: Let tools manage audit records without knowing the storage engine.
// Dependencies: thiserror, crate::core
// ============================================================================

//! ## Overview
//! [`AuditStore`] is the CRUD contract audit tools call. Implementations own
//! persistence, assign record ids, append an audit trail entry for every
//! mutation, and serialize writes per record id. Calls are synchronous; async
//! callers are expected to run them on a blocking-capable thread.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AuditFilter;
use crate::core::AuditId;
use crate::core::AuditRecord;
use crate::core::AuditStatistics;
use crate::core::AuditTrailEntry;
use crate::core::AuditUpdate;
use crate::core::NewAuditRecord;
use crate::core::StatisticsPeriod;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("audit store io error: {0}")]
    Io(String),
    /// Store reported an error.
    #[error("audit store error: {0}")]
    Store(String),
    /// Stored data is invalid.
    #[error("audit store invalid data: {0}")]
    Invalid(String),
    /// Input violates a store constraint.
    #[error("audit store constraint violated: {0}")]
    Constraint(String),
    /// Record does not exist.
    #[error("audit record not found: {0}")]
    NotFound(AuditId),
    /// Store is not reachable.
    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Persistence contract for audit records.
pub trait AuditStore {
    /// Creates a record and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] when the title is empty and other
    /// variants when persistence fails.
    fn create(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError>;

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StoreError>;

    /// Lists records matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError>;

    /// Applies a partial update and returns the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent and
    /// [`StoreError::Constraint`] when the update is empty.
    fn update(
        &self,
        id: AuditId,
        update: &AuditUpdate,
        actor: &str,
    ) -> Result<AuditRecord, StoreError>;

    /// Deletes a record and returns its final state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent.
    fn delete(&self, id: AuditId, actor: &str) -> Result<AuditRecord, StoreError>;

    /// Computes aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn statistics(&self, period: StatisticsPeriod) -> Result<AuditStatistics, StoreError>;

    /// Returns the trail of a record, oldest first. Trails survive deletion.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn trail(&self, id: AuditId) -> Result<Vec<AuditTrailEntry>, StoreError>;
}

/// Checks the invariants shared by every backend for new records.
///
/// # Errors
///
/// Returns [`StoreError::Constraint`] when the title is blank.
pub fn check_new_record(record: &NewAuditRecord) -> Result<(), StoreError> {
    if record.title.trim().is_empty() {
        return Err(StoreError::Constraint("title must not be empty".to_string()));
    }
    Ok(())
}

/// Checks the invariants shared by every backend for updates.
///
/// # Errors
///
/// Returns [`StoreError::Constraint`] when the update sets no field or blanks
/// the title.
pub fn check_update(update: &AuditUpdate) -> Result<(), StoreError> {
    if update.is_empty() {
        return Err(StoreError::Constraint("no fields to update".to_string()));
    }
    if update.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(StoreError::Constraint("title must not be empty".to_string()));
    }
    Ok(())
}

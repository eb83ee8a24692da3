// crates/secure-audit-core/src/runtime/store.rs
// ============================================================================
// Module: SecureAudit In-Memory Store
// Description: Process-local audit store and the shared store wrapper.
// Purpose: Run the server without external storage and back unit tests.
// Dependencies: serde_json, crate::core, crate::interfaces, crate::runtime::locks
// ============================================================================

//! ## Overview
//! [`InMemoryAuditStore`] keeps records and their trail in a mutex-protected
//! map. It follows the same rules as the SQLite backend: titles must be
//! non-empty, updates must set at least one field, and every mutation
//! appends a trail entry. Contents are lost when the process exits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Value;

use crate::core::AuditFilter;
use crate::core::AuditId;
use crate::core::AuditRecord;
use crate::core::AuditStatistics;
use crate::core::AuditTrailEntry;
use crate::core::AuditUpdate;
use crate::core::NewAuditRecord;
use crate::core::StatisticsPeriod;
use crate::core::Timestamp;
use crate::core::TrailAction;
use crate::interfaces::AuditStore;
use crate::interfaces::StoreError;
use crate::interfaces::check_new_record;
use crate::interfaces::check_update;
use crate::runtime::locks::RecordWriteLocks;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutable store contents.
#[derive(Debug, Default)]
struct StoreState {
    /// Records keyed by id.
    records: BTreeMap<AuditId, AuditRecord>,
    /// Trail entries in append order.
    trail: Vec<AuditTrailEntry>,
    /// Last assigned record id.
    last_id: i64,
    /// Last assigned trail id.
    last_trail_id: i64,
}

impl StoreState {
    /// Appends a trail entry.
    fn push_trail(
        &mut self,
        audit_id: AuditId,
        action: TrailAction,
        actor: &str,
        old_values: Option<Value>,
        new_values: Option<Value>,
        timestamp: Timestamp,
    ) {
        self.last_trail_id += 1;
        self.trail.push(AuditTrailEntry {
            id: self.last_trail_id,
            audit_id,
            action,
            actor: actor.to_string(),
            old_values,
            new_values,
            timestamp,
        });
    }
}

/// In-memory audit store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    /// Store contents protected by a mutex.
    state: Arc<Mutex<StoreState>>,
    /// Per-record write locks.
    locks: RecordWriteLocks,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.records.len())
    }

    /// Returns true when the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the store mutex is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("audit store mutex poisoned".to_string()))
    }
}

impl AuditStore for InMemoryAuditStore {
    fn create(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        check_new_record(&record)?;
        let now = Timestamp::now();
        let mut state = self.lock()?;
        state.last_id += 1;
        let id = AuditId::new(state.last_id);
        let actor = record.created_by.clone();
        let created = record.into_record(id, now);
        let snapshot = serde_json::to_value(&created)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        state.records.insert(id, created.clone());
        state.push_trail(id, TrailAction::Create, &actor, None, Some(snapshot), now);
        drop(state);
        Ok(created)
    }

    fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StoreError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        let mut records: Vec<AuditRecord> = {
            let state = self.lock()?;
            state.records.values().filter(|record| filter.matches(record)).cloned().collect()
        };
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records.into_iter().skip(filter.offset).take(filter.limit).collect())
    }

    fn update(
        &self,
        id: AuditId,
        update: &AuditUpdate,
        actor: &str,
    ) -> Result<AuditRecord, StoreError> {
        check_update(update)?;
        let _guard = self.locks.acquire(id);
        let mut record = self.lock()?.records.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        let now = Timestamp::now();
        let (old_values, new_values) = update.apply(&mut record, now);
        let mut state = self.lock()?;
        state.records.insert(id, record.clone());
        state.push_trail(id, TrailAction::Update, actor, Some(old_values), Some(new_values), now);
        drop(state);
        Ok(record)
    }

    fn delete(&self, id: AuditId, actor: &str) -> Result<AuditRecord, StoreError> {
        let _guard = self.locks.acquire(id);
        let mut state = self.lock()?;
        let removed = state.records.remove(&id).ok_or(StoreError::NotFound(id))?;
        let snapshot = serde_json::to_value(&removed)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        state.push_trail(id, TrailAction::Delete, actor, Some(snapshot), None, Timestamp::now());
        drop(state);
        Ok(removed)
    }

    fn statistics(&self, period: StatisticsPeriod) -> Result<AuditStatistics, StoreError> {
        let state = self.lock()?;
        Ok(AuditStatistics::from_records(state.records.values(), period, Timestamp::now()))
    }

    fn trail(&self, id: AuditId) -> Result<Vec<AuditTrailEntry>, StoreError> {
        let state = self.lock()?;
        Ok(state.trail.iter().filter(|entry| entry.audit_id == id).cloned().collect())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared audit store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedAuditStore {
    /// Inner store implementation.
    inner: Arc<dyn AuditStore + Send + Sync>,
}

impl SharedAuditStore {
    /// Wraps an audit store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl AuditStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn AuditStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl std::fmt::Debug for SharedAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAuditStore").finish_non_exhaustive()
    }
}

impl AuditStore for SharedAuditStore {
    fn create(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        self.inner.create(record)
    }

    fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StoreError> {
        self.inner.get(id)
    }

    fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.list(filter)
    }

    fn update(
        &self,
        id: AuditId,
        update: &AuditUpdate,
        actor: &str,
    ) -> Result<AuditRecord, StoreError> {
        self.inner.update(id, update, actor)
    }

    fn delete(&self, id: AuditId, actor: &str) -> Result<AuditRecord, StoreError> {
        self.inner.delete(id, actor)
    }

    fn statistics(&self, period: StatisticsPeriod) -> Result<AuditStatistics, StoreError> {
        self.inner.statistics(period)
    }

    fn trail(&self, id: AuditId) -> Result<Vec<AuditTrailEntry>, StoreError> {
        self.inner.trail(id)
    }
}

// crates/secure-audit-core/src/runtime/locks.rs
// ============================================================================
// Module: Record Write Locks
// Description: Keyed exclusive locks over audit record ids.
// Purpose: Serialize concurrent writes to the same record while letting
//          writes to different records proceed in parallel.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`RecordWriteLocks`] holds the set of record ids currently being written.
//! [`RecordWriteLocks::acquire`] blocks until the id is free, then returns a
//! guard that releases it on drop. Reads never take these locks. Poisoned
//! state is recovered because the guarded set cannot be left inconsistent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::core::AuditId;

// ============================================================================
// SECTION: Locks
// ============================================================================

/// Shared state behind [`RecordWriteLocks`].
#[derive(Debug, Default)]
struct LockTable {
    /// Ids currently held.
    held: Mutex<HashSet<AuditId>>,
    /// Signalled whenever an id is released.
    released: Condvar,
}

/// Per-record exclusive write locks.
#[derive(Debug, Clone, Default)]
pub struct RecordWriteLocks {
    /// Shared lock table.
    table: Arc<LockTable>,
}

impl RecordWriteLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `id` is free and claims it.
    #[must_use = "the lock is released as soon as the guard is dropped"]
    pub fn acquire(&self, id: AuditId) -> RecordWriteGuard {
        let mut held = self.lock_held();
        while held.contains(&id) {
            held = self.table.released.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(id);
        drop(held);
        RecordWriteGuard {
            table: Arc::clone(&self.table),
            id,
        }
    }

    /// Returns true when `id` is currently held.
    #[must_use]
    pub fn is_held(&self, id: AuditId) -> bool {
        self.lock_held().contains(&id)
    }

    /// Locks the held-id set, recovering from poisoning.
    fn lock_held(&self) -> MutexGuard<'_, HashSet<AuditId>> {
        self.table.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard that releases a record write lock when dropped.
#[derive(Debug)]
pub struct RecordWriteGuard {
    /// Lock table the id belongs to.
    table: Arc<LockTable>,
    /// Claimed record id.
    id: AuditId,
}

impl RecordWriteGuard {
    /// Returns the locked record id.
    #[must_use]
    pub const fn id(&self) -> AuditId {
        self.id
    }
}

impl Drop for RecordWriteGuard {
    fn drop(&mut self) {
        let mut held = self.table.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.id);
        drop(held);
        self.table.released.notify_all();
    }
}

// crates/secure-audit-core/tests/record_locks.rs
// ============================================================================
// Module: Record Write Lock Tests
// Description: Exclusion and independence of per-record write locks.
// Purpose: Ensure same-id writers serialize and different ids do not.
// Dependencies: secure-audit-core
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use secure_audit_core::AuditId;
use secure_audit_core::AuditStatus;
use secure_audit_core::AuditStore;
use secure_audit_core::AuditUpdate;
use secure_audit_core::InMemoryAuditStore;
use secure_audit_core::NewAuditRecord;
use secure_audit_core::RecordWriteLocks;

#[test]
fn same_id_blocks_until_released() {
    let locks = RecordWriteLocks::new();
    let guard = locks.acquire(AuditId::new(7));
    assert!(locks.is_held(AuditId::new(7)));

    let (tx, rx) = mpsc::channel();
    let contender = locks.clone();
    let handle = thread::spawn(move || {
        let _guard = contender.acquire(AuditId::new(7));
        tx.send(()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(guard);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    handle.join().unwrap();
    assert!(!locks.is_held(AuditId::new(7)));
}

#[test]
fn different_ids_do_not_block() {
    let locks = RecordWriteLocks::new();
    let _guard = locks.acquire(AuditId::new(1));

    let (tx, rx) = mpsc::channel();
    let other = locks.clone();
    let handle = thread::spawn(move || {
        let guard = other.acquire(AuditId::new(2));
        tx.send(guard.id()).unwrap();
    });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), AuditId::new(2));
    handle.join().unwrap();
}

#[test]
fn concurrent_updates_to_one_record_are_all_recorded() {
    let store = Arc::new(InMemoryAuditStore::new());
    let created = store.create(NewAuditRecord::titled("shared")).unwrap();
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0 .. writers)
        .map(|index| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let update = AuditUpdate {
                    notes: Some(format!("writer {index}")),
                    status: Some(AuditStatus::InProgress),
                    ..AuditUpdate::default()
                };
                store.update(created.id, &update, "writer").unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let trail = store.trail(created.id).unwrap();
    assert_eq!(trail.len(), writers + 1);
    let last_note = trail.last().unwrap().new_values.as_ref().unwrap()["notes"].clone();
    let stored = store.get(created.id).unwrap().unwrap();
    assert_eq!(stored.notes.as_deref(), last_note.as_str());
}

// crates/secure-audit-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Audit Store Tests
// Description: Validate SQLite AuditStore behavior.
// Purpose: Ensure durable persistence, trail recording, and schema checks.
// Dependencies: secure-audit-store-sqlite, secure-audit-core, rusqlite, tempfile
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use secure_audit_core::AuditFilter;
use secure_audit_core::AuditId;
use secure_audit_core::AuditPriority;
use secure_audit_core::AuditStatus;
use secure_audit_core::AuditStore;
use secure_audit_core::AuditUpdate;
use secure_audit_core::NewAuditRecord;
use secure_audit_core::StatisticsPeriod;
use secure_audit_core::StoreError;
use secure_audit_core::TrailAction;
use secure_audit_store_sqlite::SqliteAuditStore;
use secure_audit_store_sqlite::SqliteStoreConfig;
use secure_audit_store_sqlite::SqliteStoreError;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_store(dir: &TempDir) -> SqliteAuditStore {
    SqliteAuditStore::new(&SqliteStoreConfig::at(dir.path().join("audits.db"))).unwrap()
}

fn sample(title: &str, auditor: &str, due: &str) -> NewAuditRecord {
    NewAuditRecord {
        description: format!("{title} description"),
        due_date: Some(due.to_string()),
        priority: AuditPriority::High,
        assigned_auditor: Some(auditor.to_string()),
        department: Some("finance".to_string()),
        created_by: "tester".to_string(),
        ..NewAuditRecord::titled(title)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let created = {
        let store = open_store(&dir);
        store.create(sample("Payroll", "alice", "2026-03-01")).unwrap()
    };
    let store = open_store(&dir);
    let loaded = store.get(created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.priority, AuditPriority::High);
}

#[test]
fn list_applies_filters_in_sql() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.create(sample("Payroll review", "alice", "2026-01-10")).unwrap();
    store.create(sample("Vendor contracts", "bob", "2026-02-15")).unwrap();
    store.create(sample("Payroll follow-up", "alice", "2026-03-20")).unwrap();

    let filter = AuditFilter {
        assigned_auditor: Some("alice".to_string()),
        date_to: Some("2026-02-28".to_string()),
        ..AuditFilter::default()
    };
    let hits = store.list(&filter).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Payroll review");

    let search = AuditFilter {
        search: Some("payroll".to_string()),
        ..AuditFilter::default()
    };
    let hits = store.list(&search).unwrap();
    let ids: Vec<i64> = hits.iter().map(|record| record.id.get()).collect();
    assert_eq!(ids, vec![3, 1]);

    let paged = AuditFilter {
        limit: 1,
        offset: 2,
        ..AuditFilter::default()
    };
    let hits = store.list(&paged).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, AuditId::new(1));
}

#[test]
fn update_and_delete_write_trail_rows() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let created = store.create(sample("Inventory", "alice", "2026-04-01")).unwrap();
    let update = AuditUpdate {
        status: Some(AuditStatus::Completed),
        assigned_auditor: Some("bob".to_string()),
        ..AuditUpdate::default()
    };
    let updated = store.update(created.id, &update, "carol").unwrap();
    assert_eq!(updated.status, AuditStatus::Completed);
    assert_eq!(store.get(created.id).unwrap().unwrap().assigned_auditor.as_deref(), Some("bob"));

    store.delete(created.id, "dave").unwrap();
    assert!(store.get(created.id).unwrap().is_none());

    let trail = store.trail(created.id).unwrap();
    let actions: Vec<TrailAction> = trail.iter().map(|entry| entry.action).collect();
    assert_eq!(actions, vec![TrailAction::Create, TrailAction::Update, TrailAction::Delete]);
    assert_eq!(trail[1].old_values.as_ref().unwrap()["assigned_auditor"], "alice");
    assert_eq!(trail[1].new_values.as_ref().unwrap()["assigned_auditor"], "bob");
    assert_eq!(trail[2].actor, "dave");
    assert!(trail[2].new_values.is_none());
}

#[test]
fn missing_records_report_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let update = AuditUpdate {
        notes: Some("n".to_string()),
        ..AuditUpdate::default()
    };
    assert_eq!(
        store.update(AuditId::new(42), &update, "x").unwrap_err(),
        StoreError::NotFound(AuditId::new(42))
    );
    assert_eq!(
        store.delete(AuditId::new(42), "x").unwrap_err(),
        StoreError::NotFound(AuditId::new(42))
    );
    assert!(matches!(
        store.update(AuditId::new(42), &AuditUpdate::default(), "x"),
        Err(StoreError::Constraint(_))
    ));
}

#[test]
fn statistics_group_by_status_and_auditor() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.create(sample("a", "alice", "2026-01-01")).unwrap();
    store.create(sample("b", "alice", "2026-01-02")).unwrap();
    store.create(NewAuditRecord::titled("c")).unwrap();

    let stats = store.statistics(StatisticsPeriod::Quarter).unwrap();
    assert_eq!(stats.total_audits, 3);
    assert_eq!(stats.recent_audits, 3);
    assert_eq!(stats.status_breakdown.get("open"), Some(&3));
    assert_eq!(stats.auditor_workload.get("alice"), Some(&2));
    assert_eq!(stats.auditor_workload.get("unassigned"), Some(&1));
    assert_eq!(stats.monthly_trend.iter().map(|month| month.count).sum::<u64>(), 3);
}

#[test]
fn rejects_unknown_schema_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audits.db");
    drop(open_store(&dir));
    let connection = rusqlite::Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);
    let err = SqliteAuditStore::new(&SqliteStoreConfig::at(path)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn rejects_directory_path() {
    let dir = TempDir::new().unwrap();
    let err = SqliteAuditStore::new(&SqliteStoreConfig::at(dir.path())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn reads_proceed_during_an_open_write_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let committed = store.create(sample("Committed", "alice", "2026-02-01")).unwrap();

    let writer = rusqlite::Connection::open(dir.path().join("audits.db")).unwrap();
    writer.execute_batch("BEGIN IMMEDIATE;").unwrap();
    writer
        .execute(
            "INSERT INTO audits (title, created_by, created_at, updated_at) VALUES ('Pending', 'raw', 0, 0)",
            [],
        )
        .unwrap();

    let started = std::time::Instant::now();
    let listed = store.list(&AuditFilter::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(store.get(committed.id).unwrap().unwrap().title, "Committed");
    assert_eq!(store.trail(committed.id).unwrap().len(), 1);
    assert_eq!(store.statistics(StatisticsPeriod::Month).unwrap().total_audits, 1);
    assert!(started.elapsed() < std::time::Duration::from_secs(2));

    writer.execute_batch("COMMIT;").unwrap();
    assert_eq!(store.list(&AuditFilter::default()).unwrap().len(), 2);
}

#[test]
fn rejects_empty_read_pool() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig {
        read_pool_size: 0,
        ..SqliteStoreConfig::at(dir.path().join("audits.db"))
    };
    let err = SqliteAuditStore::new(&config).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn search_treats_wildcard_characters_literally() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    for title in ["100% coverage", "1000 samples", "cash_count", "cashxcount", "back\\slash"] {
        store.create(NewAuditRecord::titled(title)).unwrap();
    }
    let search = |term: &str| {
        let filter = AuditFilter {
            search: Some(term.to_string()),
            ..AuditFilter::default()
        };
        store.list(&filter).unwrap().into_iter().map(|record| record.title).collect::<Vec<_>>()
    };
    assert_eq!(search("0%"), vec!["100% coverage"]);
    assert_eq!(search("h_c"), vec!["cash_count"]);
    assert_eq!(search("k\\s"), vec!["back\\slash"]);
}

// crates/secure-audit-core/tests/in_memory_store.rs
// ============================================================================
// Module: In-Memory Audit Store Tests
// Description: CRUD, filtering, statistics, and trail behavior.
// Purpose: Pin the store contract against the reference backend.
// Dependencies: secure-audit-core
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

use secure_audit_core::AuditFilter;
use secure_audit_core::AuditId;
use secure_audit_core::AuditStatus;
use secure_audit_core::AuditStore;
use secure_audit_core::AuditUpdate;
use secure_audit_core::InMemoryAuditStore;
use secure_audit_core::NewAuditRecord;
use secure_audit_core::SharedAuditStore;
use secure_audit_core::StatisticsPeriod;
use secure_audit_core::StoreError;
use secure_audit_core::TrailAction;

fn new_record(title: &str, auditor: Option<&str>, due: Option<&str>) -> NewAuditRecord {
    NewAuditRecord {
        assigned_auditor: auditor.map(str::to_string),
        due_date: due.map(str::to_string),
        created_by: "tester".to_string(),
        ..NewAuditRecord::titled(title)
    }
}

#[test]
fn create_assigns_sequential_ids_and_defaults() {
    let store = InMemoryAuditStore::new();
    let first = store.create(NewAuditRecord::titled("first")).unwrap();
    let second = store.create(NewAuditRecord::titled("second")).unwrap();
    assert_eq!(first.id, AuditId::new(1));
    assert_eq!(second.id, AuditId::new(2));
    assert_eq!(first.status, AuditStatus::Open);
    assert_eq!(first.created_at, first.updated_at);
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn create_rejects_blank_title() {
    let store = InMemoryAuditStore::new();
    let err = store.create(NewAuditRecord::titled("   ")).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    assert!(store.is_empty().unwrap());
}

#[test]
fn list_filters_by_auditor_date_and_search() {
    let store = InMemoryAuditStore::new();
    store.create(new_record("Payroll review", Some("alice"), Some("2026-01-10"))).unwrap();
    store.create(new_record("Vendor contracts", Some("bob"), Some("2026-02-15"))).unwrap();
    store.create(new_record("Payroll follow-up", Some("alice"), None)).unwrap();

    let by_auditor = store
        .list(&AuditFilter {
            assigned_auditor: Some("alice".to_string()),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_auditor.len(), 2);

    let by_date = store
        .list(&AuditFilter {
            date_from: Some("2026-02-01".to_string()),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_date.len(), 1);
    assert_eq!(by_date[0].title, "Vendor contracts");

    let by_search = store
        .list(&AuditFilter {
            search: Some("PAYROLL".to_string()),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_search.len(), 2);
}

#[test]
fn list_returns_newest_first_and_pages() {
    let store = InMemoryAuditStore::new();
    for index in 0 .. 5 {
        store.create(NewAuditRecord::titled(format!("audit {index}"))).unwrap();
    }
    let page = store
        .list(&AuditFilter {
            limit: 2,
            offset: 1,
            ..AuditFilter::default()
        })
        .unwrap();
    let ids: Vec<i64> = page.iter().map(|record| record.id.get()).collect();
    assert_eq!(ids, vec![4, 3]);
}

#[test]
fn update_applies_fields_and_records_trail() {
    let store = InMemoryAuditStore::new();
    let created = store.create(new_record("Inventory", None, None)).unwrap();
    let update = AuditUpdate {
        status: Some(AuditStatus::InProgress),
        notes: Some("started".to_string()),
        ..AuditUpdate::default()
    };
    let updated = store.update(created.id, &update, "carol").unwrap();
    assert_eq!(updated.status, AuditStatus::InProgress);
    assert_eq!(updated.notes.as_deref(), Some("started"));
    assert!(updated.updated_at >= created.updated_at);

    let trail = store.trail(created.id).unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, TrailAction::Create);
    assert_eq!(trail[0].actor, "tester");
    assert_eq!(trail[1].action, TrailAction::Update);
    assert_eq!(trail[1].actor, "carol");
    let old = trail[1].old_values.as_ref().unwrap();
    assert_eq!(old["status"], "open");
    let new = trail[1].new_values.as_ref().unwrap();
    assert_eq!(new["status"], "in_progress");
}

#[test]
fn update_rejects_empty_and_missing() {
    let store = InMemoryAuditStore::new();
    let created = store.create(NewAuditRecord::titled("x")).unwrap();
    let err = store.update(created.id, &AuditUpdate::default(), "carol").unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));

    let update = AuditUpdate {
        title: Some("y".to_string()),
        ..AuditUpdate::default()
    };
    let err = store.update(AuditId::new(99), &update, "carol").unwrap_err();
    assert_eq!(err, StoreError::NotFound(AuditId::new(99)));
}

#[test]
fn delete_removes_record_but_keeps_trail() {
    let store = InMemoryAuditStore::new();
    let created = store.create(NewAuditRecord::titled("x")).unwrap();
    let removed = store.delete(created.id, "dave").unwrap();
    assert_eq!(removed.id, created.id);
    assert!(store.get(created.id).unwrap().is_none());
    let trail = store.trail(created.id).unwrap();
    assert_eq!(trail.last().unwrap().action, TrailAction::Delete);
    assert!(matches!(store.delete(created.id, "dave"), Err(StoreError::NotFound(_))));
}

#[test]
fn statistics_counts_status_auditor_and_trend() {
    let store = SharedAuditStore::from_store(InMemoryAuditStore::new());
    store.create(new_record("a", Some("alice"), None)).unwrap();
    store.create(new_record("b", Some("alice"), None)).unwrap();
    let c = store.create(new_record("c", None, None)).unwrap();
    let update = AuditUpdate {
        status: Some(AuditStatus::Completed),
        ..AuditUpdate::default()
    };
    store.update(c.id, &update, "tester").unwrap();

    let stats = store.statistics(StatisticsPeriod::Week).unwrap();
    assert_eq!(stats.total_audits, 3);
    assert_eq!(stats.status_breakdown.get("open"), Some(&2));
    assert_eq!(stats.status_breakdown.get("completed"), Some(&1));
    assert_eq!(stats.auditor_workload.get("alice"), Some(&2));
    assert_eq!(stats.auditor_workload.get("unassigned"), Some(&1));
    assert_eq!(stats.recent_audits, 3);
    assert_eq!(stats.monthly_trend.len(), 1);
    assert_eq!(stats.monthly_trend[0].count, 3);
    assert_eq!(stats.period, StatisticsPeriod::Week);
}

#[test]
fn search_treats_wildcard_characters_literally() {
    let store = InMemoryAuditStore::new();
    for title in ["100% coverage", "1000 samples", "cash_count", "cashxcount"] {
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
}

// crates/secure-audit-core/src/core/record.rs
// ============================================================================
// Module: SecureAudit Records
// Description: Audit record model, store inputs, filters, and statistics.
// Purpose: Define the payloads exchanged between audit tools and stores.
// Dependencies: serde, serde_json, crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! An [`AuditRecord`] is owned by an audit store; tools only ever see it
//! through store calls. Mutations are expressed as [`NewAuditRecord`] and
//! [`AuditUpdate`] values so both store backends apply the same rules, and
//! every mutation produces an [`AuditTrailEntry`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::AuditId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default page size for audit listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Maximum page size for audit listings.
pub const MAX_LIST_LIMIT: usize = 1000;
/// Largest accepted listing offset; fits every backend's integer type.
pub const MAX_LIST_OFFSET: usize = 1_000_000_000;

// ============================================================================
// SECTION: Status and Priority
// ============================================================================

/// Lifecycle status of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Audit is open and not yet started.
    #[default]
    Open,
    /// Audit work is underway.
    InProgress,
    /// Audit work has finished.
    Completed,
    /// Audit is closed out.
    Closed,
    /// Audit was cancelled.
    Cancelled,
}

impl AuditStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 5] =
        [Self::Open, Self::InProgress, Self::Completed, Self::Closed, Self::Cancelled];

    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status label, falling back to [`AuditStatus::Open`] for
    /// anything unrecognized.
    #[must_use]
    pub fn parse_or_open(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| format!("unknown audit status: {value}"))
    }
}

/// Priority assigned to an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
}

impl AuditPriority {
    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for AuditPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditPriority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown audit priority: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Audit Record
// ============================================================================

/// Persisted audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned identifier.
    pub id: AuditId,
    /// Short audit title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Due date as `YYYY-MM-DD`.
    pub due_date: Option<String>,
    /// Lifecycle status.
    pub status: AuditStatus,
    /// Priority.
    pub priority: AuditPriority,
    /// Department under audit.
    pub department: Option<String>,
    /// Auditor responsible for the audit.
    pub assigned_auditor: Option<String>,
    /// Working notes.
    pub notes: Option<String>,
    /// Principal that created the record.
    pub created_by: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

/// Input for creating an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewAuditRecord {
    /// Short audit title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Due date as `YYYY-MM-DD`.
    #[serde(default)]
    pub due_date: Option<String>,
    /// Initial status.
    #[serde(default)]
    pub status: AuditStatus,
    /// Priority.
    #[serde(default)]
    pub priority: AuditPriority,
    /// Department under audit.
    #[serde(default)]
    pub department: Option<String>,
    /// Auditor responsible for the audit.
    #[serde(default)]
    pub assigned_auditor: Option<String>,
    /// Working notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Principal creating the record.
    #[serde(default)]
    pub created_by: String,
}

impl NewAuditRecord {
    /// Creates an input with only a title set.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Materializes the record with a store-assigned id and timestamp.
    #[must_use]
    pub fn into_record(self, id: AuditId, now: Timestamp) -> AuditRecord {
        AuditRecord {
            id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            status: self.status,
            priority: self.priority,
            department: self.department,
            assigned_auditor: self.assigned_auditor,
            notes: self.notes,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied to an existing audit record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditUpdate {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AuditStatus>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<AuditPriority>,
    /// New department.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// New assigned auditor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_auditor: Option<String>,
    /// New notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AuditUpdate {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.department.is_none()
            && self.assigned_auditor.is_none()
            && self.notes.is_none()
    }

    /// Applies the update to `record` and returns the prior and new values of
    /// every field it touched, keyed by field name.
    pub fn apply(&self, record: &mut AuditRecord, now: Timestamp) -> (Value, Value) {
        let mut old_values = Map::new();
        let mut new_values = Map::new();
        let mut track = |field: &str, old: Value, new: Value| {
            old_values.insert(field.to_string(), old);
            new_values.insert(field.to_string(), new);
        };
        if let Some(title) = &self.title {
            track("title", Value::from(record.title.clone()), Value::from(title.clone()));
            record.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            track(
                "description",
                Value::from(record.description.clone()),
                Value::from(description.clone()),
            );
            record.description.clone_from(description);
        }
        if let Some(due_date) = &self.due_date {
            track("due_date", Value::from(record.due_date.clone()), Value::from(due_date.clone()));
            record.due_date = Some(due_date.clone());
        }
        if let Some(status) = self.status {
            track("status", Value::from(record.status.as_str()), Value::from(status.as_str()));
            record.status = status;
        }
        if let Some(priority) = self.priority {
            track("priority", Value::from(record.priority.as_str()), Value::from(priority.as_str()));
            record.priority = priority;
        }
        if let Some(department) = &self.department {
            track(
                "department",
                Value::from(record.department.clone()),
                Value::from(department.clone()),
            );
            record.department = Some(department.clone());
        }
        if let Some(auditor) = &self.assigned_auditor {
            track(
                "assigned_auditor",
                Value::from(record.assigned_auditor.clone()),
                Value::from(auditor.clone()),
            );
            record.assigned_auditor = Some(auditor.clone());
        }
        if let Some(notes) = &self.notes {
            track("notes", Value::from(record.notes.clone()), Value::from(notes.clone()));
            record.notes = Some(notes.clone());
        }
        record.updated_at = now;
        (Value::Object(old_values), Value::Object(new_values))
    }
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Listing filter for audit records.
///
/// Date bounds compare against `due_date` and are inclusive; records without a
/// due date never match a bounded filter. `search` is a case-insensitive
/// substring match over title, description, and notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Required status.
    #[serde(default)]
    pub status: Option<AuditStatus>,
    /// Required assigned auditor.
    #[serde(default)]
    pub assigned_auditor: Option<String>,
    /// Required department.
    #[serde(default)]
    pub department: Option<String>,
    /// Inclusive lower bound on `due_date`.
    #[serde(default)]
    pub date_from: Option<String>,
    /// Inclusive upper bound on `due_date`.
    #[serde(default)]
    pub date_to: Option<String>,
    /// Free-text search term.
    #[serde(default)]
    pub search: Option<String>,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Records to skip.
    #[serde(default)]
    pub offset: usize,
}

/// Serde default for [`AuditFilter::limit`].
const fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            status: None,
            assigned_auditor: None,
            department: None,
            date_from: None,
            date_to: None,
            search: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl AuditFilter {
    /// Returns true when `record` satisfies every predicate of the filter.
    /// Paging is not considered.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if self.status.is_some_and(|status| status != record.status) {
            return false;
        }
        if let Some(auditor) = &self.assigned_auditor
            && record.assigned_auditor.as_deref() != Some(auditor.as_str())
        {
            return false;
        }
        if let Some(department) = &self.department
            && record.department.as_deref() != Some(department.as_str())
        {
            return false;
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(due) = record.due_date.as_deref() else {
                return false;
            };
            if self.date_from.as_deref().is_some_and(|from| due < from) {
                return false;
            }
            if self.date_to.as_deref().is_some_and(|to| due > to) {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = record.title.to_lowercase().contains(&term)
                || record.description.to_lowercase().contains(&term)
                || record.notes.as_deref().is_some_and(|notes| notes.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// SECTION: Statistics
// ============================================================================

/// Look-back window for audit statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsPeriod {
    /// Last 7 days.
    Week,
    /// Last 30 days.
    #[default]
    Month,
    /// Last 90 days.
    Quarter,
    /// Last 365 days.
    Year,
}

impl StatisticsPeriod {
    /// Returns the window length in days.
    #[must_use]
    pub const fn days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        }
    }

    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }
}

impl FromStr for StatisticsPeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            other => Err(format!("unknown statistics period: {other}")),
        }
    }
}

/// Bucket key used for records with no assigned auditor.
pub const UNASSIGNED_AUDITOR: &str = "unassigned";
/// Days covered by the monthly creation trend.
pub const TREND_WINDOW_DAYS: i64 = 365;

/// Count of audits created in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    /// Month as `YYYY-MM`.
    pub month: String,
    /// Audits created in the month.
    pub count: u64,
}

/// Aggregate audit metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatistics {
    /// Total audits in the store.
    pub total_audits: u64,
    /// Audit counts keyed by status label.
    pub status_breakdown: BTreeMap<String, u64>,
    /// Audit counts keyed by assigned auditor.
    pub auditor_workload: BTreeMap<String, u64>,
    /// Audits created within the requested period.
    pub recent_audits: u64,
    /// Creation counts per month over the trailing year, oldest first.
    pub monthly_trend: Vec<MonthlyCount>,
    /// Requested period.
    pub period: StatisticsPeriod,
    /// Time the statistics were computed.
    pub generated_at: Timestamp,
}

impl AuditStatistics {
    /// Computes statistics from a full record snapshot.
    #[must_use]
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a AuditRecord>,
        period: StatisticsPeriod,
        now: Timestamp,
    ) -> Self {
        let recent_cutoff = now.minus_days(period.days());
        let trend_cutoff = now.minus_days(TREND_WINDOW_DAYS);
        let mut total_audits = 0_u64;
        let mut status_breakdown = BTreeMap::new();
        let mut auditor_workload = BTreeMap::new();
        let mut recent_audits = 0_u64;
        let mut trend: BTreeMap<String, u64> = BTreeMap::new();
        for record in records {
            total_audits += 1;
            *status_breakdown.entry(record.status.as_str().to_string()).or_insert(0) += 1;
            let auditor =
                record.assigned_auditor.clone().unwrap_or_else(|| UNASSIGNED_AUDITOR.to_string());
            *auditor_workload.entry(auditor).or_insert(0) += 1;
            if record.created_at >= recent_cutoff {
                recent_audits += 1;
            }
            if record.created_at >= trend_cutoff {
                *trend.entry(record.created_at.year_month()).or_insert(0) += 1;
            }
        }
        Self {
            total_audits,
            status_breakdown,
            auditor_workload,
            recent_audits,
            monthly_trend: trend
                .into_iter()
                .map(|(month, count)| MonthlyCount {
                    month,
                    count,
                })
                .collect(),
            period,
            generated_at: now,
        }
    }
}

// ============================================================================
// SECTION: Audit Trail
// ============================================================================

/// Mutation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailAction {
    /// Record created.
    Create,
    /// Record updated.
    Update,
    /// Record deleted.
    Delete,
}

impl TrailAction {
    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for TrailAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown trail action: {other}")),
        }
    }
}

/// One entry of an audit record's change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    /// Sequential entry identifier.
    pub id: i64,
    /// Audit record the entry belongs to.
    pub audit_id: AuditId,
    /// Mutation kind.
    pub action: TrailAction,
    /// Principal that performed the mutation.
    pub actor: String,
    /// Field values before the mutation.
    pub old_values: Option<Value>,
    /// Field values after the mutation.
    pub new_values: Option<Value>,
    /// Time of the mutation.
    pub timestamp: Timestamp,
}

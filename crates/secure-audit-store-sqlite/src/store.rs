// crates/secure-audit-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Durable AuditStore backed by SQLite.
// Purpose: Persist audit records and an append-only change trail.
// Dependencies: secure-audit-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`AuditStore`] on `SQLite`. Timestamps are stored as
//! unix milliseconds, enum fields as their canonical labels, and trail value
//! snapshots as JSON text. Each mutation runs in one transaction together
//! with its trail row on the writer connection, and writes to one record are
//! serialized through [`RecordWriteLocks`]. Reads go to a pool of query-only
//! connections, so under WAL they never queue behind the writer. Rows that
//! fail to decode are reported as invalid data rather than skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::TryLockError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use secure_audit_core::AuditFilter;
use secure_audit_core::AuditId;
use secure_audit_core::AuditRecord;
use secure_audit_core::AuditStatistics;
use secure_audit_core::AuditStore;
use secure_audit_core::AuditTrailEntry;
use secure_audit_core::AuditUpdate;
use secure_audit_core::MonthlyCount;
use secure_audit_core::NewAuditRecord;
use secure_audit_core::RecordWriteLocks;
use secure_audit_core::StatisticsPeriod;
use secure_audit_core::StoreError;
use secure_audit_core::TREND_WINDOW_DAYS;
use secure_audit_core::Timestamp;
use secure_audit_core::TrailAction;
use secure_audit_core::UNASSIGNED_AUDITOR;
use secure_audit_core::interfaces::check_new_record;
use secure_audit_core::interfaces::check_update;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of read connections.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Column list shared by record queries, in [`RawRecord`] order.
const RECORD_COLUMNS: &str = "id, title, description, due_date, status, priority, department, \
                              assigned_auditor, notes, created_by, created_at, updated_at";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` audit store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of query-only connections serving reads.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default tuning.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

/// Validates connection tuning.
fn validate_runtime_limits(config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    if config.read_pool_size == 0 {
        return Err(SqliteStoreError::Invalid(
            "read_pool_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database is locked by another writer.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Unavailable(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

/// Classifies an engine error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            SqliteStoreError::Busy(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed audit store.
///
/// # Invariants
/// - Every mutation runs on the single writer connection.
/// - Read connections are opened `query_only` and never write.
#[derive(Clone)]
pub struct SqliteAuditStore {
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Query-only connection pool used for reads.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Per-record write locks.
    locks: RecordWriteLocks,
}

impl std::fmt::Debug for SqliteAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAuditStore").finish_non_exhaustive()
    }
}

impl SqliteAuditStore {
    /// Opens an `SQLite`-backed audit store, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        validate_runtime_limits(config)?;
        let mut write_connection = open_connection(config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_read_connection(config)?));
        }
        Ok(Self {
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            locks: RecordWriteLocks::new(),
        })
    }

    /// Locks the writer connection.
    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.write_connection.lock().map_err(|_| poisoned())
    }

    /// Locks a read connection, preferring an idle one.
    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        let len = self.read_connections.len();
        let start = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0 .. len {
            match self.read_connections[(start + offset) % len].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => {}
                Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
            }
        }
        self.read_connections[start].lock().map_err(|_| poisoned())
    }

    /// Inserts a new record and its trail row.
    fn insert_record(&self, record: NewAuditRecord) -> Result<AuditRecord, SqliteStoreError> {
        let now = Timestamp::now();
        let mut guard = self.lock_writer()?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        tx.execute(
            "INSERT INTO audits (title, description, due_date, status, priority, department, \
             assigned_auditor, notes, created_by, created_at, updated_at) VALUES (?1, ?2, ?3, \
             ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                record.title,
                record.description,
                record.due_date,
                record.status.as_str(),
                record.priority.as_str(),
                record.department,
                record.assigned_auditor,
                record.notes,
                record.created_by,
                now.unix_millis(),
            ],
        )
        .map_err(|err| db_error(&err))?;
        let id = AuditId::new(tx.last_insert_rowid());
        let actor = record.created_by.clone();
        let created = record.into_record(id, now);
        let snapshot = serde_json::to_value(&created)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        insert_trail(&tx, id, TrailAction::Create, &actor, None, Some(&snapshot), now)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(created)
    }

    /// Loads a record by id.
    fn load_record(&self, id: AuditId) -> Result<Option<AuditRecord>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let raw = guard
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM audits WHERE id = ?1"),
                params![id.get()],
                RawRecord::from_row,
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        drop(guard);
        raw.map(RawRecord::into_record).transpose()
    }

    /// Runs a filtered listing query.
    fn query_records(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, SqliteStoreError> {
        let (where_clause, mut values) = filter_clause(filter);
        let limit = i64::try_from(filter.limit)
            .map_err(|_| SqliteStoreError::Invalid("limit out of range".to_string()))?;
        let offset = i64::try_from(filter.offset)
            .map_err(|_| SqliteStoreError::Invalid("offset out of range".to_string()))?;
        values.push(SqlValue::Integer(limit));
        values.push(SqlValue::Integer(offset));
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM audits{where_clause} ORDER BY created_at DESC, id DESC \
             LIMIT ? OFFSET ?"
        );
        let guard = self.lock_reader()?;
        let mut statement = guard.prepare(&sql).map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params_from_iter(values), RawRecord::from_row)
            .map_err(|err| db_error(&err))?;
        let mut raws = Vec::new();
        for row in rows {
            raws.push(row.map_err(|err| db_error(&err))?);
        }
        drop(statement);
        drop(guard);
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    /// Applies an update under the record's write lock.
    fn update_record(
        &self,
        id: AuditId,
        update: &AuditUpdate,
        actor: &str,
    ) -> Result<Option<AuditRecord>, SqliteStoreError> {
        let _record_lock = self.locks.acquire(id);
        let mut guard = self.lock_writer()?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        let raw = tx
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM audits WHERE id = ?1"),
                params![id.get()],
                RawRecord::from_row,
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut record = raw.into_record()?;
        let now = Timestamp::now();
        let (old_values, new_values) = update.apply(&mut record, now);
        tx.execute(
            "UPDATE audits SET title = ?1, description = ?2, due_date = ?3, status = ?4, \
             priority = ?5, department = ?6, assigned_auditor = ?7, notes = ?8, updated_at = ?9 \
             WHERE id = ?10",
            params![
                record.title,
                record.description,
                record.due_date,
                record.status.as_str(),
                record.priority.as_str(),
                record.department,
                record.assigned_auditor,
                record.notes,
                now.unix_millis(),
                id.get(),
            ],
        )
        .map_err(|err| db_error(&err))?;
        insert_trail(&tx, id, TrailAction::Update, actor, Some(&old_values), Some(&new_values), now)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(Some(record))
    }

    /// Deletes a record under its write lock.
    fn delete_record(
        &self,
        id: AuditId,
        actor: &str,
    ) -> Result<Option<AuditRecord>, SqliteStoreError> {
        let _record_lock = self.locks.acquire(id);
        let mut guard = self.lock_writer()?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        let raw = tx
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM audits WHERE id = ?1"),
                params![id.get()],
                RawRecord::from_row,
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record = raw.into_record()?;
        tx.execute("DELETE FROM audits WHERE id = ?1", params![id.get()])
            .map_err(|err| db_error(&err))?;
        let snapshot = serde_json::to_value(&record)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        insert_trail(&tx, id, TrailAction::Delete, actor, Some(&snapshot), None, Timestamp::now())?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(Some(record))
    }

    /// Aggregates statistics with grouped queries.
    fn compute_statistics(
        &self,
        period: StatisticsPeriod,
    ) -> Result<AuditStatistics, SqliteStoreError> {
        let now = Timestamp::now();
        let recent_cutoff = now.minus_days(period.days()).unix_millis();
        let trend_cutoff = now.minus_days(TREND_WINDOW_DAYS).unix_millis();
        let guard = self.lock_reader()?;
        let total: i64 = guard
            .query_row("SELECT COUNT(*) FROM audits", params![], |row| row.get(0))
            .map_err(|err| db_error(&err))?;
        let recent: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM audits WHERE created_at >= ?1",
                params![recent_cutoff],
                |row| row.get(0),
            )
            .map_err(|err| db_error(&err))?;
        let status_breakdown = grouped_counts(
            &guard,
            "SELECT status, COUNT(*) FROM audits GROUP BY status",
            params![],
        )?;
        let auditor_workload = grouped_counts(
            &guard,
            "SELECT COALESCE(assigned_auditor, ?1), COUNT(*) FROM audits GROUP BY 1",
            params![UNASSIGNED_AUDITOR],
        )?;
        let monthly_trend = grouped_counts::<_, Vec<(String, u64)>>(
            &guard,
            "SELECT strftime('%Y-%m', created_at / 1000, 'unixepoch') AS month, COUNT(*) FROM \
             audits WHERE created_at >= ?1 GROUP BY month ORDER BY month",
            params![trend_cutoff],
        )?
        .into_iter()
        .map(|(month, count)| MonthlyCount {
            month,
            count,
        })
        .collect();
        drop(guard);
        Ok(AuditStatistics {
            total_audits: count_to_u64(total)?,
            status_breakdown,
            auditor_workload,
            recent_audits: count_to_u64(recent)?,
            monthly_trend,
            period,
            generated_at: now,
        })
    }

    /// Loads the trail of one record.
    fn load_trail(&self, id: AuditId) -> Result<Vec<AuditTrailEntry>, SqliteStoreError> {
        let guard = self.lock_reader()?;
        let mut statement = guard
            .prepare(
                "SELECT id, audit_id, action, actor, old_values, new_values, timestamp FROM \
                 audit_trail WHERE audit_id = ?1 ORDER BY id",
            )
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params![id.get()], |row| {
                Ok(RawTrailEntry {
                    id: row.get(0)?,
                    audit_id: row.get(1)?,
                    action: row.get(2)?,
                    actor: row.get(3)?,
                    old_values: row.get(4)?,
                    new_values: row.get(5)?,
                    timestamp: row.get(6)?,
                })
            })
            .map_err(|err| db_error(&err))?;
        let mut raws = Vec::new();
        for row in rows {
            raws.push(row.map_err(|err| db_error(&err))?);
        }
        drop(statement);
        drop(guard);
        raws.into_iter().map(RawTrailEntry::into_entry).collect()
    }
}

impl AuditStore for SqliteAuditStore {
    fn create(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        check_new_record(&record)?;
        self.insert_record(record).map_err(StoreError::from)
    }

    fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StoreError> {
        self.load_record(id).map_err(StoreError::from)
    }

    fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        self.query_records(filter).map_err(StoreError::from)
    }

    fn update(
        &self,
        id: AuditId,
        update: &AuditUpdate,
        actor: &str,
    ) -> Result<AuditRecord, StoreError> {
        check_update(update)?;
        self.update_record(id, update, actor)?.ok_or(StoreError::NotFound(id))
    }

    fn delete(&self, id: AuditId, actor: &str) -> Result<AuditRecord, StoreError> {
        self.delete_record(id, actor)?.ok_or(StoreError::NotFound(id))
    }

    fn statistics(&self, period: StatisticsPeriod) -> Result<AuditStatistics, StoreError> {
        self.compute_statistics(period).map_err(StoreError::from)
    }

    fn trail(&self, id: AuditId) -> Result<Vec<AuditTrailEntry>, StoreError> {
        self.load_trail(id).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Undecoded `audits` row.
struct RawRecord {
    /// Record id.
    id: i64,
    /// Title.
    title: String,
    /// Description.
    description: String,
    /// Due date.
    due_date: Option<String>,
    /// Status label.
    status: String,
    /// Priority label.
    priority: String,
    /// Department.
    department: Option<String>,
    /// Assigned auditor.
    assigned_auditor: Option<String>,
    /// Notes.
    notes: Option<String>,
    /// Creator.
    created_by: String,
    /// Creation time in unix millis.
    created_at: i64,
    /// Update time in unix millis.
    updated_at: i64,
}

impl RawRecord {
    /// Reads a row selected with [`RECORD_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            due_date: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            department: row.get(6)?,
            assigned_auditor: row.get(7)?,
            notes: row.get(8)?,
            created_by: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    /// Decodes labels and timestamps.
    fn into_record(self) -> Result<AuditRecord, SqliteStoreError> {
        Ok(AuditRecord {
            id: AuditId::new(self.id),
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            status: self.status.parse().map_err(SqliteStoreError::Invalid)?,
            priority: self.priority.parse().map_err(SqliteStoreError::Invalid)?,
            department: self.department,
            assigned_auditor: self.assigned_auditor,
            notes: self.notes,
            created_by: self.created_by,
            created_at: decode_millis(self.created_at)?,
            updated_at: decode_millis(self.updated_at)?,
        })
    }
}

/// Undecoded `audit_trail` row.
struct RawTrailEntry {
    /// Entry id.
    id: i64,
    /// Audit id.
    audit_id: i64,
    /// Action label.
    action: String,
    /// Actor.
    actor: String,
    /// Prior values as JSON text.
    old_values: Option<String>,
    /// New values as JSON text.
    new_values: Option<String>,
    /// Entry time in unix millis.
    timestamp: i64,
}

impl RawTrailEntry {
    /// Decodes labels, JSON snapshots, and timestamps.
    fn into_entry(self) -> Result<AuditTrailEntry, SqliteStoreError> {
        Ok(AuditTrailEntry {
            id: self.id,
            audit_id: AuditId::new(self.audit_id),
            action: self.action.parse().map_err(SqliteStoreError::Invalid)?,
            actor: self.actor,
            old_values: decode_json(self.old_values)?,
            new_values: decode_json(self.new_values)?,
            timestamp: decode_millis(self.timestamp)?,
        })
    }
}

/// Decodes a unix-millis column.
fn decode_millis(millis: i64) -> Result<Timestamp, SqliteStoreError> {
    Timestamp::from_unix_millis(millis)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("timestamp out of range: {millis}")))
}

/// Decodes an optional JSON text column.
fn decode_json(text: Option<String>) -> Result<Option<Value>, SqliteStoreError> {
    text.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Error for a connection mutex poisoned by a panicking holder.
fn poisoned() -> SqliteStoreError {
    SqliteStoreError::Db("mutex poisoned".to_string())
}

/// Converts a `COUNT(*)` result.
fn count_to_u64(count: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(count).map_err(|_| SqliteStoreError::Invalid("negative count".to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the `WHERE` clause and bound values for a listing filter.
fn filter_clause(filter: &AuditFilter) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(auditor) = &filter.assigned_auditor {
        clauses.push("assigned_auditor = ?");
        values.push(SqlValue::Text(auditor.clone()));
    }
    if let Some(department) = &filter.department {
        clauses.push("department = ?");
        values.push(SqlValue::Text(department.clone()));
    }
    if let Some(from) = &filter.date_from {
        clauses.push("due_date >= ?");
        values.push(SqlValue::Text(from.clone()));
    }
    if let Some(to) = &filter.date_to {
        clauses.push("due_date <= ?");
        values.push(SqlValue::Text(to.clone()));
    }
    if let Some(term) = &filter.search {
        clauses.push(
            "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\' OR COALESCE(notes, '') \
             LIKE ? ESCAPE '\\')",
        );
        let pattern = format!("%{}%", escape_like(term));
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern));
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

/// Escapes `LIKE` wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Runs a two-column `label, COUNT(*)` query.
fn grouped_counts<P: rusqlite::Params, C: FromIterator<(String, u64)>>(
    connection: &Connection,
    sql: &str,
    params: P,
) -> Result<C, SqliteStoreError> {
    let mut statement = connection.prepare(sql).map_err(|err| db_error(&err))?;
    let rows = statement
        .query_map(params, |row| {
            let label: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((label, count))
        })
        .map_err(|err| db_error(&err))?;
    let mut pairs = Vec::new();
    for row in rows {
        let (label, count) = row.map_err(|err| db_error(&err))?;
        pairs.push((label, count_to_u64(count)?));
    }
    Ok(pairs.into_iter().collect())
}

/// Appends a trail row inside an open transaction.
fn insert_trail(
    tx: &Transaction<'_>,
    audit_id: AuditId,
    action: TrailAction,
    actor: &str,
    old_values: Option<&Value>,
    new_values: Option<&Value>,
    timestamp: Timestamp,
) -> Result<(), SqliteStoreError> {
    let old_text = old_values.map(Value::to_string);
    let new_text = new_values.map(Value::to_string);
    tx.execute(
        "INSERT INTO audit_trail (audit_id, action, actor, old_values, new_values, timestamp) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![audit_id.get(), action.as_str(), actor, old_text, new_text, timestamp.unix_millis()],
    )
    .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Opens a query-only connection for the read pool. The writer has already
/// set the journal mode and created the schema.
fn open_read_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    connection.execute_batch("PRAGMA query_only = ON;").map_err(|err| db_error(&err))?;
    Ok(connection)
}

/// Applies journal, sync, and busy-timeout settings.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS audits (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    due_date TEXT,
                    status TEXT NOT NULL DEFAULT 'open',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    department TEXT,
                    assigned_auditor TEXT,
                    notes TEXT,
                    created_by TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS audit_trail (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    audit_id INTEGER NOT NULL,
                    action TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    old_values TEXT,
                    new_values TEXT,
                    timestamp INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audits_status ON audits (status);
                CREATE INDEX IF NOT EXISTS idx_audits_auditor ON audits (assigned_auditor);
                CREATE INDEX IF NOT EXISTS idx_audits_created_at ON audits (created_at);
                CREATE INDEX IF NOT EXISTS idx_audit_trail_audit_id ON audit_trail (audit_id);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/secure-audit-mcp/src/tools.rs
// ============================================================================
// Module: Audit Tools
// Description: Tool handlers for audit record management.
// Purpose: Expose audit store operations as registered MCP tools.
// Dependencies: secure-audit-core, serde, serde_json, time
// ============================================================================

//! ## Overview
//! Seven tools cover the audit lifecycle: create, get, list, update, delete,
//! statistics, and trail. Each handler decodes its (already validated)
//! arguments into a strict struct, runs one store operation through
//! [`ExecutionContext::store`], and returns a JSON object. The caller label
//! from the transport becomes the record author or trail actor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use secure_audit_core::AuditFilter;
use secure_audit_core::AuditId;
use secure_audit_core::AuditPriority;
use secure_audit_core::AuditStatus;
use secure_audit_core::AuditStore;
use secure_audit_core::AuditUpdate;
use secure_audit_core::Component;
use secure_audit_core::DEFAULT_LIST_LIMIT;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::MAX_LIST_LIMIT;
use secure_audit_core::MAX_LIST_OFFSET;
use secure_audit_core::NewAuditRecord;
use secure_audit_core::SharedAuditStore;
use secure_audit_core::StatisticsPeriod;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::invocation::ExecutionContext;
use crate::invocation::ToolFailure;
use crate::registry::RegistryError;
use crate::registry::ToolDescriptor;
use crate::registry::ToolHandler;
use crate::registry::ToolRegistry;
use crate::registry::ToolRegistryBuilder;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Creates an audit record.
pub const CREATE_AUDIT: &str = "create_audit";
/// Fetches one audit record.
pub const GET_AUDIT: &str = "get_audit";
/// Lists audit records.
pub const LIST_AUDITS: &str = "list_audits";
/// Updates an audit record.
pub const UPDATE_AUDIT: &str = "update_audit";
/// Deletes an audit record.
pub const DELETE_AUDIT: &str = "delete_audit";
/// Computes audit statistics.
pub const GET_AUDIT_STATISTICS: &str = "get_audit_statistics";
/// Returns an audit's change history.
pub const GET_AUDIT_TRAIL: &str = "get_audit_trail";

/// Pattern for `YYYY-MM-DD` dates.
const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";
/// Calendar format of `due_date`.
const DUE_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Registers every audit tool against `store`.
///
/// # Errors
///
/// Returns [`RegistryError`] when a tool name is taken or a schema is invalid.
pub fn register_audit_tools(
    builder: &mut ToolRegistryBuilder,
    store: &SharedAuditStore,
) -> Result<(), RegistryError> {
    builder.register(ToolDescriptor::new(
        CREATE_AUDIT,
        "Create a new audit record.",
        create_schema(),
        Arc::new(CreateAudit {
            store: store.clone(),
        }),
    )?)?;
    builder.register(ToolDescriptor::new(
        GET_AUDIT,
        "Fetch one audit record by id.",
        id_schema(),
        Arc::new(GetAudit {
            store: store.clone(),
        }),
    )?)?;
    builder.register(ToolDescriptor::new(
        LIST_AUDITS,
        "List audit records with optional filters and paging.",
        list_schema(),
        Arc::new(ListAudits {
            store: store.clone(),
        }),
    )?)?;
    builder.register(ToolDescriptor::new(
        UPDATE_AUDIT,
        "Update fields of an existing audit record.",
        update_schema(),
        Arc::new(UpdateAudit {
            store: store.clone(),
        }),
    )?)?;
    builder.register(ToolDescriptor::new(
        DELETE_AUDIT,
        "Delete an audit record.",
        id_schema(),
        Arc::new(DeleteAudit {
            store: store.clone(),
        }),
    )?)?;
    builder.register(ToolDescriptor::new(
        GET_AUDIT_STATISTICS,
        "Summarize audits by status, auditor, and month.",
        statistics_schema(),
        Arc::new(AuditStatisticsTool {
            store: store.clone(),
        }),
    )?)?;
    builder.register(ToolDescriptor::new(
        GET_AUDIT_TRAIL,
        "Return the change history of an audit record.",
        id_schema(),
        Arc::new(AuditTrail {
            store: store.clone(),
        }),
    )?)?;
    Ok(())
}

/// Builds a frozen registry holding only the audit tools.
///
/// # Errors
///
/// Returns [`RegistryError`] when registration fails.
pub fn audit_tool_registry(store: &SharedAuditStore) -> Result<ToolRegistry, RegistryError> {
    let mut builder = ToolRegistry::builder();
    register_audit_tools(&mut builder, store)?;
    Ok(builder.build())
}

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Status labels accepted by strict status fields.
fn status_labels() -> Vec<&'static str> {
    AuditStatus::ALL.iter().map(|status| status.as_str()).collect()
}

/// Schema for tools that take only an audit id.
fn id_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["audit_id"],
        "properties": {
            "audit_id": {"type": "integer", "minimum": 1}
        }
    })
}

/// Schema for `create_audit`.
fn create_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["title"],
        "properties": {
            "title": {"type": "string", "minLength": 1},
            "description": {"type": "string"},
            "due_date": {"type": "string", "pattern": DATE_PATTERN},
            "status": {"type": "string"},
            "priority": {"type": "string", "enum": ["low", "medium", "high"]},
            "department": {"type": "string"},
            "assigned_auditor": {"type": "string"},
            "notes": {"type": "string"}
        }
    })
}

/// Schema for `update_audit`.
fn update_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["audit_id"],
        "properties": {
            "audit_id": {"type": "integer", "minimum": 1},
            "title": {"type": "string", "minLength": 1},
            "description": {"type": "string"},
            "due_date": {"type": "string", "pattern": DATE_PATTERN},
            "status": {"type": "string", "enum": status_labels()},
            "priority": {"type": "string", "enum": ["low", "medium", "high"]},
            "department": {"type": "string"},
            "assigned_auditor": {"type": "string"},
            "notes": {"type": "string"}
        }
    })
}

/// Schema for `list_audits`.
fn list_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "status": {"type": "string", "enum": status_labels()},
            "assigned_auditor": {"type": "string"},
            "department": {"type": "string"},
            "date_from": {"type": "string", "pattern": DATE_PATTERN},
            "date_to": {"type": "string", "pattern": DATE_PATTERN},
            "search": {"type": "string"},
            "limit": {"type": "integer", "minimum": 1, "maximum": MAX_LIST_LIMIT},
            "offset": {"type": "integer", "minimum": 0, "maximum": MAX_LIST_OFFSET}
        }
    })
}

/// Schema for `get_audit_statistics`.
fn statistics_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "period": {"type": "string", "enum": ["week", "month", "quarter", "year"]}
        }
    })
}

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Arguments of tools addressing one record.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuditIdArgs {
    /// Target record.
    audit_id: AuditId,
}

/// Arguments of `create_audit`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateAuditArgs {
    /// Title.
    title: String,
    /// Description.
    #[serde(default)]
    description: Option<String>,
    /// Due date.
    #[serde(default)]
    due_date: Option<String>,
    /// Status label; unknown labels become `open`.
    #[serde(default)]
    status: Option<String>,
    /// Priority.
    #[serde(default)]
    priority: Option<AuditPriority>,
    /// Department.
    #[serde(default)]
    department: Option<String>,
    /// Assigned auditor.
    #[serde(default)]
    assigned_auditor: Option<String>,
    /// Notes.
    #[serde(default)]
    notes: Option<String>,
}

/// Arguments of `update_audit`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateAuditArgs {
    /// Target record.
    audit_id: AuditId,
    /// New title.
    #[serde(default)]
    title: Option<String>,
    /// New description.
    #[serde(default)]
    description: Option<String>,
    /// New due date.
    #[serde(default)]
    due_date: Option<String>,
    /// New status.
    #[serde(default)]
    status: Option<AuditStatus>,
    /// New priority.
    #[serde(default)]
    priority: Option<AuditPriority>,
    /// New department.
    #[serde(default)]
    department: Option<String>,
    /// New assigned auditor.
    #[serde(default)]
    assigned_auditor: Option<String>,
    /// New notes.
    #[serde(default)]
    notes: Option<String>,
}

impl UpdateAuditArgs {
    /// Splits the arguments into the target id and the update.
    fn into_parts(self) -> (AuditId, AuditUpdate) {
        (
            self.audit_id,
            AuditUpdate {
                title: self.title,
                description: self.description,
                due_date: self.due_date,
                status: self.status,
                priority: self.priority,
                department: self.department,
                assigned_auditor: self.assigned_auditor,
                notes: self.notes,
            },
        )
    }
}

/// Arguments of `get_audit_statistics`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatisticsArgs {
    /// Look-back window.
    #[serde(default)]
    period: StatisticsPeriod,
}

/// Decodes validated arguments into a typed struct.
fn decode<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolFailure> {
    serde_json::from_value(arguments).map_err(|err| ToolFailure::invalid(err.to_string()))
}

/// Serializes a tool result.
fn encode<T: Serialize>(value: &T) -> Result<Value, ToolFailure> {
    serde_json::to_value(value).map_err(|err| ToolFailure::Execution {
        message: "failed to encode tool result".to_string(),
        detail: Some(err.to_string()),
    })
}

/// Checks that a `YYYY-MM-DD` string names a real calendar date.
fn check_due_date(value: &str) -> Result<(), ToolFailure> {
    Date::parse(value, DUE_DATE_FORMAT)
        .map(|_| ())
        .map_err(|_| ToolFailure::invalid(format!("due_date {value} is not a valid date")))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `create_audit` handler.
struct CreateAudit {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for CreateAudit {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let args: CreateAuditArgs = decode(arguments)?;
        if let Some(due_date) = &args.due_date {
            check_due_date(due_date)?;
        }
        let new_record = NewAuditRecord {
            title: args.title,
            description: args.description.unwrap_or_default(),
            due_date: args.due_date,
            status: args.status.as_deref().map_or(AuditStatus::Open, AuditStatus::parse_or_open),
            priority: args.priority.unwrap_or_default(),
            department: args.department,
            assigned_auditor: args.assigned_auditor,
            notes: args.notes,
            created_by: ctx.caller().to_string(),
        };
        let record = ctx.store(|| self.store.create(new_record))?;
        ctx.log_record(
            LogRecord::new(Component::Tools, LogLevel::Info, "audit created")
                .with_field("audit_id", record.id.get()),
        );
        Ok(json!({"audit_id": record.id, "audit": encode(&record)?}))
    }
}

/// `get_audit` handler.
struct GetAudit {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for GetAudit {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let args: AuditIdArgs = decode(arguments)?;
        let record = ctx
            .store(|| self.store.get(args.audit_id))?
            .ok_or_else(|| ToolFailure::execution(format!("audit {} not found", args.audit_id)))?;
        Ok(json!({"audit": encode(&record)?}))
    }
}

/// `list_audits` handler.
struct ListAudits {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for ListAudits {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let filter: AuditFilter = decode(arguments)?;
        if filter.limit == 0 || filter.limit > MAX_LIST_LIMIT {
            return Err(ToolFailure::invalid(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT} (default {DEFAULT_LIST_LIMIT})"
            )));
        }
        let audits = ctx.store(|| self.store.list(&filter))?;
        Ok(json!({
            "audits": encode(&audits)?,
            "count": audits.len(),
            "limit": filter.limit,
            "offset": filter.offset,
        }))
    }
}

/// `update_audit` handler.
struct UpdateAudit {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for UpdateAudit {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let (audit_id, update) = decode::<UpdateAuditArgs>(arguments)?.into_parts();
        if update.is_empty() {
            return Err(ToolFailure::invalid("at least one field must be provided"));
        }
        if let Some(due_date) = &update.due_date {
            check_due_date(due_date)?;
        }
        let record = ctx.store(|| self.store.update(audit_id, &update, ctx.caller()))?;
        ctx.log_record(
            LogRecord::new(Component::Tools, LogLevel::Info, "audit updated")
                .with_field("audit_id", record.id.get()),
        );
        Ok(json!({"audit": encode(&record)?}))
    }
}

/// `delete_audit` handler.
struct DeleteAudit {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for DeleteAudit {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let args: AuditIdArgs = decode(arguments)?;
        let removed = ctx.store(|| self.store.delete(args.audit_id, ctx.caller()))?;
        ctx.log_record(
            LogRecord::new(Component::Tools, LogLevel::Info, "audit deleted")
                .with_field("audit_id", removed.id.get()),
        );
        Ok(json!({"audit_id": removed.id, "deleted": true}))
    }
}

/// `get_audit_statistics` handler.
struct AuditStatisticsTool {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for AuditStatisticsTool {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let args: StatisticsArgs = decode(arguments)?;
        let statistics = ctx.store(|| self.store.statistics(args.period))?;
        encode(&statistics)
    }
}

/// `get_audit_trail` handler.
struct AuditTrail {
    /// Backing store.
    store: SharedAuditStore,
}

#[async_trait]
impl ToolHandler for AuditTrail {
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure> {
        let args: AuditIdArgs = decode(arguments)?;
        let entries = ctx.store(|| self.store.trail(args.audit_id))?;
        Ok(json!({"audit_id": args.audit_id, "entries": encode(&entries)?}))
    }
}

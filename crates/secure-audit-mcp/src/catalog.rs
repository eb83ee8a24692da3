// crates/secure-audit-mcp/src/catalog.rs
// ============================================================================
// Module: Resource and Prompt Catalog
// Description: Read-only MCP resources and prompt templates over the audit store.
// Purpose: Serve `resources/*` and `prompts/*` requests.
// Dependencies: secure-audit-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Resources are JSON views of the store: the full listing
//! (`audits://list`), the statistics snapshot (`audits://stats`), and one
//! record (`audit://{id}`). Prompts render markdown instructions that embed
//! live audit data. Catalog calls are synchronous; the protocol layer runs
//! them off the async executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use secure_audit_core::AuditFilter;
use secure_audit_core::AuditId;
use secure_audit_core::AuditRecord;
use secure_audit_core::AuditStatus;
use secure_audit_core::AuditStore;
use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::MAX_LIST_LIMIT;
use secure_audit_core::SharedAuditStore;
use secure_audit_core::StatisticsPeriod;
use secure_audit_core::StoreError;
use secure_audit_core::Timestamp;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::observability::Observability;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Resource listing every audit.
pub const AUDITS_LIST_URI: &str = "audits://list";
/// Resource holding audit statistics.
pub const AUDITS_STATS_URI: &str = "audits://stats";
/// Prefix of single-audit resources.
pub const AUDIT_URI_PREFIX: &str = "audit://";
/// Prompt summarizing one audit.
pub const SUMMARY_PROMPT: &str = "audit_summary_prompt";
/// Prompt requesting a portfolio report.
pub const REPORT_PROMPT: &str = "audit_report_prompt";
/// MIME type of every resource.
const JSON_MIME: &str = "application/json";
/// Audits embedded verbatim in the report prompt.
const REPORT_SAMPLE: usize = 10;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// URI does not name a resource.
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    /// Name does not match a prompt.
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),
    /// Argument has the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Referenced audit does not exist.
    #[error("audit {0} not found")]
    NotFound(AuditId),
    /// Store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Entry returned by `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,
    /// Short name.
    pub name: String,
    /// Description.
    pub description: String,
    /// MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Entry returned by `resources/templates/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceTemplate {
    /// RFC 6570 URI template.
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Short name.
    pub name: String,
    /// Description.
    pub description: String,
    /// MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Body of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Rendered document.
    pub text: String,
}

/// Declared prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Whether the argument must be provided.
    pub required: bool,
}

/// Entry returned by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptDescriptor {
    /// Prompt name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Declared arguments.
    pub arguments: Vec<PromptArgument>,
}

/// Rendered prompt returned by `prompts/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    /// Description.
    pub description: String,
    /// Prompt messages.
    pub messages: Vec<PromptMessage>,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Speaker role.
    pub role: &'static str,
    /// Message body.
    pub content: PromptContent,
}

/// Text body of a prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptContent {
    /// Content type.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Text.
    pub text: String,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Resources and prompts backed by the audit store.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Backing store.
    store: SharedAuditStore,
    /// Log router.
    observability: Arc<Observability>,
}

impl Catalog {
    /// Creates a catalog over `store`.
    #[must_use]
    pub const fn new(store: SharedAuditStore, observability: Arc<Observability>) -> Self {
        Self {
            store,
            observability,
        }
    }

    /// Lists static resources.
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor {
                uri: AUDITS_LIST_URI.to_string(),
                name: "audits".to_string(),
                description: "Every audit record".to_string(),
                mime_type: JSON_MIME.to_string(),
            },
            ResourceDescriptor {
                uri: AUDITS_STATS_URI.to_string(),
                name: "audit-statistics".to_string(),
                description: "Audit statistics for the last 30 days".to_string(),
                mime_type: JSON_MIME.to_string(),
            },
        ]
    }

    /// Lists parameterized resources.
    #[must_use]
    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate {
            uri_template: format!("{AUDIT_URI_PREFIX}{{id}}"),
            name: "audit".to_string(),
            description: "One audit record by id".to_string(),
            mime_type: JSON_MIME.to_string(),
        }]
    }

    /// Reads a resource.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the URI is unknown, the id is malformed
    /// or missing, or the store fails.
    pub fn read(&self, uri: &str) -> Result<ResourceContents, CatalogError> {
        let document = match uri {
            AUDITS_LIST_URI => {
                let audits = self.store.list(&AuditFilter {
                    limit: MAX_LIST_LIMIT,
                    ..AuditFilter::default()
                })?;
                json!({
                    "audits": audits,
                    "count": audits.len(),
                    "generated_at": Timestamp::now(),
                })
            }
            AUDITS_STATS_URI => json!(self.store.statistics(StatisticsPeriod::Month)?),
            other => {
                let raw = other
                    .strip_prefix(AUDIT_URI_PREFIX)
                    .ok_or_else(|| CatalogError::UnknownResource(other.to_string()))?;
                let id: AuditId = raw
                    .parse()
                    .map_err(|_| CatalogError::InvalidArgument(format!("invalid audit id: {raw}")))?;
                let record = self.store.get(id)?.ok_or(CatalogError::NotFound(id))?;
                json!(record)
            }
        };
        self.observability.emit(
            LogRecord::new(Component::Catalog, LogLevel::Info, "resource read").with_field("uri", uri),
        );
        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type: JSON_MIME.to_string(),
            text: pretty(&document),
        })
    }

    /// Lists prompts.
    #[must_use]
    pub fn prompts(&self) -> Vec<PromptDescriptor> {
        vec![
            PromptDescriptor {
                name: SUMMARY_PROMPT.to_string(),
                description: "Ask for a management summary of one audit".to_string(),
                arguments: vec![PromptArgument {
                    name: "audit_id".to_string(),
                    description: "Audit to summarize".to_string(),
                    required: true,
                }],
            },
            PromptDescriptor {
                name: REPORT_PROMPT.to_string(),
                description: "Ask for a report across audits".to_string(),
                arguments: vec![
                    PromptArgument {
                        name: "status".to_string(),
                        description: "Status filter or \"all\"".to_string(),
                        required: false,
                    },
                    PromptArgument {
                        name: "auditor".to_string(),
                        description: "Auditor filter or \"all\"".to_string(),
                        required: false,
                    },
                ],
            },
        ]
    }

    /// Renders a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for unknown prompts, bad arguments, missing
    /// audits, or store failures.
    pub fn render_prompt(
        &self,
        name: &str,
        arguments: &BTreeMap<String, String>,
    ) -> Result<RenderedPrompt, CatalogError> {
        let (description, text) = match name {
            SUMMARY_PROMPT => {
                let raw = arguments.get("audit_id").map_or("1", String::as_str);
                let id: AuditId = raw
                    .parse()
                    .map_err(|_| CatalogError::InvalidArgument(format!("invalid audit id: {raw}")))?;
                let record = self.store.get(id)?.ok_or(CatalogError::NotFound(id))?;
                (format!("Summary request for audit {id}"), summary_text(&record))
            }
            REPORT_PROMPT => {
                let status = arguments.get("status").map_or("all", String::as_str);
                let auditor = arguments.get("auditor").map_or("all", String::as_str);
                (
                    "Audit report request".to_string(),
                    self.report_text(status, auditor)?,
                )
            }
            other => return Err(CatalogError::UnknownPrompt(other.to_string())),
        };
        self.observability.emit(
            LogRecord::new(Component::Catalog, LogLevel::Info, "prompt rendered")
                .with_field("prompt", name),
        );
        Ok(RenderedPrompt {
            description,
            messages: vec![PromptMessage {
                role: "user",
                content: PromptContent {
                    kind: "text",
                    text,
                },
            }],
        })
    }

    /// Builds the report prompt body.
    fn report_text(&self, status: &str, auditor: &str) -> Result<String, CatalogError> {
        let mut filter = AuditFilter {
            limit: MAX_LIST_LIMIT,
            ..AuditFilter::default()
        };
        if status != "all" {
            filter.status = Some(
                status
                    .parse::<AuditStatus>()
                    .map_err(CatalogError::InvalidArgument)?,
            );
        }
        if auditor != "all" {
            filter.assigned_auditor = Some(auditor.to_string());
        }
        let audits = self.store.list(&filter)?;
        let stats = self.store.statistics(StatisticsPeriod::Month)?;

        let mut text = String::new();
        let _ = writeln!(text, "# Comprehensive Audit Report Generation\n");
        let _ = writeln!(text, "Generate a detailed audit report based on the following data:\n");
        let _ = writeln!(text, "## Report Parameters:");
        let _ = writeln!(text, "- **Status Filter:** {status}");
        let _ = writeln!(text, "- **Auditor Filter:** {auditor}");
        let _ = writeln!(text, "- **Total Audits in Scope:** {}", audits.len());
        let _ = writeln!(text, "- **Report Generated:** {}\n", Timestamp::now());
        let _ = writeln!(text, "## Overall Statistics:");
        let _ = writeln!(text, "- **Total Audits in System:** {}", stats.total_audits);
        let _ = writeln!(text, "- **Recent Activity (30 days):** {}\n", stats.recent_audits);
        let _ = writeln!(text, "### Status Breakdown:\n{}\n", pretty(&json!(stats.status_breakdown)));
        let _ = writeln!(text, "### Auditor Workload:\n{}\n", pretty(&json!(stats.auditor_workload)));
        let sample: Vec<&AuditRecord> = audits.iter().take(REPORT_SAMPLE).collect();
        let _ = writeln!(text, "## Audits in Report Scope:\n{}", pretty(&json!(sample)));
        if audits.len() > REPORT_SAMPLE {
            let _ = writeln!(text, "... and {} more audits", audits.len() - REPORT_SAMPLE);
        }
        text.push_str(REPORT_REQUIREMENTS);
        Ok(text)
    }
}

// ============================================================================
// SECTION: Prompt Text
// ============================================================================

/// Requirements closing the report prompt.
const REPORT_REQUIREMENTS: &str = "
## Report Requirements:

1. **Executive Dashboard**
   - High-level metrics and KPIs
   - Trend analysis and insights
   - Risk assessment summary

2. **Detailed Analysis**
   - Status distribution analysis
   - Performance by auditor
   - Timeline and completion rates

3. **Risk & Compliance Overview**
   - Critical findings summary
   - Compliance status assessment
   - Risk mitigation progress

4. **Operational Insights**
   - Resource utilization
   - Process improvement opportunities
   - Capacity planning recommendations

5. **Action Items & Follow-up**
   - Outstanding items by priority
   - Recommended next steps
   - Monitoring and review schedule

Please create a comprehensive report that provides actionable insights for management decision-making.";

/// Renders the summary prompt for one record.
fn summary_text(record: &AuditRecord) -> String {
    let optional = |value: Option<&str>| value.unwrap_or("not set").to_string();
    format!(
        "# Audit Summary Request

Please provide a comprehensive summary for the following audit:

**Audit ID:** {id}
**Title:** {title}
**Description:** {description}
**Current Status:** {status}
**Priority:** {priority}
**Department:** {department}
**Assigned Auditor:** {auditor}
**Due Date:** {due}
**Created:** {created}
**Last Updated:** {updated}

## Summary Requirements:

1. **Executive Summary** (2-3 sentences)
   - Key findings and overall assessment
   - Risk level and criticality

2. **Key Areas Reviewed**
   - List main areas covered in the audit
   - Highlight any compliance requirements

3. **Findings & Recommendations**
   - Critical issues identified
   - Recommended actions and timeline
   - Risk mitigation strategies

4. **Next Steps**
   - Immediate actions required
   - Follow-up schedule
   - Stakeholder communications

Please format the summary in a professional manner suitable for management review.",
        id = record.id,
        title = record.title,
        description = record.description,
        status = record.status,
        priority = record.priority,
        department = optional(record.department.as_deref()),
        auditor = optional(record.assigned_auditor.as_deref()),
        due = optional(record.due_date.as_deref()),
        created = record.created_at,
        updated = record.updated_at,
    )
}

/// Pretty-prints a JSON document.
fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

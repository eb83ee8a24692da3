// crates/secure-audit-core/src/core/logging.rs
// ============================================================================
// Module: SecureAudit Log Records
// Description: Structured log record, severity, and component types.
// Purpose: Give every transport and tool one log shape and one line format.
// Dependencies: serde, serde_json, crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! A [`LogRecord`] is the unit handed to observability sinks. Records carry a
//! component tag, a severity, an optional correlation id (the invocation id),
//! a human message, and ordered structured fields. [`LogRecord::to_line`]
//! renders the single-line text form:
//!
//! ```text
//! 2026-01-01T00:00:00.000Z - dispatch - INFO - request completed [correlation_id=... status=ok]
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::InvocationId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Log Level
// ============================================================================

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Recoverable problem.
    Warning,
    /// Failure requiring attention.
    Error,
}

impl LogLevel {
    /// Returns the uppercase label used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Component
// ============================================================================

/// Subsystem that produced a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Server lifecycle.
    Server,
    /// Dispatch core.
    Dispatch,
    /// Pipe transport.
    Pipe,
    /// HTTP request/response transport.
    Http,
    /// Event stream transport.
    Stream,
    /// Stream heartbeat monitor.
    Heartbeat,
    /// Audit tool handlers.
    Tools,
    /// Resource and prompt catalog.
    Catalog,
}

impl Component {
    /// All components.
    pub const ALL: [Self; 8] = [
        Self::Server,
        Self::Dispatch,
        Self::Pipe,
        Self::Http,
        Self::Stream,
        Self::Heartbeat,
        Self::Tools,
        Self::Catalog,
    ];

    /// Returns the lowercase component label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Dispatch => "dispatch",
            Self::Pipe => "pipe",
            Self::Http => "http",
            Self::Stream => "stream",
            Self::Heartbeat => "heartbeat",
            Self::Tools => "tools",
            Self::Catalog => "catalog",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|component| component.as_str() == normalized)
            .ok_or_else(|| format!("unknown log component: {value}"))
    }
}

// ============================================================================
// SECTION: Log Record
// ============================================================================

/// Structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Time the record was created.
    pub timestamp: Timestamp,
    /// Producing component.
    pub component: Component,
    /// Severity.
    pub level: LogLevel,
    /// Invocation id shared by all records of one invocation.
    pub correlation_id: Option<InvocationId>,
    /// Human-readable message.
    pub message: String,
    /// Structured fields in insertion order.
    pub fields: Vec<(String, Value)>,
}

impl LogRecord {
    /// Creates an uncorrelated record stamped with the current time.
    #[must_use]
    pub fn new(component: Component, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            component,
            level,
            correlation_id: None,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Attaches a correlation id.
    #[must_use]
    pub const fn with_correlation(mut self, id: InvocationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Appends a structured field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Returns the first field with the given key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == key).map(|(_, value)| value)
    }

    /// Renders the record as a single line without a trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} - {} - {} - {}",
            self.timestamp,
            self.component,
            self.level,
            single_line(&self.message)
        );
        let mut pairs = Vec::with_capacity(self.fields.len() + 1);
        if let Some(id) = self.correlation_id {
            pairs.push(format!("correlation_id={id}"));
        }
        for (key, value) in &self.fields {
            pairs.push(format!("{key}={}", render_value(value)));
        }
        if !pairs.is_empty() {
            let _ = write!(line, " [{}]", pairs.join(" "));
        }
        line
    }
}

/// Replaces line breaks so a record never spans lines.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Renders a field value: bare strings without whitespace stay unquoted.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) if !text.is_empty() && !text.chars().any(char::is_whitespace) => {
            text.clone()
        }
        other => other.to_string(),
    }
}

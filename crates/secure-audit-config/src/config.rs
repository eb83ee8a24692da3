// crates/secure-audit-config/src/config.rs
// ============================================================================
// Module: SecureAudit Configuration
// Description: Configuration loading, environment overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with safe defaults.
// Dependencies: secure-audit-core, secure-audit-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is resolved from an explicit path, then the
//! `SECURE_AUDIT_CONFIG` environment variable, then `secure-audit.toml` in the
//! working directory. When no path is given and the default file is absent,
//! built-in defaults are used. Logging settings can then be overridden from
//! `SECURE_AUDIT_LOG_*` variables; the environment is read once per load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_store_sqlite::DEFAULT_READ_POOL_SIZE;
use secure_audit_store_sqlite::SqliteStoreConfig;
use secure_audit_store_sqlite::SqliteStoreMode;
use secure_audit_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "secure-audit.toml";
/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "SECURE_AUDIT_CONFIG";
/// Environment variable for the log directory.
pub const LOG_DIR_ENV_VAR: &str = "SECURE_AUDIT_LOG_DIR";
/// Environment variable for the minimum log level.
pub const LOG_LEVEL_ENV_VAR: &str = "SECURE_AUDIT_LOG_LEVEL";
/// Prefix for per-component log destination variables.
pub const LOG_COMPONENT_ENV_PREFIX: &str = "SECURE_AUDIT_LOG_";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default bind address for network transports.
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8000";
/// Default maximum request body size.
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Smallest accepted body limit.
pub(crate) const MIN_MAX_BODY_BYTES: usize = 1024;
/// Largest accepted body limit.
pub(crate) const MAX_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Default heartbeat interval.
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
/// Smallest accepted heartbeat interval.
pub(crate) const MIN_HEARTBEAT_INTERVAL_MS: u64 = 100;
/// Largest accepted heartbeat interval.
pub(crate) const MAX_HEARTBEAT_INTERVAL_MS: u64 = 3_600_000;
/// Default per-session outbound queue depth.
pub(crate) const DEFAULT_STREAM_QUEUE_DEPTH: usize = 64;
/// Largest accepted stream queue depth.
pub(crate) const MAX_STREAM_QUEUE_DEPTH: usize = 4096;
/// Default per-invocation deadline.
pub(crate) const DEFAULT_DEADLINE_MS: u64 = 30_000;
/// Largest accepted per-invocation deadline.
pub(crate) const MAX_DEADLINE_MS: u64 = 600_000;
/// Default `SQLite` busy timeout.
pub(crate) const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecureAuditConfig {
    /// Transport and network settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Audit store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Log routing.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SecureAuditConfig {
    /// Loads configuration using the default resolution rules and applies
    /// environment overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path)? {
            ResolvedPath::Explicit(resolved) => Self::read_file(&resolved)?,
            ResolvedPath::Default(resolved) => {
                if resolved.exists() {
                    Self::read_file(&resolved)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file.
    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies `SECURE_AUDIT_LOG_*` overrides from the given variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override names an unknown
    /// level or component, or carries an empty path.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if key == CONFIG_ENV_VAR {
                continue;
            }
            if key == LOG_DIR_ENV_VAR {
                validate_path_string(LOG_DIR_ENV_VAR, &value)?;
                self.logging.directory = Some(PathBuf::from(value.trim()));
            } else if key == LOG_LEVEL_ENV_VAR {
                self.logging.level = value
                    .parse()
                    .map_err(|err: String| ConfigError::Invalid(format!("{key}: {err}")))?;
            } else if let Some(name) = key.strip_prefix(LOG_COMPONENT_ENV_PREFIX) {
                let component: Component = name
                    .parse()
                    .map_err(|err: String| ConfigError::Invalid(format!("{key}: {err}")))?;
                validate_path_string(&key, &value)?;
                self.logging.destinations.insert(component, PathBuf::from(value.trim()));
            }
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.dispatch.validate()?;
        self.store.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Transport kinds the server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Content-Length or newline framed JSON-RPC over stdin/stdout.
    Pipe,
    /// One JSON-RPC exchange per HTTP `POST /rpc`.
    RequestResponse,
    /// Server-sent event stream with `POST /messages` uploads.
    Stream,
}

impl ServerTransport {
    /// Returns the configuration name of the transport.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "pipe",
            Self::RequestResponse => "request_response",
            Self::Stream => "stream",
        }
    }

    /// Returns true when the transport listens on the bind address.
    #[must_use]
    pub const fn is_network(self) -> bool {
        matches!(self, Self::RequestResponse | Self::Stream)
    }
}

/// Transport and network settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Enabled transports.
    #[serde(default = "default_transports")]
    pub transports: Vec<ServerTransport>,
    /// Socket address for network transports.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body or frame size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Heartbeat interval for stream sessions.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Outbound event queue depth per stream session.
    #[serde(default = "default_stream_queue_depth")]
    pub stream_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transports: default_transports(),
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            stream_queue_depth: DEFAULT_STREAM_QUEUE_DEPTH,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind)))
    }

    /// Returns true when any enabled transport needs the bind address.
    #[must_use]
    pub fn needs_listener(&self) -> bool {
        self.transports.iter().any(|transport| transport.is_network())
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.transports.is_empty() {
            return Err(ConfigError::Invalid("server.transports must not be empty".to_string()));
        }
        let mut seen = self.transports.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.transports.len() {
            return Err(ConfigError::Invalid(
                "server.transports must not repeat a transport".to_string(),
            ));
        }
        self.bind_addr()?;
        if !(MIN_MAX_BODY_BYTES ..= MAX_MAX_BODY_BYTES).contains(&self.max_body_bytes) {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between {MIN_MAX_BODY_BYTES} and \
                 {MAX_MAX_BODY_BYTES}"
            )));
        }
        if !(MIN_HEARTBEAT_INTERVAL_MS ..= MAX_HEARTBEAT_INTERVAL_MS)
            .contains(&self.heartbeat_interval_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "server.heartbeat_interval_ms must be between {MIN_HEARTBEAT_INTERVAL_MS} and \
                 {MAX_HEARTBEAT_INTERVAL_MS}"
            )));
        }
        if self.stream_queue_depth == 0 || self.stream_queue_depth > MAX_STREAM_QUEUE_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "server.stream_queue_depth must be between 1 and {MAX_STREAM_QUEUE_DEPTH}"
            )));
        }
        Ok(())
    }
}

/// Default enabled transports.
fn default_transports() -> Vec<ServerTransport> {
    vec![ServerTransport::Pipe]
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default heartbeat interval.
const fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

/// Default stream queue depth.
const fn default_stream_queue_depth() -> usize {
    DEFAULT_STREAM_QUEUE_DEPTH
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Deadline applied to each invocation.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }
}

impl DispatchConfig {
    /// Validates dispatch settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_ms == 0 || self.deadline_ms > MAX_DEADLINE_MS {
            return Err(ConfigError::Invalid(format!(
                "dispatch.deadline_ms must be between 1 and {MAX_DEADLINE_MS}"
            )));
        }
        Ok(())
    }
}

/// Default invocation deadline.
const fn default_deadline_ms() -> u64 {
    DEFAULT_DEADLINE_MS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Audit store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Process-local store; contents are lost on exit.
    #[default]
    Memory,
    /// `SQLite` database file.
    Sqlite,
}

impl StoreType {
    /// Returns the configuration name of the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Audit store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read connections kept open by the sqlite store.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` settings when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
                read_pool_size: self.read_pool_size,
            }),
            _ => None,
        }
    }

    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "store.path is only valid with type = \"sqlite\"".to_string(),
                    ));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid(
                        "store.path is required for the sqlite store".to_string(),
                    ));
                };
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.read_pool_size == 0 {
                    return Err(ConfigError::Invalid(
                        "store.read_pool_size must be greater than zero".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Default `SQLite` busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default `SQLite` read pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Log routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level written to any sink.
    #[serde(default)]
    pub level: LogLevel,
    /// Directory for per-component `<component>.log` files.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Write records without a file destination to stderr.
    #[serde(default = "default_console")]
    pub console: bool,
    /// Explicit per-component log files.
    #[serde(default)]
    pub destinations: BTreeMap<Component, PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            directory: None,
            console: true,
            destinations: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Returns the file a component logs to, if any. Explicit destinations
    /// win; relative ones are placed under `directory` when it is set.
    #[must_use]
    pub fn destination_for(&self, component: Component) -> Option<PathBuf> {
        if let Some(path) = self.destinations.get(&component) {
            return Some(match &self.directory {
                Some(directory) if path.is_relative() => directory.join(path),
                _ => path.clone(),
            });
        }
        self.directory.as_ref().map(|directory| directory.join(format!("{component}.log")))
    }

    /// Validates logging settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(directory) = &self.directory {
            validate_path_string("logging.directory", &directory.to_string_lossy())?;
        }
        for (component, path) in &self.destinations {
            validate_path_string(
                &format!("logging.destinations.{component}"),
                &path.to_string_lossy(),
            )?;
        }
        Ok(())
    }
}

/// Console logging is on unless disabled.
const fn default_console() -> bool {
    true
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Where the config path came from.
enum ResolvedPath {
    /// Given on the command line or via environment; must exist.
    Explicit(PathBuf),
    /// Default file name; may be absent.
    Default(PathBuf),
}

/// Resolves the config path using CLI input or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<ResolvedPath, ConfigError> {
    if let Some(path) = path {
        return Ok(ResolvedPath::Explicit(path.to_path_buf()));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(ResolvedPath::Explicit(PathBuf::from(env_path)));
    }
    Ok(ResolvedPath::Default(PathBuf::from(DEFAULT_CONFIG_NAME)))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

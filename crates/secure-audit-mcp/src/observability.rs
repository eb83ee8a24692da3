// crates/secure-audit-mcp/src/observability.rs
// ============================================================================
// Module: Observability Sink
// Description: Leveled, per-component routing of structured log records.
// Purpose: Record every dispatch phase without letting logging fail a call.
// Dependencies: secure-audit-core, secure-audit-config, thiserror
// ============================================================================

//! ## Overview
//! [`Observability`] filters [`LogRecord`]s by a minimum level and routes the
//! survivors to a per-component destination. Destinations are [`LogSink`]
//! implementations: an append-only file, standard error, an in-memory buffer
//! for tests, or nothing. A failed write is retried on standard error and,
//! if that fails too, counted as dropped. Callers never see logging errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use secure_audit_config::LoggingConfig;
use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while opening log destinations.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Destination could not be opened.
    #[error("log destination {path} unavailable: {message}")]
    Destination {
        /// Destination path.
        path: String,
        /// Underlying error.
        message: String,
    },
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for rendered log records.
pub trait LogSink: Send + Sync {
    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the record was not written.
    fn write(&self, record: &LogRecord) -> io::Result<()>;

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing one line per record to standard error.
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", record.to_line())
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Append-only file sink.
pub struct FileLogSink {
    /// Destination path.
    path: PathBuf,
    /// Open file handle.
    file: Mutex<std::fs::File>,
}

impl FileLogSink {
    /// Opens (or creates) the log file, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or file cannot be created.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Returns the destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let mut file = self.file.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        writeln!(file, "{}", record.to_line())
    }

    fn flush(&self) -> io::Result<()> {
        let mut file = self.file.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}

/// In-memory sink used by tests and embedding hosts.
#[derive(Default)]
pub struct MemoryLogSink {
    /// Captured records.
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }

    /// Returns the captured records rendered as log lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.records().iter().map(LogRecord::to_line).collect()
    }
}

impl LogSink for MemoryLogSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let mut records =
            self.records.lock().map_err(|_| io::Error::other("memory sink lock poisoned"))?;
        records.push(record.clone());
        Ok(())
    }
}

/// Sink that discards everything.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn write(&self, _record: &LogRecord) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Observability
// ============================================================================

/// Leveled, per-component log router.
pub struct Observability {
    /// Records below this level are discarded.
    min_level: LogLevel,
    /// Per-component destinations.
    routes: BTreeMap<Component, Arc<dyn LogSink>>,
    /// Destination for components without a route.
    default_sink: Arc<dyn LogSink>,
    /// Sink tried when the primary write fails.
    fallback: Arc<dyn LogSink>,
    /// Records lost after the fallback also failed.
    dropped: AtomicU64,
}

impl std::fmt::Debug for Observability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observability")
            .field("min_level", &self.min_level)
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Observability {
    /// Starts a builder with the given minimum level.
    #[must_use]
    pub fn builder(min_level: LogLevel) -> ObservabilityBuilder {
        ObservabilityBuilder {
            min_level,
            routes: BTreeMap::new(),
            default_sink: Arc::new(StderrLogSink),
            fallback: Arc::new(StderrLogSink),
        }
    }

    /// Builds an instance that discards every record.
    #[must_use]
    pub fn disabled() -> Self {
        Self::builder(LogLevel::Error).default_sink(Arc::new(NoopLogSink)).build()
    }

    /// Builds an instance that sends every record at or above `min_level`
    /// to `sink`.
    #[must_use]
    pub fn to_sink(min_level: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Self::builder(min_level).default_sink(sink).build()
    }

    /// Builds the router described by the logging configuration.
    ///
    /// Components sharing a file share one handle. Without a file route a
    /// component logs to standard error when `console` is set and nowhere
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ObservabilityError::Destination`] when a file cannot be opened.
    pub fn from_config(config: &LoggingConfig) -> Result<Self, ObservabilityError> {
        let default_sink: Arc<dyn LogSink> =
            if config.console { Arc::new(StderrLogSink) } else { Arc::new(NoopLogSink) };
        let mut builder = Self::builder(config.level).default_sink(default_sink);
        let mut opened: HashMap<PathBuf, Arc<dyn LogSink>> = HashMap::new();
        for component in Component::ALL {
            let Some(path) = config.destination_for(component) else {
                continue;
            };
            let sink = if let Some(sink) = opened.get(&path) {
                Arc::clone(sink)
            } else {
                let sink: Arc<dyn LogSink> =
                    Arc::new(FileLogSink::new(&path).map_err(|err| {
                        ObservabilityError::Destination {
                            path: path.display().to_string(),
                            message: err.to_string(),
                        }
                    })?);
                opened.insert(path, Arc::clone(&sink));
                sink
            };
            builder = builder.route(component, sink);
        }
        Ok(builder.build())
    }

    /// Returns the minimum level.
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Returns true when records at `level` would be written.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Routes a record to its destination.
    pub fn emit(&self, record: LogRecord) {
        if !self.enabled(record.level) {
            return;
        }
        let sink = self.routes.get(&record.component).unwrap_or(&self.default_sink);
        if sink.write(&record).is_ok() {
            return;
        }
        if self.fallback.write(&record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Flushes every destination, ignoring failures.
    pub fn flush(&self) {
        for sink in self.routes.values() {
            let _ = sink.flush();
        }
        let _ = self.default_sink.flush();
    }

    /// Number of records lost because no destination accepted them.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Builder for [`Observability`].
pub struct ObservabilityBuilder {
    /// Minimum level.
    min_level: LogLevel,
    /// Per-component destinations.
    routes: BTreeMap<Component, Arc<dyn LogSink>>,
    /// Destination for unrouted components.
    default_sink: Arc<dyn LogSink>,
    /// Sink tried when the primary write fails.
    fallback: Arc<dyn LogSink>,
}

impl ObservabilityBuilder {
    /// Sends `component` records to `sink`.
    #[must_use]
    pub fn route(mut self, component: Component, sink: Arc<dyn LogSink>) -> Self {
        self.routes.insert(component, sink);
        self
    }

    /// Sets the destination for unrouted components.
    #[must_use]
    pub fn default_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.default_sink = sink;
        self
    }

    /// Replaces the fallback sink.
    #[must_use]
    pub fn fallback(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.fallback = sink;
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> Observability {
        Observability {
            min_level: self.min_level,
            routes: self.routes,
            default_sink: self.default_sink,
            fallback: self.fallback,
            dropped: AtomicU64::new(0),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use std::io;
    use std::sync::Arc;

    use secure_audit_config::LoggingConfig;
    use secure_audit_core::Component;
    use secure_audit_core::LogLevel;
    use secure_audit_core::LogRecord;

    use super::LogSink;
    use super::MemoryLogSink;
    use super::Observability;

    struct BrokenSink;

    impl LogSink for BrokenSink {
        fn write(&self, _record: &LogRecord) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn records_below_threshold_are_discarded() {
        let sink = Arc::new(MemoryLogSink::new());
        let obs = Observability::to_sink(LogLevel::Warning, sink.clone());
        obs.emit(LogRecord::new(Component::Dispatch, LogLevel::Info, "quiet"));
        obs.emit(LogRecord::new(Component::Dispatch, LogLevel::Error, "loud"));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "loud");
    }

    #[test]
    fn components_route_to_their_own_sink() {
        let dispatch = Arc::new(MemoryLogSink::new());
        let rest = Arc::new(MemoryLogSink::new());
        let obs = Observability::builder(LogLevel::Debug)
            .route(Component::Dispatch, dispatch.clone())
            .default_sink(rest.clone())
            .build();
        obs.emit(LogRecord::new(Component::Dispatch, LogLevel::Info, "a"));
        obs.emit(LogRecord::new(Component::Pipe, LogLevel::Info, "b"));
        assert_eq!(dispatch.records().len(), 1);
        assert_eq!(rest.records()[0].message, "b");
    }

    #[test]
    fn failed_destination_falls_back_then_counts_drops() {
        let fallback = Arc::new(MemoryLogSink::new());
        let obs = Observability::builder(LogLevel::Debug)
            .default_sink(Arc::new(BrokenSink))
            .fallback(fallback.clone())
            .build();
        obs.emit(LogRecord::new(Component::Server, LogLevel::Info, "kept"));
        assert_eq!(fallback.records().len(), 1);
        assert_eq!(obs.dropped(), 0);

        let obs = Observability::builder(LogLevel::Debug)
            .default_sink(Arc::new(BrokenSink))
            .fallback(Arc::new(BrokenSink))
            .build();
        obs.emit(LogRecord::new(Component::Server, LogLevel::Info, "lost"));
        assert_eq!(obs.dropped(), 1);
    }

    #[test]
    fn config_routes_components_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: LogLevel::Debug,
            directory: Some(dir.path().join("logs")),
            console: false,
            ..LoggingConfig::default()
        };
        let obs = Observability::from_config(&config).unwrap();
        obs.emit(LogRecord::new(Component::Heartbeat, LogLevel::Debug, "tick"));
        obs.flush();
        let content = std::fs::read_to_string(dir.path().join("logs").join("heartbeat.log")).unwrap();
        assert!(content.contains(" - heartbeat - DEBUG - tick"));
    }
}

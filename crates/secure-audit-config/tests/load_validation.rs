// crates/secure-audit-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load and Validation Tests
// Description: Parsing, defaults, environment overrides, and range checks.
// Purpose: Ensure invalid configuration fails closed before startup.
// Dependencies: secure-audit-config, secure-audit-core, tempfile
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::path::PathBuf;

use secure_audit_config::ConfigError;
use secure_audit_config::SecureAuditConfig;
use secure_audit_config::ServerTransport;
use secure_audit_config::StoreType;
use secure_audit_core::Component;
use secure_audit_core::LogLevel;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
}

#[test]
fn empty_document_yields_defaults() {
    let config = SecureAuditConfig::from_toml_str("").unwrap();
    assert_eq!(config, SecureAuditConfig::default());
    assert_eq!(config.server.transports, vec![ServerTransport::Pipe]);
    assert_eq!(config.server.bind, "127.0.0.1:8000");
    assert_eq!(config.server.heartbeat_interval_ms, 15_000);
    assert_eq!(config.dispatch.deadline_ms, 30_000);
    assert_eq!(config.store.store_type, StoreType::Memory);
    assert_eq!(config.logging.level, LogLevel::Info);
    assert!(config.logging.console);
}

#[test]
fn full_document_parses() {
    let config = SecureAuditConfig::from_toml_str(
        r#"
        [server]
        transports = ["pipe", "request_response", "stream"]
        bind = "0.0.0.0:9000"
        heartbeat_interval_ms = 500

        [dispatch]
        deadline_ms = 1000

        [store]
        type = "sqlite"
        path = "data/audits.db"
        journal_mode = "delete"
        read_pool_size = 2

        [logging]
        level = "DEBUG"
        directory = "logs"

        [logging.destinations]
        dispatch = "dispatch-trace.log"
        "#,
    )
    .unwrap();
    assert!(config.server.needs_listener());
    assert_eq!(config.server.bind_addr().unwrap().port(), 9000);
    let sqlite = config.store.sqlite().unwrap();
    assert_eq!(sqlite.path, PathBuf::from("data/audits.db"));
    assert_eq!(sqlite.read_pool_size, 2);
    assert_eq!(
        config.logging.destination_for(Component::Dispatch),
        Some(PathBuf::from("logs/dispatch-trace.log"))
    );
    assert_eq!(
        config.logging.destination_for(Component::Http),
        Some(PathBuf::from("logs/http.log"))
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let err = SecureAuditConfig::from_toml_str("[server]\nport = 1\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn out_of_range_values_are_rejected() {
    let cases = [
        "[server]\ntransports = []\n",
        "[server]\ntransports = [\"pipe\", \"pipe\"]\n",
        "[server]\nbind = \"not-an-address\"\n",
        "[server]\nheartbeat_interval_ms = 1\n",
        "[server]\nmax_body_bytes = 10\n",
        "[server]\nstream_queue_depth = 0\n",
        "[dispatch]\ndeadline_ms = 0\n",
        "[store]\ntype = \"sqlite\"\n",
        "[store]\npath = \"x.db\"\n",
        "[store]\ntype = \"sqlite\"\npath = \"x.db\"\nread_pool_size = 0\n",
    ];
    for case in cases {
        let err = SecureAuditConfig::from_toml_str(case).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "expected invalid for {case:?}: {err}");
    }
}

#[test]
fn environment_overrides_logging() {
    let mut config = SecureAuditConfig::default();
    config
        .apply_env(vars(&[
            ("SECURE_AUDIT_LOG_DIR", "/var/log/secure-audit"),
            ("SECURE_AUDIT_LOG_LEVEL", "warning"),
            ("SECURE_AUDIT_LOG_HEARTBEAT", "/tmp/heartbeat.log"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();
    assert_eq!(config.logging.level, LogLevel::Warning);
    assert_eq!(
        config.logging.destination_for(Component::Heartbeat),
        Some(PathBuf::from("/tmp/heartbeat.log"))
    );
    assert_eq!(
        config.logging.destination_for(Component::Server),
        Some(PathBuf::from("/var/log/secure-audit/server.log"))
    );
}

#[test]
fn environment_rejects_unknown_component_and_level() {
    let mut config = SecureAuditConfig::default();
    let err = config.apply_env(vars(&[("SECURE_AUDIT_LOG_KERNEL", "/tmp/k.log")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    let err = config.apply_env(vars(&[("SECURE_AUDIT_LOG_LEVEL", "chatty")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn explicit_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SecureAuditConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn explicit_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secure-audit.toml");
    std::fs::write(&path, "[dispatch]\ndeadline_ms = 2500\n").unwrap();
    let config = SecureAuditConfig::load(Some(&path)).unwrap();
    assert_eq!(config.dispatch.deadline_ms, 2500);
}

#[test]
fn oversized_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.toml");
    let padding = "# padding\n".repeat(120_000);
    std::fs::write(&path, padding).unwrap();
    let err = SecureAuditConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

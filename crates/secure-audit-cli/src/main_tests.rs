// crates/secure-audit-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Unit tests for argument parsing and command helpers.
// Purpose: Ensure flags override configuration and bad input fails closed.
// Dependencies: secure-audit-cli main helpers
// ============================================================================

//! ## Overview
//! Parses command lines with `Cli::try_parse_from` and exercises the
//! configuration and output helpers without starting a server.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions use unwrap for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::Parser;
use secure_audit_config::SecureAuditConfig;
use secure_audit_config::ServerTransport;
use secure_audit_core::LogLevel;
use serde_json::Value;

use super::Cli;
use super::CliError;
use super::Commands;
use super::ConfigCommand;
use super::ServeCommand;
use super::TransportArg;
use super::command_config_validate;
use super::config_summary;
use super::serve_config;
use super::tool_definitions_json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn serve_args(args: &[&str]) -> ServeCommand {
    let mut argv = vec!["secure-audit", "serve"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Serve(command) => command,
        other => panic!("unexpected command {other:?}"),
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("secure-audit.toml");
    std::fs::write(&path, body).unwrap();
    path
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn transport_flag_repeats() {
    let command = serve_args(&["--transport", "pipe", "--transport", "request-response"]);
    assert_eq!(command.transports, vec![TransportArg::Pipe, TransportArg::RequestResponse]);
}

#[test]
fn unknown_transport_is_rejected() {
    let result = Cli::try_parse_from(["secure-audit", "serve", "--transport", "carrier-pigeon"]);
    assert!(result.is_err());
}

#[test]
fn log_level_flag_is_case_insensitive() {
    let command = serve_args(&["--log-level", "warning"]);
    assert_eq!(command.log_level, Some(LogLevel::Warning));
    assert!(Cli::try_parse_from(["secure-audit", "serve", "--log-level", "loud"]).is_err());
}

#[test]
fn config_validate_takes_a_path() {
    let cli = Cli::try_parse_from(["secure-audit", "config", "validate", "--config", "x.toml"]).unwrap();
    match cli.command {
        Commands::Config {
            command: ConfigCommand::Validate {
                config,
            },
        } => assert_eq!(config.unwrap().to_str(), Some("x.toml")),
        other => panic!("unexpected command {other:?}"),
    }
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

#[test]
fn flags_override_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "[server]\ntransports = [\"pipe\"]\nbind = \"127.0.0.1:9000\"\n\n[logging]\nlevel = \"INFO\"\n",
    );
    let mut command = serve_args(&[
        "--transport",
        "stream",
        "--transport",
        "stream",
        "--bind",
        "127.0.0.1:9100",
        "--log-level",
        "debug",
    ]);
    command.config = Some(path);
    let config = serve_config(&command).unwrap();
    assert_eq!(config.server.transports, vec![ServerTransport::Stream]);
    assert_eq!(config.server.bind, "127.0.0.1:9100");
    assert_eq!(config.logging.level, LogLevel::Debug);
}

#[test]
fn invalid_bind_override_fails() {
    let mut config = SecureAuditConfig::default();
    let command = serve_args(&["--transport", "request-response", "--bind", "not-an-address"]);
    assert!(command.apply(&mut config).is_err());
}

#[test]
fn missing_explicit_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = command_config_validate(Some(dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, CliError::Config(_)));
}

#[test]
fn malformed_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server\n");
    let err = command_config_validate(Some(path)).unwrap_err();
    assert!(matches!(err, CliError::Config(_)));
}

// ============================================================================
// SECTION: Output
// ============================================================================

#[test]
fn tool_definitions_are_json_with_schemas() {
    let json: Value = serde_json::from_str(&tool_definitions_json().unwrap()).unwrap();
    let tools = json.as_array().unwrap();
    assert_eq!(tools.len(), 7);
    assert!(tools.iter().any(|tool| tool["name"] == "create_audit"));
    assert!(tools.iter().all(|tool| tool["inputSchema"]["type"] == "object"));
}

#[test]
fn config_summary_names_transports_and_store() {
    let summary = config_summary(&SecureAuditConfig::default());
    assert!(summary.starts_with("config ok: transports=pipe"));
    assert!(summary.contains("store=memory"));
}

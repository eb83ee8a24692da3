// crates/secure-audit-core/tests/log_records.rs
// ============================================================================
// Module: Log Record Tests
// Description: Line rendering and level/component parsing.
// Purpose: Keep the text log format stable for operators and parsers.
// Dependencies: secure-audit-core
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

use secure_audit_core::Component;
use secure_audit_core::InvocationId;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::Timestamp;

#[test]
fn line_contains_header_and_fields_in_order() {
    let id = InvocationId::generate();
    let mut record = LogRecord::new(Component::Dispatch, LogLevel::Warning, "request completed")
        .with_correlation(id)
        .with_field("status", "error")
        .with_field("duration_ms", 12_u64)
        .with_field("message", "bad input here");
    record.timestamp = Timestamp::from_unix_millis(0).unwrap();
    let line = record.to_line();
    assert_eq!(
        line,
        format!(
            "1970-01-01T00:00:00Z - dispatch - WARNING - request completed \
             [correlation_id={id} status=error duration_ms=12 message=\"bad input here\"]"
        )
    );
}

#[test]
fn line_never_spans_lines() {
    let record = LogRecord::new(Component::Pipe, LogLevel::Error, "first\nsecond")
        .with_field("detail", "a\nb");
    assert!(!record.to_line().contains('\n'));
}

#[test]
fn levels_parse_case_insensitively_and_order() {
    assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
    assert_eq!("Debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
    assert!("loud".parse::<LogLevel>().is_err());
    assert!(LogLevel::Debug < LogLevel::Info);
    assert!(LogLevel::Warning < LogLevel::Error);
}

#[test]
fn components_parse_from_env_style_names() {
    assert_eq!("HEARTBEAT".parse::<Component>().unwrap(), Component::Heartbeat);
    assert!("kernel".parse::<Component>().is_err());
}

#[test]
fn timestamps_round_trip_through_rfc3339_at_millisecond_precision() {
    let ts = Timestamp::from_unix_millis(1_767_225_600_123).unwrap();
    let text = ts.to_rfc3339();
    assert_eq!(text, "2026-01-01T00:00:00.123Z");
    assert_eq!(Timestamp::parse_rfc3339(&text).unwrap(), ts);
    assert_eq!(ts.year_month(), "2026-01");
}

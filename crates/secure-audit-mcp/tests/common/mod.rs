// crates/secure-audit-mcp/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared server bootstrap and raw HTTP helpers.
// Purpose: Run a real listener on an ephemeral port for transport tests.
// Dependencies: secure-audit-mcp, secure-audit-config, tokio
// ============================================================================

//! ## Overview
//! Starts an [`McpServer`] on `127.0.0.1:0` and talks to it over plain TCP so
//! the tests see exactly the bytes a client would.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Shared test helpers may be unused in some test binaries."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use secure_audit_config::SecureAuditConfig;
use secure_audit_config::ServerTransport;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_mcp::McpServer;
use secure_audit_mcp::McpServerError;
use secure_audit_mcp::Observability;
use secure_audit_mcp::observability::MemoryLogSink;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Running test server.
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// Shutdown signal.
    pub shutdown: CancellationToken,
    /// Captured log records.
    pub sink: Arc<MemoryLogSink>,
    /// Server task.
    pub handle: JoinHandle<Result<(), McpServerError>>,
}

impl TestServer {
    /// Cancels the server and waits for it to stop.
    pub async fn stop(self) -> Result<(), McpServerError> {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), self.handle).await.unwrap().unwrap()
    }
}

/// Returns a config with the given transports and test-friendly limits.
pub fn config(transports: Vec<ServerTransport>) -> SecureAuditConfig {
    let mut config = SecureAuditConfig::default();
    config.server.transports = transports;
    config.server.bind = "127.0.0.1:0".to_string();
    config.server.max_body_bytes = 4096;
    config.server.heartbeat_interval_ms = 200;
    config.logging.console = false;
    config
}

/// Returns an observability router capturing debug records into a sink.
pub fn capture() -> (Arc<MemoryLogSink>, Arc<Observability>) {
    let sink = Arc::new(MemoryLogSink::new());
    let obs = Arc::new(Observability::to_sink(LogLevel::Debug, sink.clone()));
    (sink, obs)
}

/// Starts a server for `config` on an ephemeral port.
pub async fn start(config: SecureAuditConfig) -> TestServer {
    let (sink, obs) = capture();
    let server = McpServer::from_config(config, obs).unwrap();
    launch(server, sink).await
}

/// Runs an already built server on an ephemeral port.
pub async fn launch(server: McpServer, sink: Arc<MemoryLogSink>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve_on(Some(listener), shutdown.clone()));
    TestServer {
        addr,
        shutdown,
        sink,
        handle,
    }
}

/// Polls the sink until a record matches or ten seconds pass.
pub async fn wait_for_record(sink: &MemoryLogSink, matches: impl Fn(&LogRecord) -> bool) -> LogRecord {
    for _ in 0 .. 200 {
        if let Some(record) = sink.records().into_iter().find(|record| matches(record)) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no matching log record");
}

// ============================================================================
// SECTION: Raw HTTP
// ============================================================================

/// Parsed HTTP response.
#[derive(Debug)]
pub struct HttpReply {
    /// Status code.
    pub status: u16,
    /// Raw header block.
    pub headers: String,
    /// Body text.
    pub body: String,
}

impl HttpReply {
    /// Parses the body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Sends one request with `Connection: close` and reads the full reply.
pub async fn request(addr: SocketAddr, method: &str, path: &str, body: &[u8]) -> HttpReply {
    let head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    send_raw(addr, head.as_bytes(), body).await
}

/// Sends a raw head and body and reads until the server closes.
pub async fn send_raw(addr: SocketAddr, head: &[u8], body: &[u8]) -> HttpReply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(head).await.unwrap();
    stream.write_all(body).await.unwrap();
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut raw))
        .await
        .unwrap()
        .unwrap();
    parse_reply(&raw)
}

/// Splits a raw HTTP/1.1 response into status, headers, and body.
pub fn parse_reply(raw: &[u8]) -> HttpReply {
    let text = String::from_utf8_lossy(raw).into_owned();
    let (headers, body) = text.split_once("\r\n\r\n").unwrap_or((text.as_str(), ""));
    let status = headers
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    HttpReply {
        status,
        headers: headers.to_string(),
        body: body.to_string(),
    }
}

/// Builds a `tools/call` frame.
pub fn tool_call(id: u64, tool: &str, arguments: &Value) -> Vec<u8> {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": arguments}
    })
    .to_string()
    .into_bytes()
}

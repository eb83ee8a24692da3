// crates/secure-audit-mcp/tests/pipe_transport.rs
// ============================================================================
// Module: Pipe Transport Tests
// Description: End-to-end pipe sessions over in-memory duplex streams.
// Purpose: Validate ordered replies, error recovery, and clean shutdown.
// Dependencies: secure-audit-mcp, secure-audit-config, tokio
// ============================================================================

//! Pipe transport tests driving the server's protocol handler.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use secure_audit_config::ServerTransport;
use secure_audit_mcp::McpServer;
use secure_audit_mcp::Observability;
use secure_audit_mcp::TransportKind;
use secure_audit_mcp::transport::ConnectionContext;
use secure_audit_mcp::transport::PipeTransport;
use secure_audit_mcp::transport::serve_connection;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use crate::common::config;

fn line(value: &Value) -> Vec<u8> {
    let mut bytes = value.to_string().into_bytes();
    bytes.push(b'\n');
    bytes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn line_framed_session_in_order_with_recovery() {
    let server =
        McpServer::from_config(config(vec![ServerTransport::Pipe]), Arc::new(Observability::disabled())).unwrap();
    let protocol = Arc::clone(server.protocol());
    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, mut client_write) = tokio::io::split(client);

    let task = tokio::spawn(async move {
        let mut transport = PipeTransport::new(BufReader::new(server_read), server_write, 4096);
        let conn = ConnectionContext::new(TransportKind::Pipe, "pipe", CancellationToken::new());
        serve_connection(&mut transport, &protocol, &conn).await
    });

    client_write.write_all(&line(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))).await.unwrap();
    client_write.write_all(b"{broken\n").await.unwrap();
    client_write
        .write_all(&line(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "create_audit", "arguments": {"title": "Fleet"}}
        })))
        .await
        .unwrap();
    client_write.shutdown().await.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut replies = Vec::new();
    while let Some(text) = tokio::time::timeout(Duration::from_secs(10), lines.next_line()).await.unwrap().unwrap() {
        replies.push(serde_json::from_str::<Value>(&text).unwrap());
    }
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["error"]["code"], -32700);
    assert_eq!(replies[2]["id"], 2);
    assert_eq!(replies[2]["result"]["result"]["audit"]["title"], "Fleet");
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_header_is_answered_and_the_pipe_keeps_serving() {
    let server =
        McpServer::from_config(config(vec![ServerTransport::Pipe]), Arc::new(Observability::disabled())).unwrap();
    let protocol = Arc::clone(server.protocol());
    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, mut client_write) = tokio::io::split(client);

    let task = tokio::spawn(async move {
        let mut transport = PipeTransport::new(BufReader::new(server_read), server_write, 4096);
        let conn = ConnectionContext::new(TransportKind::Pipe, "pipe", CancellationToken::new());
        serve_connection(&mut transport, &protocol, &conn).await
    });

    client_write.write_all(b"Content-Length: lots\r\n\r\n").await.unwrap();
    client_write.write_all(&line(&json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}))).await.unwrap();
    client_write.shutdown().await.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut replies = Vec::new();
    while let Some(text) = tokio::time::timeout(Duration::from_secs(10), lines.next_line()).await.unwrap().unwrap() {
        replies.push(serde_json::from_str::<Value>(&text).unwrap());
    }
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], Value::Null);
    assert_eq!(replies[0]["error"]["code"], -32600);
    assert_eq!(replies[0]["error"]["data"]["kind"], "TransportError");
    assert_eq!(replies[1]["id"], 7);
    assert_eq!(replies[1]["result"], json!({}));
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_closes_an_idle_pipe() {
    let server =
        McpServer::from_config(config(vec![ServerTransport::Pipe]), Arc::new(Observability::disabled())).unwrap();
    let protocol = Arc::clone(server.protocol());
    let (_client, server_side) = tokio::io::duplex(1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let cancel = CancellationToken::new();
    let conn = ConnectionContext::new(TransportKind::Pipe, "pipe", cancel.clone());
    let task = tokio::spawn(async move {
        let mut transport = PipeTransport::new(BufReader::new(server_read), server_write, 4096);
        serve_connection(&mut transport, &protocol, &conn).await
    });
    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(outcome.is_ok());
}

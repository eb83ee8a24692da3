// crates/secure-audit-mcp/tests/http_transport.rs
// ============================================================================
// Module: HTTP Transport Tests
// Description: End-to-end tests for `POST /rpc`.
// Purpose: Validate status mapping, body limits, and concurrent callers.
// Dependencies: secure-audit-mcp, secure-audit-config, tokio
// ============================================================================

//! Request/response transport tests over a real listener.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use std::collections::BTreeSet;

use secure_audit_config::ServerTransport;
use serde_json::json;

use crate::common::config;
use crate::common::request;
use crate::common::send_raw;
use crate::common::start;
use crate::common::tool_call;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tools_list_over_http() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string();
    let reply = request(server.addr, "POST", "/rpc", body.as_bytes()).await;
    assert_eq!(reply.status, 200);
    assert!(reply.headers.to_ascii_lowercase().contains("connection: close"));
    assert_eq!(reply.json()["result"]["tools"].as_array().unwrap().len(), 7);
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn created_audit_is_visible_to_the_next_request() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let created =
        request(server.addr, "POST", "/rpc", &tool_call(1, "create_audit", &json!({"title": "Treasury"})))
            .await
            .json();
    assert_eq!(created["result"]["status"], "ok");
    let id = created["result"]["result"]["audit_id"].clone();

    let fetched =
        request(server.addr, "POST", "/rpc", &tool_call(2, "get_audit", &json!({"audit_id": id}))).await;
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.json()["result"]["result"]["audit"]["title"], "Treasury");
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_failures_are_still_http_ok() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let reply =
        request(server.addr, "POST", "/rpc", &tool_call(1, "get_audit", &json!({"audit_id": 999}))).await;
    assert_eq!(reply.status, 200);
    let result = reply.json()["result"].clone();
    assert_eq!(result["isError"], true);
    assert_eq!(result["error"]["kind"], "ExecutionError");
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_json_is_bad_request() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let reply = request(server.addr, "POST", "/rpc", b"{\"jsonrpc\": ").await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.json()["error"]["code"], -32700);
    assert_eq!(reply.json()["error"]["data"]["kind"], "TransportError");
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_body_is_rejected_before_reading() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let head = "POST /rpc HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
                Content-Length: 100000\r\nConnection: close\r\n\r\n";
    let reply = send_raw(server.addr, head.as_bytes(), b"").await;
    assert_eq!(reply.status, 413);
    assert_eq!(reply.json()["error"]["code"], -32070);
    let records = server.sink.records();
    assert!(records.iter().any(|record| record.message == "frame rejected"));
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn notification_is_accepted_without_body() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let reply = request(server.addr, "POST", "/rpc", body.as_bytes()).await;
    assert_eq!(reply.status, 202);
    assert!(reply.body.is_empty());
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_get_their_own_replies() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let addr = server.addr;
    let mut tasks = Vec::new();
    for n in 0 .. 12_u64 {
        tasks.push(tokio::spawn(async move {
            let frame = tool_call(n, "create_audit", &json!({"title": format!("audit {n}")}));
            let reply = request(addr, "POST", "/rpc", &frame).await.json();
            assert_eq!(reply["id"], n);
            assert_eq!(reply["result"]["result"]["audit"]["title"], format!("audit {n}"));
            reply["result"]["result"]["audit_id"].as_u64().unwrap()
        }));
    }
    let mut ids = BTreeSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }
    assert_eq!(ids.len(), 12);
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_routes_absent_when_not_enabled() {
    let server = start(config(vec![ServerTransport::RequestResponse])).await;
    let reply = request(server.addr, "GET", "/sse", b"").await;
    assert_eq!(reply.status, 404);
    server.stop().await.unwrap();
}

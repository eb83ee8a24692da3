// crates/secure-audit-mcp/src/protocol.rs
// ============================================================================
// Module: JSON-RPC Protocol
// Description: JSON-RPC 2.0 envelope handling and MCP method routing.
// Purpose: Turn raw frames into dispatcher and catalog calls.
// Dependencies: secure-audit-core, serde, serde_json
// ============================================================================

//! ## Overview
//! [`ProtocolHandler::handle_frame`] is the only place raw bytes become
//! typed requests. Frames that are not valid JSON-RPC never reach the
//! dispatcher: they are answered with a JSON-RPC error whose `data.kind` is
//! `TransportError` and logged at WARNING by the transport's component.
//! `tools/call` builds an [`Invocation`] and returns the canonical
//! [`Response`] as the JSON-RPC result, whatever the tool outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use secure_audit_core::Component;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::catalog::Catalog;
use crate::catalog::CatalogError;
use crate::dispatch::Dispatcher;
use crate::invocation::ErrorKind;
use crate::invocation::Invocation;
use crate::invocation::Response;
use crate::invocation::ResponseStatus;
use crate::invocation::run_blocking;
use crate::observability::Observability;
use crate::transport::ConnectionContext;
use crate::transport::TransportError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";
/// MCP protocol revision announced by `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name announced by `initialize`.
pub const SERVER_NAME: &str = "secure-audit";

/// Invalid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Bad method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Server-side failure.
pub const INTERNAL_ERROR: i64 = -32603;
/// Resource does not exist.
pub const RESOURCE_NOT_FOUND: i64 = -32002;
/// Frame exceeds the configured size limit.
pub const PAYLOAD_TOO_LARGE: i64 = -32070;

// ============================================================================
// SECTION: Envelope Types
// ============================================================================

/// Incoming JSON-RPC request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, must be `2.0`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Outgoing JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// Protocol version.
    pub jsonrpc: &'static str,
    /// Echoed request id (`null` when unknown).
    pub id: Value,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Message.
    pub message: String,
    /// Structured detail, carrying `kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub const fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(id: Value, code: i64, message: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: kind.map(|kind| json!({"kind": kind.as_str()})),
            }),
        }
    }

    /// Returns the error code, if this is an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|error| error.code)
    }

    /// Serializes the response to compact JSON bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"response encoding failed"}}"#
                .to_vec()
        })
    }
}

/// Parameters of `tools/call`.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Tool arguments; defaults to `{}`.
    #[serde(default)]
    arguments: Option<Value>,
}

/// Parameters of `resources/read`.
#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    /// Resource URI.
    uri: String,
}

/// Parameters of `prompts/get`.
#[derive(Debug, Deserialize)]
struct PromptGetParams {
    /// Prompt name.
    name: String,
    /// Prompt arguments.
    #[serde(default)]
    arguments: BTreeMap<String, String>,
}

/// `tools/call` result: the canonical response plus MCP content blocks.
#[derive(Debug, Serialize)]
struct ToolCallResult<'a> {
    /// Canonical response fields.
    #[serde(flatten)]
    response: &'a Response,
    /// Text rendering for MCP clients.
    content: Vec<Value>,
    /// MCP error flag.
    #[serde(rename = "isError")]
    is_error: bool,
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Routes decoded JSON-RPC requests to the dispatcher and catalog.
#[derive(Debug, Clone)]
pub struct ProtocolHandler {
    /// Tool dispatcher.
    dispatcher: Arc<Dispatcher>,
    /// Resource and prompt catalog.
    catalog: Arc<Catalog>,
    /// Log router.
    observability: Arc<Observability>,
}

impl ProtocolHandler {
    /// Creates a handler.
    #[must_use]
    pub const fn new(
        dispatcher: Arc<Dispatcher>,
        catalog: Arc<Catalog>,
        observability: Arc<Observability>,
    ) -> Self {
        Self {
            dispatcher,
            catalog,
            observability,
        }
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the log router.
    #[must_use]
    pub fn observability(&self) -> &Arc<Observability> {
        &self.observability
    }

    /// Handles one frame. Returns `None` for notifications.
    pub async fn handle_frame(
        &self,
        bytes: &[u8],
        conn: &ConnectionContext,
    ) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(err) => {
                return Some(self.reject(
                    conn,
                    &TransportError::Parse(err.to_string()),
                    Value::Null,
                ));
            }
        };
        if value.is_array() {
            return Some(self.reject(
                conn,
                &TransportError::Malformed("batch requests are not supported".to_string()),
                Value::Null,
            ));
        }
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                return Some(self.reject(
                    conn,
                    &TransportError::Malformed(format!("invalid request: {err}")),
                    id,
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(self.reject(
                conn,
                &TransportError::Malformed("jsonrpc must be \"2.0\"".to_string()),
                id,
            ));
        }
        let Some(id) = request.id.clone() else {
            self.observability.emit(
                LogRecord::new(conn.transport.component(), LogLevel::Debug, "notification ignored")
                    .with_field("method", request.method.as_str())
                    .with_field("connection", conn.connection_id.as_str()),
            );
            return None;
        };
        Some(self.route(id, request, conn).await)
    }

    /// Builds the error reply for a frame rejected at the transport boundary
    /// and logs it.
    #[must_use]
    pub fn reject(&self, conn: &ConnectionContext, err: &TransportError, id: Value) -> JsonRpcResponse {
        self.observability.emit(
            LogRecord::new(conn.transport.component(), LogLevel::Warning, "frame rejected")
                .with_field("error_kind", ErrorKind::TransportError.as_str())
                .with_field("connection", conn.connection_id.as_str())
                .with_field("error", err.to_string()),
        );
        JsonRpcResponse::failure(id, err.rpc_code(), err.to_string(), Some(ErrorKind::TransportError))
    }

    /// Dispatches a well-formed request to its method.
    async fn route(&self, id: Value, request: JsonRpcRequest, conn: &ConnectionContext) -> JsonRpcResponse {
        let params = request.params.unwrap_or(Value::Null);
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({"tools": self.dispatcher.registry().definitions()}),
            ),
            "tools/call" => self.tools_call(id, params, conn).await,
            "resources/list" => {
                JsonRpcResponse::success(id, json!({"resources": self.catalog.resources()}))
            }
            "resources/templates/list" => JsonRpcResponse::success(
                id,
                json!({"resourceTemplates": self.catalog.resource_templates()}),
            ),
            "resources/read" => match decode_params::<ResourceReadParams>(params) {
                Ok(params) => {
                    let catalog = Arc::clone(&self.catalog);
                    match run_blocking(move || catalog.read(&params.uri)) {
                        Ok(contents) => JsonRpcResponse::success(id, json!({"contents": [contents]})),
                        Err(err) => self.catalog_failure(id, &err),
                    }
                }
                Err(message) => invalid_params(id, message),
            },
            "prompts/list" => JsonRpcResponse::success(id, json!({"prompts": self.catalog.prompts()})),
            "prompts/get" => match decode_params::<PromptGetParams>(params) {
                Ok(params) => {
                    let catalog = Arc::clone(&self.catalog);
                    match run_blocking(move || catalog.render_prompt(&params.name, &params.arguments)) {
                        Ok(prompt) => JsonRpcResponse::success(id, json!(prompt)),
                        Err(err) => self.catalog_failure(id, &err),
                    }
                }
                Err(message) => invalid_params(id, message),
            },
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
                None,
            ),
        }
    }

    /// Handles `tools/call`.
    async fn tools_call(&self, id: Value, params: Value, conn: &ConnectionContext) -> JsonRpcResponse {
        let params = match decode_params::<ToolCallParams>(params) {
            Ok(params) => params,
            Err(message) => return invalid_params(id, message),
        };
        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let invocation = Invocation::new(params.name, arguments, conn.transport, conn.caller.clone());
        let response = self.dispatcher.dispatch(&invocation, &conn.cancel).await;
        let text = serde_json::to_string(&response.result.as_ref().map_or_else(
            || json!({"error": response.error}),
            Clone::clone,
        ))
        .unwrap_or_default();
        let result = ToolCallResult {
            response: &response,
            content: vec![json!({"type": "text", "text": text})],
            is_error: response.status == ResponseStatus::Error,
        };
        JsonRpcResponse::success(id, json!(result))
    }

    /// Maps a catalog error to a JSON-RPC error and logs store failures.
    fn catalog_failure(&self, id: Value, err: &CatalogError) -> JsonRpcResponse {
        match err {
            CatalogError::UnknownResource(_) | CatalogError::NotFound(_) => {
                JsonRpcResponse::failure(id, RESOURCE_NOT_FOUND, err.to_string(), None)
            }
            CatalogError::UnknownPrompt(_) | CatalogError::InvalidArgument(_) => {
                JsonRpcResponse::failure(id, INVALID_PARAMS, err.to_string(), Some(ErrorKind::ValidationError))
            }
            CatalogError::Store(store) => {
                self.observability.emit(
                    LogRecord::new(Component::Catalog, LogLevel::Error, "catalog request failed")
                        .with_field("error_kind", ErrorKind::StorageError.as_str())
                        .with_field("detail", store.to_string()),
                );
                JsonRpcResponse::failure(
                    id,
                    INTERNAL_ERROR,
                    "audit store error",
                    Some(ErrorKind::StorageError),
                )
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Result of `initialize`.
fn initialize_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {"listChanged": false},
            "resources": {"subscribe": false, "listChanged": false},
            "prompts": {"listChanged": false}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Decodes method parameters, treating `null` as an empty object.
fn decode_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, String> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|err| err.to_string())
}

/// Builds an invalid-params error.
fn invalid_params(id: Value, message: String) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        INVALID_PARAMS,
        format!("invalid params: {message}"),
        Some(ErrorKind::ValidationError),
    )
}

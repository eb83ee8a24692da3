// crates/secure-audit-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Wires the store, registry, dispatcher, and transports together.
// Purpose: Run every configured transport against one dispatch core.
// Dependencies: secure-audit-config, secure-audit-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! [`McpServer`] is assembled once from configuration. Every enabled
//! transport shares the same [`ProtocolHandler`], so a tool registered once
//! is reachable from the pipe, `POST /rpc`, and the event stream alike.
//! Shutdown is a single cancellation token: network listeners stop
//! accepting, stream sessions end, and in-flight invocations see the
//! cancellation at their next checkpoint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use secure_audit_config::SecureAuditConfig;
use secure_audit_config::ServerTransport;
use secure_audit_config::StoreType;
use secure_audit_core::Component;
use secure_audit_core::InMemoryAuditStore;
use secure_audit_core::LogLevel;
use secure_audit_core::LogRecord;
use secure_audit_core::SharedAuditStore;
use secure_audit_store_sqlite::SqliteAuditStore;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::dispatch::Dispatcher;
use crate::invocation::TransportKind;
use crate::observability::Observability;
use crate::protocol::ProtocolHandler;
use crate::registry::ToolRegistry;
use crate::tools::audit_tool_registry;
use crate::transport::ConnectionContext;
use crate::transport::HttpState;
use crate::transport::PipeTransport;
use crate::transport::StreamHub;
use crate::transport::StreamSettings;
use crate::transport::http_routes;
use crate::transport::serve_connection;
use crate::transport::stream_routes;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// MCP server errors.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: MCP Server
// ============================================================================

/// MCP server instance.
pub struct McpServer {
    /// Validated configuration.
    config: SecureAuditConfig,
    /// Audit store shared by tools and resources.
    store: SharedAuditStore,
    /// Protocol handler shared by every transport.
    protocol: Arc<ProtocolHandler>,
}

impl McpServer {
    /// Builds a server from configuration, opening the configured store.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the config is invalid or the store
    /// cannot be opened.
    pub fn from_config(
        config: SecureAuditConfig,
        observability: Arc<Observability>,
    ) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let store = build_store(&config)?;
        Self::from_parts(config, store, observability)
    }

    /// Builds a server around an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the config is invalid or a tool fails
    /// to register.
    pub fn from_parts(
        config: SecureAuditConfig,
        store: SharedAuditStore,
        observability: Arc<Observability>,
    ) -> Result<Self, McpServerError> {
        let registry =
            audit_tool_registry(&store).map_err(|err| McpServerError::Init(err.to_string()))?;
        Self::from_registry(config, store, registry, observability)
    }

    /// Builds a server around an existing store and a prebuilt tool set.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the config is invalid.
    pub fn from_registry(
        config: SecureAuditConfig,
        store: SharedAuditStore,
        registry: ToolRegistry,
        observability: Arc<Observability>,
    ) -> Result<Self, McpServerError> {
        config.validate().map_err(|err| McpServerError::Config(err.to_string()))?;
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::clone(&observability),
            Duration::from_millis(config.dispatch.deadline_ms),
        );
        let catalog = Catalog::new(store.clone(), Arc::clone(&observability));
        let protocol =
            ProtocolHandler::new(Arc::new(dispatcher), Arc::new(catalog), observability);
        Ok(Self {
            config,
            store,
            protocol: Arc::new(protocol),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SecureAuditConfig {
        &self.config
    }

    /// Returns the audit store.
    #[must_use]
    pub const fn store(&self) -> &SharedAuditStore {
        &self.store
    }

    /// Returns the protocol handler.
    #[must_use]
    pub const fn protocol(&self) -> &Arc<ProtocolHandler> {
        &self.protocol
    }

    /// Builds the HTTP router for the enabled network transports.
    #[must_use]
    pub fn router(&self, shutdown: &CancellationToken) -> Router {
        let server = &self.config.server;
        let mut app = Router::new();
        if server.transports.contains(&ServerTransport::RequestResponse) {
            app = app.merge(http_routes(HttpState::new(
                Arc::clone(&self.protocol),
                server.max_body_bytes,
                shutdown.clone(),
            )));
        }
        if server.transports.contains(&ServerTransport::Stream) {
            let hub = StreamHub::new(
                Arc::clone(&self.protocol),
                StreamSettings {
                    queue_depth: server.stream_queue_depth,
                    heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
                    max_body_bytes: server.max_body_bytes,
                },
                shutdown.clone(),
            );
            app = app.merge(stream_routes(hub));
        }
        app
    }

    /// Serves until interrupted with Ctrl-C, or until the pipe closes when
    /// the pipe is the only transport.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel();
            }
        });
        self.serve_until(shutdown).await
    }

    /// Binds the configured address if needed and serves until `shutdown`.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when binding or serving fails.
    pub async fn serve_until(self, shutdown: CancellationToken) -> Result<(), McpServerError> {
        let listener = if self.config.server.needs_listener() {
            let addr =
                self.config.server.bind_addr().map_err(|err| McpServerError::Config(err.to_string()))?;
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|err| McpServerError::Transport(format!("bind {addr} failed: {err}")))?;
            Some(listener)
        } else {
            None
        };
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener. The pipe transport, when
    /// enabled, uses the process standard input and output.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when a network transport is enabled
    /// without a listener, or the HTTP server fails.
    pub async fn serve_on(
        self,
        listener: Option<TcpListener>,
        shutdown: CancellationToken,
    ) -> Result<(), McpServerError> {
        let observability = Arc::clone(self.protocol.observability());
        let server = &self.config.server;
        if server.needs_listener() && listener.is_none() {
            return Err(McpServerError::Config("network transport requires a listener".to_string()));
        }
        let local = listener.as_ref().and_then(|listener| listener.local_addr().ok());
        let transports: Vec<&str> = server.transports.iter().map(|t| t.as_str()).collect();
        let mut started = LogRecord::new(Component::Server, LogLevel::Info, "server started")
            .with_field("transports", transports.join(","));
        if let Some(addr) = local {
            started = started.with_field("bind", addr.to_string());
        }
        observability.emit(started);

        let http = listener.map(|listener| {
            let app = self.router(&shutdown);
            let stop = shutdown.clone();
            tokio::spawn(async move {
                axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                    .with_graceful_shutdown(stop.cancelled_owned())
                    .await
            })
        });

        let pipe = server.transports.contains(&ServerTransport::Pipe).then(|| {
            let pipe_only = server.transports.iter().all(|t| *t == ServerTransport::Pipe);
            let protocol = Arc::clone(&self.protocol);
            let max_body_bytes = server.max_body_bytes;
            let stop = shutdown.clone();
            tokio::spawn(async move {
                let mut transport = PipeTransport::new(
                    BufReader::new(tokio::io::stdin()),
                    tokio::io::stdout(),
                    max_body_bytes,
                );
                let conn = ConnectionContext::new(TransportKind::Pipe, "pipe", stop.child_token());
                let _ = serve_connection(&mut transport, &protocol, &conn).await;
                if pipe_only {
                    stop.cancel();
                }
            })
        });

        shutdown.cancelled().await;
        let mut outcome = Ok(());
        if let Some(http) = http {
            outcome = match http.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(McpServerError::Transport(format!("http server failed: {err}"))),
                Err(err) => Err(McpServerError::Transport(format!("http server task failed: {err}"))),
            };
        }
        if let Some(pipe) = pipe {
            let _ = pipe.await;
        }
        let stopped = match &outcome {
            Ok(()) => LogRecord::new(Component::Server, LogLevel::Info, "server stopped"),
            Err(err) => LogRecord::new(Component::Server, LogLevel::Error, "server stopped")
                .with_field("error_kind", "TransportError")
                .with_field("detail", err.to_string()),
        };
        observability.emit(stopped);
        observability.flush();
        outcome
    }
}

/// Opens the configured audit store.
fn build_store(config: &SecureAuditConfig) -> Result<SharedAuditStore, McpServerError> {
    match config.store.store_type {
        StoreType::Memory => Ok(SharedAuditStore::from_store(InMemoryAuditStore::new())),
        StoreType::Sqlite => {
            let sqlite = config.store.sqlite().ok_or_else(|| {
                McpServerError::Config("sqlite store requires store.path".to_string())
            })?;
            let store =
                SqliteAuditStore::new(&sqlite).map_err(|err| McpServerError::Init(err.to_string()))?;
            Ok(SharedAuditStore::from_store(store))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, reason = "test assertions")]

    use std::sync::Arc;

    use secure_audit_config::SecureAuditConfig;
    use secure_audit_config::ServerTransport;
    use secure_audit_config::StoreType;
    use secure_audit_core::AuditFilter;
    use secure_audit_core::AuditStore;

    use super::McpServer;
    use super::McpServerError;
    use crate::observability::Observability;

    #[test]
    fn memory_store_server_registers_every_tool() {
        let server = McpServer::from_config(SecureAuditConfig::default(), Arc::new(Observability::disabled()))
            .unwrap();
        assert_eq!(server.protocol().dispatcher().registry().len(), 7);
    }

    #[test]
    fn sqlite_store_without_path_is_rejected() {
        let mut config = SecureAuditConfig::default();
        config.store.store_type = StoreType::Sqlite;
        config.store.path = None;
        let err = McpServer::from_config(config, Arc::new(Observability::disabled())).err().unwrap();
        assert!(matches!(err, McpServerError::Config(_)));
    }

    #[test]
    fn sqlite_store_opens_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SecureAuditConfig::default();
        config.store.store_type = StoreType::Sqlite;
        config.store.path = Some(dir.path().join("audits.db"));
        let server = McpServer::from_config(config, Arc::new(Observability::disabled())).unwrap();
        assert!(server.store().list(&AuditFilter::default()).unwrap().is_empty());
        assert!(dir.path().join("audits.db").exists());
    }

    #[tokio::test]
    async fn network_transport_without_listener_fails() {
        let mut config = SecureAuditConfig::default();
        config.server.transports = vec![ServerTransport::RequestResponse];
        let server = McpServer::from_config(config, Arc::new(Observability::disabled())).unwrap();
        let err = server.serve_on(None, tokio_util::sync::CancellationToken::new()).await.err().unwrap();
        assert!(matches!(err, McpServerError::Config(_)));
    }
}

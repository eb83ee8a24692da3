// crates/secure-audit-cli/src/main.rs
// ============================================================================
// Module: SecureAudit CLI Entry Point
// Description: Command dispatcher for the SecureAudit MCP server.
// Purpose: Start the server, list tool contracts, and check configuration.
// Dependencies: clap, secure-audit-config, secure-audit-mcp, thiserror, tokio
// ============================================================================

//! ## Overview
//! `secure-audit serve` loads configuration (file, then environment, then
//! command-line flags), opens the log destinations and the audit store, and
//! runs every selected transport until interrupted. Any failure before the
//! server is up exits with status 1. `tools list` prints the tool contracts
//! as JSON and `config validate` checks a configuration without serving.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use secure_audit_config::ConfigError;
use secure_audit_config::SecureAuditConfig;
use secure_audit_config::ServerTransport;
use secure_audit_core::InMemoryAuditStore;
use secure_audit_core::LogLevel;
use secure_audit_core::SharedAuditStore;
use secure_audit_mcp::McpServer;
use secure_audit_mcp::McpServerError;
use secure_audit_mcp::Observability;
use secure_audit_mcp::audit_tool_registry;
use secure_audit_mcp::observability::ObservabilityError;
use secure_audit_mcp::registry::RegistryError;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// How long runtime shutdown waits for blocked stdin reads.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "secure-audit", version, disable_help_subcommand = true)]
struct Cli {
    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server.
    Serve(ServeCommand),
    /// Inspect registered tools.
    Tools {
        /// Tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
    /// Inspect configuration.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug, Default)]
struct ServeCommand {
    /// Transport to enable; repeat to run several. Defaults to the config.
    #[arg(long = "transport", value_enum, value_name = "TRANSPORT")]
    transports: Vec<TransportArg>,
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Bind address for network transports.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
    /// Minimum log level.
    #[arg(long, value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
}

/// `tools` subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Print tool definitions as JSON.
    List,
}

/// `config` subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration.
    Validate {
        /// Config file path.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

/// Transport selection on the command line.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum TransportArg {
    /// Framed JSON-RPC over stdin/stdout.
    Pipe,
    /// `POST /rpc`.
    RequestResponse,
    /// `GET /sse` with `POST /messages`.
    Stream,
}

impl From<TransportArg> for ServerTransport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Pipe => Self::Pipe,
            TransportArg::RequestResponse => Self::RequestResponse,
            TransportArg::Stream => Self::Stream,
        }
    }
}

/// Parses a log level flag.
fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    value.parse()
}

impl ServeCommand {
    /// Applies command-line overrides on top of file and environment config.
    fn apply(&self, config: &mut SecureAuditConfig) -> Result<(), ConfigError> {
        if !self.transports.is_empty() {
            let mut transports: Vec<ServerTransport> =
                self.transports.iter().copied().map(ServerTransport::from).collect();
            transports.sort_unstable();
            transports.dedup();
            config.server.transports = transports;
        }
        if let Some(bind) = &self.bind {
            config.server.bind.clone_from(bind);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        config.validate()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures; each maps to exit status 1.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A log destination could not be opened.
    #[error(transparent)]
    Logging(#[from] ObservabilityError),
    /// Tool registration failed.
    #[error("tool registry error: {0}")]
    Registry(#[from] RegistryError),
    /// Server startup or serving failed.
    #[error(transparent)]
    Server(#[from] McpServerError),
    /// Output could not be written.
    #[error("output error: {0}")]
    Output(String),
}

/// Result alias for CLI commands.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses arguments and runs the command on a multi-threaded runtime.
fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => return emit_error(&format!("runtime error: {err}")),
    };
    let code = runtime.block_on(async move {
        match run(cli).await {
            Ok(code) => code,
            Err(err) => emit_error(&err.to_string()),
        }
    });
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

/// Runs the selected command.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Tools {
            command: ToolsCommand::List,
        } => command_tools_list(),
        Commands::Config {
            command: ConfigCommand::Validate {
                config,
            },
        } => command_config_validate(config),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Builds the effective configuration for `serve`.
fn serve_config(command: &ServeCommand) -> CliResult<SecureAuditConfig> {
    let mut config = SecureAuditConfig::load(command.config.as_deref())?;
    command.apply(&mut config)?;
    Ok(config)
}

/// Runs the server until shutdown.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = serve_config(&command)?;
    let observability = Arc::new(Observability::from_config(&config.logging)?);
    let server = McpServer::from_config(config, observability)?;
    server.serve().await?;
    Ok(ExitCode::SUCCESS)
}

/// Renders the tool definitions as pretty JSON.
fn tool_definitions_json() -> CliResult<String> {
    let store = SharedAuditStore::from_store(InMemoryAuditStore::new());
    let registry = audit_tool_registry(&store)?;
    serde_json::to_string_pretty(&registry.definitions())
        .map_err(|err| CliError::Output(err.to_string()))
}

/// Prints the tool definitions.
fn command_tools_list() -> CliResult<ExitCode> {
    write_stdout_line(&tool_definitions_json()?)?;
    Ok(ExitCode::SUCCESS)
}

/// Summarizes a valid configuration.
fn config_summary(config: &SecureAuditConfig) -> String {
    let transports: Vec<&str> = config.server.transports.iter().map(|t| t.as_str()).collect();
    format!(
        "config ok: transports={} bind={} store={} log_level={}",
        transports.join(","),
        config.server.bind,
        config.store.store_type.as_str(),
        config.logging.level
    )
}

/// Loads, validates, and summarizes a configuration.
fn command_config_validate(path: Option<PathBuf>) -> CliResult<ExitCode> {
    let config = SecureAuditConfig::load(path.as_deref())?;
    write_stdout_line(&config_summary(&config))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::Output(err.to_string()))
}

/// Writes an error line to stderr and returns the failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "secure-audit: {message}");
    ExitCode::FAILURE
}

// crates/secure-audit-mcp/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Named tool descriptors with compiled input contracts.
// Purpose: Resolve tool names to handlers and validate arguments.
// Dependencies: async-trait, jsonschema, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Tools are registered once through a [`ToolRegistryBuilder`] and frozen
//! into a [`ToolRegistry`]. Freezing moves the registry behind an `Arc` in
//! the dispatcher, so the tool set can only change by building a new
//! registry. Each descriptor carries a JSON Schema (draft 2020-12) that is
//! compiled at registration time; a schema that does not compile is a
//! registration error, not a call-time surprise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::Draft;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::invocation::ExecutionContext;
use crate::invocation::ToolFailure;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction and lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with the same name is already registered.
    #[error("DuplicateToolError: tool {0} is already registered")]
    DuplicateTool(String),
    /// No tool with the requested name exists.
    #[error("UnknownToolError: unknown tool: {0}")]
    UnknownTool(String),
    /// The input contract is not a valid schema.
    #[error("invalid input contract for {name}: {message}")]
    InvalidContract {
        /// Tool name.
        name: String,
        /// Compiler error.
        message: String,
    },
}

// ============================================================================
// SECTION: Handler Trait
// ============================================================================

/// Executes one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with validated arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolFailure`] describing why the tool could not finish.
    async fn call(&self, ctx: &ExecutionContext, arguments: Value) -> Result<Value, ToolFailure>;
}

// ============================================================================
// SECTION: Input Contract
// ============================================================================

/// Compiled JSON Schema describing a tool's arguments.
pub struct InputContract {
    /// Source schema, published through `tools/list`.
    schema: Value,
    /// Compiled validator.
    validator: Validator,
}

impl InputContract {
    /// Compiles `schema` as a draft 2020-12 JSON Schema.
    ///
    /// # Errors
    ///
    /// Returns the compiler message when the schema is invalid.
    pub fn compile(schema: Value) -> Result<Self, String> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|err| format!("invalid schema: {err}"))?;
        Ok(Self {
            schema,
            validator,
        })
    }

    /// Returns the source schema.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Checks `arguments` against the contract.
    ///
    /// # Errors
    ///
    /// Returns every violation message.
    pub fn validate(&self, arguments: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> =
            self.validator.iter_errors(arguments).map(|err| err.to_string()).collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Registered tool: name, description, contract, and handler.
pub struct ToolDescriptor {
    /// Unique tool name.
    name: String,
    /// Human-readable description.
    description: String,
    /// Compiled argument contract.
    contract: InputContract,
    /// Tool implementation.
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor").field("name", &self.name).finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Creates a descriptor, compiling its input contract.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidContract`] when the schema is invalid.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let contract = InputContract::compile(schema).map_err(|message| {
            RegistryError::InvalidContract {
                name: name.clone(),
                message,
            }
        })?;
        Ok(Self {
            name,
            description: description.into(),
            contract,
            handler,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input contract.
    #[must_use]
    pub const fn contract(&self) -> &InputContract {
        &self.contract
    }

    /// Returns the handler.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }

    /// Returns the public listing entry.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.contract.schema().clone(),
        }
    }
}

/// Tool listing entry returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Argument schema.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Mutable registry used during startup.
#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    /// Registered tools keyed by name.
    tools: BTreeMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] when the name is taken; the
    /// existing registration is left untouched.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.tools.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateTool(descriptor.name().to_string()));
        }
        self.tools.insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
        }
    }
}

/// Frozen tool registry shared by every transport.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    /// Registered tools keyed by name.
    tools: BTreeMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Looks up a tool by exact name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when no tool matches.
    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDescriptor>, RegistryError> {
        self.tools.get(name).cloned().ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Returns listing entries in name order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Returns registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

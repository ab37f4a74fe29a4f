//! Tool Protocol Abstraction Layer
//!
//! Participants call external functions (clock, date arithmetic, weather lookups, user
//! supplied closures) through this layer. The orchestrator never sees tool traffic: an
//! agent resolves every tool call itself before handing back a single reply.
//!
//! # Architecture
//!
//! ```text
//! Agent → ToolRegistry (allow-listed) → Tool → ToolProtocol (trait) → [datetime | weather | custom]
//! ```
//!
//! # Example
//!
//! ```rust
//! use agentchat::tool_protocol::{ToolParameter, ToolParameterType};
//!
//! let param = ToolParameter::new("days", ToolParameterType::Integer)
//!     .with_description("Number of forecast days")
//!     .with_default(serde_json::json!(1));
//! assert!(!param.required);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data from the tool
    pub output: serde_json::Value,
    /// Optional error message if execution failed
    pub error: Option<String>,
    /// Metadata about the execution (timing, source URL, etc.)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    /// Convenience constructor for successful tool execution.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for failed tool execution.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attach application specific metadata to the result.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    /// Define a new tool parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
        }
    }

    /// Add a human readable description that will surface in the tool catalogue.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provide a default value used when the model omits the parameter.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Metadata about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// Create metadata with the supplied identifier and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter definition to the tool metadata.
    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// One catalogue line per tool, in the shape agents append to their system prompt.
    ///
    /// `get_date_difference(start: string (required), end: string (required)) - Days between two dates`
    pub fn catalogue_line(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let kind = serde_json::to_value(&p.param_type)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                let mut line = format!("{}: {}", p.name, kind);
                if p.required {
                    line.push_str(" (required)");
                } else if let Some(default) = &p.default {
                    line.push_str(&format!(" (default {})", default));
                }
                if let Some(desc) = &p.description {
                    line.push_str(&format!(" {}", desc));
                }
                line
            })
            .collect();
        format!("{}({}) - {}", self.name, params.join(", "), self.description)
    }
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Execute a tool with the given parameters
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;

    /// Get metadata about available tools
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Protocol identifier (e.g., "datetime", "weather", "custom")
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
#[derive(Debug, Clone)]
pub enum ToolError {
    /// Requested tool is not registered in the current registry/protocol.
    NotFound(String),
    /// Tool execution completed with an application level failure.
    ExecutionFailed(String),
    /// The provided JSON parameters failed validation or deserialization.
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
            ToolError::ExecutionFailed(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// A tool that can be used by agents
#[derive(Clone)]
pub struct Tool {
    /// Metadata describing the tool interface.
    metadata: ToolMetadata,
    /// Underlying protocol implementation that actually executes the tool.
    protocol: Arc<dyn ToolProtocol>,
}

impl Tool {
    /// Create a new tool bound to the supplied protocol implementation.
    pub fn new(metadata: ToolMetadata, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { metadata, protocol }
    }

    /// Borrow the static metadata for the tool.
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Name of the protocol serving this tool.
    pub fn protocol_name(&self) -> &str {
        self.protocol.protocol_name()
    }

    /// Execute the tool using the configured protocol.
    pub async fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        self.protocol.execute(&self.metadata.name, parameters).await
    }
}

/// Registry for managing tools available to agents.
///
/// Tools may come from several protocols. Names are unique across the registry; a
/// later registration with the same name replaces the earlier one.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Tool>,
}

impl ToolRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool a protocol advertises, returning how many were added.
    pub async fn add_protocol(
        &mut self,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let advertised = protocol.list_tools().await?;
        let count = advertised.len();
        for metadata in advertised {
            log::debug!(
                "agentchat::tool_protocol::ToolRegistry::add_protocol(...): registering {} from {}",
                metadata.name,
                protocol.protocol_name()
            );
            self.add_tool(Tool::new(metadata, protocol.clone()));
        }
        Ok(count)
    }

    /// Insert or replace a tool definition.
    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.insert(tool.metadata.name.clone(), tool);
    }

    /// Remove a tool by name returning the owned entry if present.
    pub fn remove_tool(&mut self, name: &str) -> Option<Tool> {
        self.tools.remove(name)
    }

    /// Borrow a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// List metadata for registered tools, ordered by name.
    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        self.tools.values().map(|t| &t.metadata).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Copy of this registry containing only the allow-listed tool names.
    ///
    /// Entries in `allowed` may name a single tool (`get_weather`) or a whole protocol
    /// (`datetime`). Names that match nothing fail with [`ToolError::NotFound`] so a typo
    /// in an allow-list does not silently strip an agent of its functions.
    pub fn restricted_to<S: AsRef<str>>(&self, allowed: &[S]) -> Result<ToolRegistry, ToolError> {
        let mut restricted = ToolRegistry::new();
        for entry in allowed {
            let entry = entry.as_ref();
            let matches: Vec<&Tool> = self
                .tools
                .values()
                .filter(|t| t.metadata.name == entry || t.protocol_name() == entry)
                .collect();
            if matches.is_empty() {
                return Err(ToolError::NotFound(entry.to_string()));
            }
            for tool in matches {
                restricted.add_tool(tool.clone());
            }
        }
        Ok(restricted)
    }

    /// Execute a named tool with serialized parameters.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        tool.execute(parameters).await
    }

    /// Multi-line tool catalogue for system prompts.
    pub fn catalogue(&self) -> String {
        self.list_tools()
            .iter()
            .map(|m| format!("- {}", m.catalogue_line()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//! Closure-backed [`ToolProtocol`] implementation.
//!
//! `CustomToolProtocol` turns plain Rust functions (sync or async) into functions an
//! agent can call. The built-in `datetime` and `weather` protocols live in
//! [`crate::tools`]; everything scenario specific goes through here.
//!
//! ```ignore
//! let protocol = Arc::new(CustomToolProtocol::new());
//! let mut registry = ToolRegistry::new();
//! registry.add_protocol(protocol).await?;
//! ```

use crate::agentchat::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Type alias for synchronous tool functions exposed via the custom adapter.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Type alias for asynchronous tool functions exposed via the custom adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(
            JsonValue,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>>
                    + Send,
            >,
        > + Send
        + Sync,
>;

/// Custom function-calling tool adapter
///
/// # Example
///
/// ```rust
/// use agentchat::tool_protocols::CustomToolProtocol;
/// use agentchat::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let adapter = CustomToolProtocol::new();
/// adapter
///     .register_tool(
///         ToolMetadata::new("book_venue", "Reserve a venue for an event")
///             .with_parameter(ToolParameter::new("venue", ToolParameterType::String).required()),
///         Arc::new(|params| {
///             let venue = params["venue"].as_str().unwrap_or("unknown");
///             Ok(ToolResult::success(serde_json::json!({ "booked": venue })))
///         }),
///     )
///     .await;
/// # }
/// ```
pub struct CustomToolProtocol {
    name: String,
    tools: Arc<RwLock<HashMap<String, ToolMetadata>>>,
    sync_functions: Arc<RwLock<HashMap<String, ToolFunction>>>,
    async_functions: Arc<RwLock<HashMap<String, AsyncToolFunction>>>,
}

impl CustomToolProtocol {
    /// Create an empty adapter ready to accept new tool registrations.
    pub fn new() -> Self {
        Self::named("custom")
    }

    /// Create an empty adapter reporting `name` as its protocol name, so several custom
    /// adapters can be told apart in allow-lists.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Arc::new(RwLock::new(HashMap::new())),
            sync_functions: Arc::new(RwLock::new(HashMap::new())),
            async_functions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a synchronous tool function.
    ///
    /// Subsequent calls will overwrite any existing tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.async_functions.write().await.remove(&name);
        self.sync_functions.write().await.insert(name, function);
    }

    /// Register an asynchronous tool function.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.sync_functions.write().await.remove(&name);
        self.async_functions.write().await.insert(name, function);
    }

    /// Remove a tool from the adapter.
    pub async fn unregister_tool(&self, name: &str) {
        self.tools.write().await.remove(name);
        self.sync_functions.write().await.remove(name);
        self.async_functions.write().await.remove(name);
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let async_func = self.async_functions.read().await.get(tool_name).cloned();
        if let Some(func) = async_func {
            return func(parameters).await;
        }

        let sync_func = self.sync_functions.read().await.get(tool_name).cloned();
        if let Some(func) = sync_func {
            return func(parameters);
        }

        Err(Box::new(ToolError::NotFound(tool_name.to_string())))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        Ok(tools.values().cloned().collect())
    }

    fn protocol_name(&self) -> &str {
        &self.name
    }
}

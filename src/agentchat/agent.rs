//! Group chat participants.
//!
//! The group chat only needs one thing from a participant: given the shared transcript,
//! produce exactly one reply (or fail). [`Participant`] captures that contract;
//! [`Agent`] is the stock implementation backed by a [`ClientWrapper`] with an optional,
//! allow-listed set of callable functions.
//!
//! # Tool calling
//!
//! When an agent has tools, their catalogue is appended to its system prompt and the
//! model is told to answer with
//! `{"tool_call": {"name": "...", "parameters": {...}}}` when it wants one. The agent
//! runs the call, feeds the outcome back and asks again, up to `max_tool_iterations`
//! round-trips. None of this is visible to the group chat, which only sees the final text.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentchat::agent::Agent;
//! use agentchat::clients::openai::OpenAIClient;
//! use agentchat::ProviderConfig;
//! use std::sync::Arc;
//!
//! let client = Arc::new(OpenAIClient::new(&ProviderConfig::from_env()));
//! let pm = Agent::new("PMAgent", client)
//!     .with_description("Turns feature requests into plans")
//!     .with_instructions("You are a product manager. Reply with a numbered plan.");
//! ```

use crate::agentchat::client_wrapper::{
    ClientWrapper, GenerationOptions, Message, Role, TokenUsage,
};
use crate::agentchat::config::{AgentChatConfig, DEFAULT_MAX_TOOL_ITERATIONS};
use crate::agentchat::event::{AgentEvent, EventHandler};
use crate::agentchat::history::ChatMessage;
use crate::agentchat::tool_protocol::{ToolError, ToolRegistry};
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

/// Final output of one participant invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentResponse {
    pub content: String,
    /// Summed over every LLM round-trip of the reply, `None` when the provider reports nothing.
    ///
    /// Read from the client's last-usage slot after each call. When one client is shared
    /// by agents replying concurrently, a reply may be credited with another call's usage.
    pub tokens_used: Option<TokenUsage>,
    pub tool_calls_made: usize,
}

impl AgentResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
            tool_calls_made: 0,
        }
    }
}

/// A named conversational actor that produces one reply given the shared transcript.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Unique within a group chat.
    fn name(&self) -> &str;

    /// Shown to model-driven selection prompts.
    fn description(&self) -> &str {
        ""
    }

    /// Produce the next reply. `events` is the group chat's handler, if any.
    async fn produce_reply(
        &self,
        history: &[ChatMessage],
        events: Option<&Arc<dyn EventHandler>>,
    ) -> Result<AgentResponse, Box<dyn Error + Send + Sync>>;
}

/// Tool invocation requested by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// Chat-completion participant with an optional tool loop.
pub struct Agent {
    name: String,
    description: String,
    instructions: String,
    client: Arc<dyn ClientWrapper>,
    tools: ToolRegistry,
    max_tool_iterations: usize,
    options: Option<GenerationOptions>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Agent {
    pub fn new(name: impl Into<String>, client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            client,
            tools: ToolRegistry::new(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            options: None,
            event_handler: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// System prompt for every reply.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Give the agent every tool in `registry`.
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = registry;
        self
    }

    /// Give the agent only the allow-listed subset of `registry`.
    ///
    /// Entries are tool names or protocol names; see [`ToolRegistry::restricted_to`].
    pub fn with_allowed_tools<S: AsRef<str>>(
        mut self,
        registry: &ToolRegistry,
        allowed: &[S],
    ) -> Result<Self, ToolError> {
        self.tools = registry.restricted_to(allowed)?;
        Ok(self)
    }

    pub fn with_max_tool_iterations(mut self, max_tool_iterations: usize) -> Self {
        self.max_tool_iterations = max_tool_iterations;
        self
    }

    /// Apply shared defaults from an [`AgentChatConfig`].
    pub fn with_config(mut self, config: &AgentChatConfig) -> Self {
        self.max_tool_iterations = config.max_tool_iterations;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Handler that receives this agent's events in addition to the group chat's one.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    async fn emit(&self, events: Option<&Arc<dyn EventHandler>>, event: AgentEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_agent_event(&event).await;
        }
        if let Some(handler) = events {
            handler.on_agent_event(&event).await;
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();
        if !self.tools.is_empty() {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str("You have access to the following tools:\n");
            prompt.push_str(&self.tools.catalogue());
            prompt.push_str(
                "\n\nTo use a tool, respond with a JSON object in the following format:\n\
                 {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                 After tool execution, I'll provide the result and you can continue.",
            );
        }
        prompt
    }

    /// Map the shared transcript onto this agent's point of view.
    ///
    /// Own replies become assistant turns; everything else is a user turn, with other
    /// participants' replies prefixed by `[Name]: ` so the model can tell speakers apart.
    pub fn build_messages(&self, history: &[ChatMessage]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        let system = self.system_prompt();
        if !system.is_empty() {
            messages.push(Message::new(Role::System, system));
        }
        for entry in history {
            let message = if entry.author == self.name {
                Message::new(Role::Assistant, &*entry.content)
            } else if entry.role == Role::System {
                Message::new(Role::System, &*entry.content)
            } else if entry.is_from_user() {
                Message::new(Role::User, &*entry.content)
            } else {
                Message::new(Role::User, format!("[{}]: {}", entry.author, entry.content))
            };
            messages.push(message);
        }
        messages
    }

    async fn call_llm(
        &self,
        messages: &[Message],
        iteration: usize,
        usage: &mut Option<TokenUsage>,
        events: Option<&Arc<dyn EventHandler>>,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.emit(
            events,
            AgentEvent::LLMCallStarted {
                agent_name: self.name.clone(),
                iteration,
            },
        )
        .await;

        let reply = self
            .client
            .send_message(messages, self.options.as_ref())
            .await?;

        let call_usage = self.client.get_last_usage();
        if let Some(call_usage) = &call_usage {
            usage
                .get_or_insert_with(TokenUsage::default)
                .accumulate(call_usage);
        }

        self.emit(
            events,
            AgentEvent::LLMCallCompleted {
                agent_name: self.name.clone(),
                iteration,
                tokens_used: call_usage,
                response_length: reply.content.len(),
            },
        )
        .await;

        Ok(reply.content.to_string())
    }
}

#[async_trait]
impl Participant for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn produce_reply(
        &self,
        history: &[ChatMessage],
        events: Option<&Arc<dyn EventHandler>>,
    ) -> Result<AgentResponse, Box<dyn Error + Send + Sync>> {
        let mut messages = self.build_messages(history);
        let mut usage = None;
        let mut tool_iteration = 0;
        let mut llm_iteration = 1;

        let mut current_response = self
            .call_llm(&messages, llm_iteration, &mut usage, events)
            .await?;

        loop {
            let tool_call = match parse_tool_call(&current_response) {
                Some(call) if !self.tools.is_empty() => call,
                _ => break,
            };
            if tool_iteration >= self.max_tool_iterations {
                log::warn!(
                    "agentchat::agent::Agent::produce_reply(...): {} reached {} tool iterations",
                    self.name,
                    self.max_tool_iterations
                );
                self.emit(
                    events,
                    AgentEvent::ToolMaxIterationsReached {
                        agent_name: self.name.clone(),
                        max_iterations: self.max_tool_iterations,
                    },
                )
                .await;
                current_response = format!(
                    "{}\n\n[Warning: Maximum tool iterations reached]",
                    current_response
                );
                break;
            }
            tool_iteration += 1;

            self.emit(
                events,
                AgentEvent::ToolCallDetected {
                    agent_name: self.name.clone(),
                    tool_name: tool_call.name.clone(),
                    parameters: tool_call.parameters.clone(),
                    iteration: tool_iteration,
                },
            )
            .await;
            log::debug!(
                "agentchat::agent::Agent::produce_reply(...): {} calling {} with {}",
                self.name,
                tool_call.name,
                tool_call.parameters
            );

            let tool_result = self
                .tools
                .execute_tool(&tool_call.name, tool_call.parameters)
                .await;

            let (tool_result_message, tool_success, tool_error) = match &tool_result {
                Ok(result) if result.success => (
                    format!(
                        "Tool '{}' executed successfully. Result: {}",
                        tool_call.name,
                        serde_json::to_string_pretty(&result.output)
                            .unwrap_or_else(|_| result.output.to_string())
                    ),
                    true,
                    None,
                ),
                Ok(result) => {
                    let err = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "Unknown error".to_string());
                    (
                        format!("Tool '{}' failed. Error: {}", tool_call.name, err),
                        false,
                        Some(err),
                    )
                }
                Err(e) => (
                    format!("Tool execution error: {}", e),
                    false,
                    Some(e.to_string()),
                ),
            };

            self.emit(
                events,
                AgentEvent::ToolExecutionCompleted {
                    agent_name: self.name.clone(),
                    tool_name: tool_call.name.clone(),
                    success: tool_success,
                    error: tool_error,
                    iteration: tool_iteration,
                },
            )
            .await;

            messages.push(Message::new(Role::Assistant, &current_response));
            messages.push(Message::new(Role::User, tool_result_message));

            llm_iteration += 1;
            current_response = self
                .call_llm(&messages, llm_iteration, &mut usage, events)
                .await?;
        }

        Ok(AgentResponse {
            content: current_response,
            tokens_used: usage,
            tool_calls_made: tool_iteration,
        })
    }
}

/// Extract the first `{"tool_call": {"name": ..., "parameters": {...}}}` fragment from
/// model output. Surrounding prose is ignored.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let start_idx = response.find("{\"tool_call\"")?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end_idx = None;
    for (i, ch) in response[start_idx..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end_idx = Some(start_idx + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let json_str = &response[start_idx..end_idx?];
    let parsed: serde_json::Value = serde_json::from_str(json_str).ok()?;
    let call = parsed.get("tool_call")?;
    let name = call.get("name")?.as_str()?;
    let parameters = call
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall {
        name: name.to_string(),
        parameters,
    })
}

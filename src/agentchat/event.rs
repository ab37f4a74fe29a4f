//! Group chat and agent event system.
//!
//! Provides a callback-based observability layer for runs and participants.
//! Implement [`EventHandler`] to receive notifications about:
//!
//! - **Run lifecycle**: start, cancellation, completion, fatal failure
//! - **Selection**: before the strategy is consulted and which participant it chose (and why)
//! - **Invocation**: before a participant is asked to reply and how that went
//! - **Termination**: every check, including the ones skipped because the author was not authorized
//! - **Agent internals**: LLM round-trips and tool calls inside a single reply
//!
//! # Architecture
//!
//! Events flow through a single [`EventHandler`] trait with two methods:
//! - [`on_agent_event`](EventHandler::on_agent_event) receives [`AgentEvent`]s from agents
//! - [`on_chat_event`](EventHandler::on_chat_event) receives [`ChatEvent`]s from the group chat
//!
//! Both methods have default no-op implementations. A handler registered through
//! [`GroupChatBuilder::with_event_handler`](crate::group_chat::GroupChatBuilder::with_event_handler)
//! is also handed to every participant for the duration of a run.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentchat::event::{ChatEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct TurnPrinter;
//!
//! #[async_trait]
//! impl EventHandler for TurnPrinter {
//!     async fn on_chat_event(&self, event: &ChatEvent) {
//!         if let ChatEvent::AgentSelected { turn, agent_name, .. } = event {
//!             println!("turn {}: {}", turn, agent_name);
//!         }
//!     }
//! }
//! ```

use crate::agentchat::client_wrapper::TokenUsage;
use crate::agentchat::group_chat::StopReason;
use crate::agentchat::selection::SelectionReason;
use async_trait::async_trait;

/// Events emitted by an [`Agent`](crate::agent::Agent) while producing one reply.
///
/// ```text
/// LLMCallStarted { iteration: 1 }
/// LLMCallCompleted { iteration: 1 }
/// (if a tool call is detected)
///   ToolCallDetected { iteration: 1 }
///   ToolExecutionCompleted { iteration: 1 }
///   LLMCallStarted { iteration: 2 }
///   ...
/// (if the loop runs out of iterations)
///   ToolMaxIterationsReached
/// ```
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Fired before each LLM round-trip. Iteration 1 is the initial call.
    LLMCallStarted { agent_name: String, iteration: usize },

    /// Fired after each LLM round-trip completes.
    LLMCallCompleted {
        agent_name: String,
        iteration: usize,
        /// `None` if the provider did not report usage.
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },

    /// The model asked for a function call.
    ToolCallDetected {
        agent_name: String,
        tool_name: String,
        parameters: serde_json::Value,
        iteration: usize,
    },

    /// A requested function call finished. Failures are fed back to the model.
    ToolExecutionCompleted {
        agent_name: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
        iteration: usize,
    },

    /// The tool loop hit its ceiling; the last model output becomes the reply.
    ToolMaxIterationsReached {
        agent_name: String,
        max_iterations: usize,
    },
}

/// Events emitted by a [`GroupChat`](crate::group_chat::GroupChat) run.
///
/// `turn` is 1-based and names the turn being worked on.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    RunStarted {
        participants: Vec<String>,
        maximum_iterations: usize,
    },

    /// Before the selection strategy is consulted.
    SelectionStarted { turn: usize },

    /// After the selection strategy named the next speaker.
    AgentSelected {
        turn: usize,
        agent_name: String,
        reason: SelectionReason,
    },

    /// Before the chosen participant is asked for a reply.
    AgentInvoking { turn: usize, agent_name: String },

    /// The reply was appended to the transcript.
    AgentResponded {
        turn: usize,
        agent_name: String,
        response_length: usize,
        tokens_used: Option<TokenUsage>,
    },

    /// The participant failed; the run aborts after this event.
    AgentFailed {
        turn: usize,
        agent_name: String,
        error: String,
    },

    /// After each append. `evaluated` is false when the author is not allowed to end
    /// the chat and the condition was skipped.
    TerminationChecked {
        turn: usize,
        agent_name: String,
        evaluated: bool,
        terminate: bool,
    },

    RunCancelled { turn_count: usize },

    RunCompleted {
        turn_count: usize,
        stop_reason: StopReason,
    },

    RunFailed { turn_count: usize, error: String },
}

/// Trait for receiving agent and group chat events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called when an agent emits an event. Default is a no-op.
    async fn on_agent_event(&self, _event: &AgentEvent) {}

    /// Called when a group chat emits an event. Default is a no-op.
    async fn on_chat_event(&self, _event: &ChatEvent) {}
}

/// Forwards every event to the `log` facade.
///
/// Turn on with `RUST_LOG=agentchat=debug` (or whatever level the handler was built with)
/// after calling [`init_logger`](crate::init_logger).
#[derive(Debug, Clone)]
pub struct LoggingEventHandler {
    level: log::Level,
}

impl LoggingEventHandler {
    pub fn new(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingEventHandler {
    fn default() -> Self {
        Self::new(log::Level::Debug)
    }
}

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_agent_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::ToolCallDetected {
                agent_name,
                tool_name,
                parameters,
                iteration,
            } => log::log!(
                self.level,
                "agent {} invoking function {} (round {}) with {}",
                agent_name,
                tool_name,
                iteration,
                parameters
            ),
            AgentEvent::ToolExecutionCompleted {
                agent_name,
                tool_name,
                success,
                error,
                ..
            } => log::log!(
                self.level,
                "agent {} function {} finished: success={} {}",
                agent_name,
                tool_name,
                success,
                error.as_deref().unwrap_or("")
            ),
            other => log::log!(self.level, "agent event: {:?}", other),
        }
    }

    async fn on_chat_event(&self, event: &ChatEvent) {
        log::log!(self.level, "chat event: {:?}", event);
    }
}

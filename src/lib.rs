//! # agentchat
//!
//! agentchat orchestrates group chats between LLM-backed participants. A [`GroupChat`]
//! repeatedly picks the next speaker, asks it for a reply over the shared transcript,
//! appends the reply and checks whether the conversation is done, bounded by a hard
//! turn cap.
//!
//! The crate provides layered abstractions for:
//!
//! * **Group chats**: [`GroupChat`] with a builder that rejects bad setups (empty or
//!   duplicate participants, missing turn cap) before a run starts
//! * **Selection**: round-robin, successor tables, or a model that reads the transcript and
//!   names the next speaker ([`selection`])
//! * **Termination**: content markers, designated final speakers, or a yes/no model verdict,
//!   restricted to authorized authors ([`termination`])
//! * **History reduction**: strategies can look at only the tail of the transcript
//!   ([`history::HistoryReducer`])
//! * **Function calling**: [`Agent`]s with allow-listed tools ([`tool_protocol::ToolRegistry`]),
//!   including built-in clock and weather functions ([`tools`])
//! * **Retrieval**: embedding, vector search and grounded answers ([`rag`])
//! * **Observability**: [`EventHandler`] callbacks around every selection, invocation and
//!   termination check, plus `log` integration
//!
//! ## A three-agent plan review
//!
//! ```rust,no_run
//! use agentchat::{Agent, GroupChat, ProviderConfig};
//! use agentchat::clients::openai::OpenAIClient;
//! use agentchat::history::HistoryReducer;
//! use agentchat::selection::SelectionStrategy;
//! use agentchat::termination::TerminationStrategy;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     agentchat::init_logger();
//!     let client = Arc::new(OpenAIClient::new(&ProviderConfig::from_env()));
//!
//!     let chat = GroupChat::builder()
//!         .add_agent(Agent::new("PMAgent", client.clone())
//!             .with_instructions("Own the plan. Say 'approve' once design and development agree."))
//!         .add_agent(Agent::new("DesignAgent", client.clone())
//!             .with_instructions("Propose the UX for the requested feature."))
//!         .add_agent(Agent::new("DeveloperAgent", client.clone())
//!             .with_instructions("Outline the implementation and its risks."))
//!         .with_selection(SelectionStrategy::round_robin().with_initial_agent("PMAgent"))
//!         .with_termination(
//!             TerminationStrategy::content_match("approve")
//!                 .with_authorized_agents(["PMAgent"])
//!                 .with_maximum_iterations(10),
//!         )
//!         .with_history_reducer(HistoryReducer::tail(1))
//!         .build()?;
//!
//!     let result = chat.run("We need to add a Dark Mode feature to our mobile app", None).await?;
//!     for message in &result.history {
//!         println!("{}: {}", message.author, message.content);
//!     }
//!     println!("completed: {}", result.completed);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding agentchat can opt in to `RUST_LOG` driven diagnostics without
/// choosing a logging backend upfront.
///
/// ```rust
/// agentchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agentchat` module.
pub mod agentchat;

// Re-exporting key items for easier external access.
pub use agentchat::agent;
pub use agentchat::agent::{Agent, AgentResponse, Participant};
pub use agentchat::client_wrapper;
pub use agentchat::client_wrapper::{ClientWrapper, GenerationOptions, Message, Role, TokenUsage};
pub use agentchat::clients;
pub use agentchat::config;
pub use agentchat::config::{AgentChatConfig, ProviderConfig};
pub use agentchat::history;
pub use agentchat::history::{ChatMessage, HistoryReducer};
pub use agentchat::prompt_template;

// Orchestration
pub use agentchat::event;
pub use agentchat::event::{AgentEvent, ChatEvent, EventHandler, LoggingEventHandler};
pub use agentchat::group_chat;
pub use agentchat::group_chat::{GroupChat, GroupChatError, RunError, RunResult, StopReason};
pub use agentchat::selection;
pub use agentchat::termination;

// Tools and retrieval
pub use agentchat::rag;
pub use agentchat::tool_protocol;
pub use agentchat::tool_protocols;
pub use agentchat::tools;

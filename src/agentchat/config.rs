//! Configuration for agentchat.
//!
//! Provides [`AgentChatConfig`] for group-chat defaults and [`ProviderConfig`] for
//! reaching an OpenAI-compatible endpoint. Users construct these manually or, for the
//! provider, from environment variables. No file parsing dependencies are required.
//!
//! # Example
//!
//! ```rust
//! use agentchat::AgentChatConfig;
//!
//! let config = AgentChatConfig::default();
//! assert_eq!(config.maximum_iterations, 10);
//!
//! let strict = AgentChatConfig {
//!     maximum_iterations: 4,
//!     ..AgentChatConfig::default()
//! };
//! assert_eq!(strict.max_tool_iterations, 5);
//! ```

use std::env;
use std::time::Duration;

/// Default turn cap applied when a caller relies on the configuration layer.
pub const DEFAULT_MAXIMUM_ITERATIONS: usize = 10;

/// Default number of tool round-trips an agent may make inside one reply.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 5;

/// Group-chat level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentChatConfig {
    /// Hard ceiling on participant invocations per run. Must be positive.
    pub maximum_iterations: usize,
    /// Tool round-trips allowed per agent reply.
    pub max_tool_iterations: usize,
    /// When set, selection and termination only see the last `n` messages unless a
    /// strategy carries its own reducer.
    pub strategy_history_window: Option<usize>,
}

impl Default for AgentChatConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: DEFAULT_MAXIMUM_ITERATIONS,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            strategy_history_window: None,
        }
    }
}

/// Connection settings for an OpenAI-compatible provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Scheme + host, without the `/v1/...` path.
    pub base_url: String,
    /// Bearer credential. Empty for local endpoints that do not check it.
    pub api_key: String,
    /// Model used for chat completions.
    pub chat_model: String,
    /// Model used for embeddings.
    pub embedding_model: String,
    /// Vector length requested from the embedding endpoint.
    pub embedding_dimensions: usize,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            embedding_dimensions: 1536,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl ProviderConfig {
    /// Build a provider configuration from the environment.
    ///
    /// Recognised variables:
    /// - `AGENTCHAT_BASE_URL`
    /// - `AGENTCHAT_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `AGENTCHAT_CHAT_MODEL`
    /// - `AGENTCHAT_EMBEDDING_MODEL`
    ///
    /// Anything unset keeps its [`Default`] value.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](ProviderConfig::from_env) but reads through `lookup`,
    /// which keeps tests away from the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("AGENTCHAT_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = non_empty("AGENTCHAT_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            config.api_key = key;
        }
        if let Some(model) = non_empty("AGENTCHAT_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) = non_empty("AGENTCHAT_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config
    }
}

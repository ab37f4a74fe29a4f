use async_trait::async_trait;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// A ClientWrapper is a wrapper around a specific text generation service.
/// It provides a common interface to interact with the LLMs.
/// It does not keep track of the conversation; participants and strategies build the
/// message list they want answered and hand it over in a single call.
// src/agentchat/client_wrapper.rs

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    // set by the developer to steer the model's responses
    User,
    // a message sent by a human user (or another participant, seen from the current one)
    Assistant, // lets the model know the content was generated as a response to a user message
}

impl Role {
    /// Wire name used by OpenAI-compatible chat APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Sum two usage records field by field.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message. Stored as `Arc<str>` so cloning is cheap.
    pub content: Arc<str>,
}

impl Message {
    /// Build a message from any string-like content.
    pub fn new(role: Role, content: impl AsRef<str>) -> Self {
        Self {
            role,
            content: Arc::from(content.as_ref()),
        }
    }
}

/// Per-request knobs forwarded to the text generation service.
///
/// Strategies that need a terse, deterministic answer (selection, termination)
/// pass a low temperature and a small `max_output_tokens`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature, provider default when `None`.
    pub temperature: Option<f32>,
    /// Upper bound on completion tokens, provider default when `None`.
    pub max_output_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Options tuned for short classification-style answers.
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.0),
            max_output_tokens: Some(64),
        }
    }
}

/// Trait defining the interface to interact with text generation services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the messages to the LLM and get the assistant reply.
    async fn send_message(
        &self,
        messages: &[Message],
        options: Option<&GenerationOptions>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Identifier of the model served by this client.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl reads the usage slot so existing wrappers don't break.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // ClientWrapper implementations supporting TokenUsage tracking should return a Mutex<Option<TokenUsage>> by overriding this method.
        None
    }
}

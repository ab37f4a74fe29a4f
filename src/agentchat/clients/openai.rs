//! The `OpenAIClient` struct implements [`ClientWrapper`] for OpenAI-compatible Chat
//! Completions endpoints and [`EmbeddingService`] for the matching embeddings endpoint.
//!
//! # Key Features
//!
//! - **send_message(...)**: posts to `/v1/chat/completions` and returns the assistant `Message`.
//! - **Automatic Usage Capture**: stores the latest `TokenUsage` internally.
//! - **Inspect Usage**: call `get_last_usage()` after `send_message()`.
//! - **Embeddings**: `embed(...)` posts to `/v1/embeddings` with the configured dimension.
//!
//! Any server speaking the same wire format (Azure OpenAI proxies, Ollama, vLLM, LM Studio)
//! works by pointing `base_url` at it.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentchat::client_wrapper::{ClientWrapper, Message, Role};
//! use agentchat::clients::openai::OpenAIClient;
//! use agentchat::ProviderConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = OpenAIClient::new(&ProviderConfig::from_env());
//!     let resp = client
//!         .send_message(
//!             &[
//!                 Message::new(Role::System, "You are an assistant."),
//!                 Message::new(Role::User, "Hello!"),
//!             ],
//!             None,
//!         )
//!         .await
//!         .unwrap();
//!     println!("Assistant: {}", resp.content);
//!
//!     if let Some(usage) = client.get_last_usage() {
//!         println!(
//!             "Tokens: input {}, output {}, total {}",
//!             usage.input_tokens, usage.output_tokens, usage.total_tokens
//!         );
//!     }
//! }
//! ```
use std::error::Error;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agentchat::client_wrapper::{
    ClientWrapper, GenerationOptions, Message, Role, TokenUsage,
};
use crate::agentchat::clients::common::{get_http_client, post_json, ProviderError};
use crate::agentchat::config::ProviderConfig;
use crate::agentchat::rag::EmbeddingService;

/// Commonly used model identifiers. Any other string works through [`OpenAIClient::with_model`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Model {
    /// `gpt-4o`
    GPT4o,
    /// `gpt-4o-mini`
    GPT4oMini,
    /// `gpt-4.1`
    GPT41,
    /// `gpt-4.1-mini`
    GPT41Mini,
    /// `gpt-4.1-nano`
    GPT41Nano,
}

/// Convert a [`Model`] variant into the string identifier expected by the REST API.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPT4oMini => "gpt-4o-mini".to_string(),
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::GPT41Nano => "gpt-4.1-nano".to_string(),
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Client for OpenAI-compatible chat completions and embeddings.
pub struct OpenAIClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Build a client from a [`ProviderConfig`].
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client: get_http_client(&base_url, config.request_timeout),
            base_url,
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
            token_usage: Mutex::new(None),
        }
    }

    /// Default endpoint with an explicit key and model.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        let config = ProviderConfig {
            api_key: secret_key.to_string(),
            chat_model: model_to_string(model),
            ..ProviderConfig::default()
        };
        Self::new(&config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn store_usage(&self, usage: Option<TokenUsage>) {
        let mut slot = match self.token_usage.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = usage;
    }
}

fn to_wire(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .collect()
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(
        &self,
        messages: &[Message],
        options: Option<&GenerationOptions>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_wire(messages),
            temperature: options.and_then(|o| o.temperature),
            max_tokens: options.and_then(|o| o.max_output_tokens),
        };

        let response: ChatResponse = post_json(
            &self.client,
            &self.endpoint("/v1/chat/completions"),
            &self.api_key,
            &request,
        )
        .await?;

        self.store_usage(response.usage.map(TokenUsage::from));

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ProviderError::MalformedResponse("no choices returned".to_string()))?;

        Ok(Message::new(Role::Assistant, content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[async_trait]
impl EmbeddingService for OpenAIClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
            dimensions: self.embedding_dimensions,
        };
        let response: EmbeddingResponse = post_json(
            &self.client,
            &self.endpoint("/v1/embeddings"),
            &self.api_key,
            &request,
        )
        .await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::MalformedResponse("no embedding returned".to_string()))?;
        if embedding.len() != self.embedding_dimensions {
            return Err(Box::new(ProviderError::MalformedResponse(format!(
                "expected {} dimensions, got {}",
                self.embedding_dimensions,
                embedding.len()
            ))));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }
}

//! Stop conditions for a group chat run.
//!
//! A [`TerminationStrategy`] is consulted after every appended reply. It combines a
//! [`TerminationCondition`] with a [`TerminationAuthorization`] saying whose replies may
//! end the chat, an optional turn cap and an optional history reducer. The group chat
//! enforces the turn cap on its own, whatever the condition says.
//!
//! ```rust
//! use agentchat::termination::TerminationStrategy;
//!
//! let strategy = TerminationStrategy::content_match("approve")
//!     .with_authorized_agents(["PMAgent"])
//!     .with_maximum_iterations(10);
//! assert!(strategy.is_authorized("PMAgent"));
//! assert!(!strategy.is_authorized("DesignAgent"));
//! ```

use crate::agentchat::client_wrapper::{ClientWrapper, GenerationOptions, Message, Role};
use crate::agentchat::history::{ChatMessage, HistoryReducer};
use crate::agentchat::prompt_template::{
    format_history, PromptTemplate, DEFAULT_TERMINATION_TEMPLATE, HISTORY_VARIABLE,
};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The text generation service behind a model-driven condition failed.
#[derive(Debug, Clone)]
pub struct TerminationError(pub String);

impl fmt::Display for TerminationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Termination model call failed: {}", self.0)
    }
}

impl Error for TerminationError {}

/// Model-driven yes/no termination settings.
#[derive(Clone)]
pub struct ModelTermination {
    client: Arc<dyn ClientWrapper>,
    template: PromptTemplate,
    affirmative: String,
    options: GenerationOptions,
}

impl ModelTermination {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            template: PromptTemplate::new(DEFAULT_TERMINATION_TEMPLATE),
            affirmative: "yes".to_string(),
            options: GenerationOptions::deterministic(),
        }
    }

    /// Replace the prompt. `{{$history}}` is filled in per check.
    pub fn with_template(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.template = template.into();
        self
    }

    /// Token whose presence (case-insensitive) in the answer ends the chat.
    pub fn with_affirmative(mut self, token: impl Into<String>) -> Self {
        self.affirmative = token.into();
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn affirmative(&self) -> &str {
        &self.affirmative
    }

    pub fn render_prompt(&self, view: &[ChatMessage]) -> String {
        let mut variables = HashMap::new();
        variables.insert(HISTORY_VARIABLE, format_history(view, false));
        self.template.render(&variables)
    }

    /// Interpret a model answer. Empty answers count as "keep going".
    pub fn parse_answer(&self, answer: &str) -> bool {
        let answer = answer.trim();
        if answer.is_empty() {
            log::warn!(
                "agentchat::termination::ModelTermination::parse_answer(...): empty answer, continuing"
            );
            return false;
        }
        contains_ignore_case(answer, &self.affirmative)
    }
}

impl fmt::Debug for ModelTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelTermination")
            .field("model", &self.client.model_name())
            .field("affirmative", &self.affirmative)
            .finish()
    }
}

/// What has to be true of the transcript for the chat to end.
#[derive(Clone, Debug)]
pub enum TerminationCondition {
    /// The latest message contains `marker`, ignoring case.
    ContentMatch { marker: String },
    /// A text generation service answers affirmatively.
    Model(ModelTermination),
    /// The latest message was written by `agent`.
    AuthorEquals { agent: String },
}

/// Whose replies may trigger termination.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum TerminationAuthorization {
    /// Every participant.
    #[default]
    Any,
    /// Only the named participants. Other authors are never evaluated.
    Only(Vec<String>),
}

impl TerminationAuthorization {
    pub fn permits(&self, author: &str) -> bool {
        match self {
            TerminationAuthorization::Any => true,
            TerminationAuthorization::Only(agents) => agents.iter().any(|a| a == author),
        }
    }
}

/// Outcome of one termination check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminationDecision {
    /// False when the author was not authorized and the condition was skipped.
    pub evaluated: bool,
    pub terminate: bool,
}

/// Decides whether a run should stop after the latest reply.
#[derive(Clone, Debug)]
pub struct TerminationStrategy {
    condition: TerminationCondition,
    authorization: TerminationAuthorization,
    maximum_iterations: Option<usize>,
    history_reducer: Option<HistoryReducer>,
}

impl TerminationStrategy {
    pub fn new(condition: TerminationCondition) -> Self {
        Self {
            condition,
            authorization: TerminationAuthorization::Any,
            maximum_iterations: None,
            history_reducer: None,
        }
    }

    pub fn content_match(marker: impl Into<String>) -> Self {
        Self::new(TerminationCondition::ContentMatch {
            marker: marker.into(),
        })
    }

    pub fn author_equals(agent: impl Into<String>) -> Self {
        Self::new(TerminationCondition::AuthorEquals {
            agent: agent.into(),
        })
    }

    pub fn model(termination: ModelTermination) -> Self {
        Self::new(TerminationCondition::Model(termination))
    }

    /// Only replies from these participants are evaluated.
    pub fn with_authorized_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorization =
            TerminationAuthorization::Only(agents.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_authorization(mut self, authorization: TerminationAuthorization) -> Self {
        self.authorization = authorization;
        self
    }

    /// Turn cap for runs using this strategy. Overrides the group chat level value.
    pub fn with_maximum_iterations(mut self, maximum_iterations: usize) -> Self {
        self.maximum_iterations = Some(maximum_iterations);
        self
    }

    pub fn with_history_reducer(mut self, reducer: HistoryReducer) -> Self {
        self.history_reducer = Some(reducer);
        self
    }

    pub fn condition(&self) -> &TerminationCondition {
        &self.condition
    }

    pub fn authorization(&self) -> &TerminationAuthorization {
        &self.authorization
    }

    pub fn maximum_iterations(&self) -> Option<usize> {
        self.maximum_iterations
    }

    pub fn history_reducer(&self) -> Option<&HistoryReducer> {
        self.history_reducer.as_ref()
    }

    pub fn is_authorized(&self, author: &str) -> bool {
        self.authorization.permits(author)
    }

    /// Configuration checks against the registered participant names.
    pub fn validate(&self, names: &[&str]) -> Result<(), String> {
        if self.maximum_iterations == Some(0) {
            return Err("maximum iterations must be positive".to_string());
        }
        if let TerminationAuthorization::Only(agents) = &self.authorization {
            if let Some(unknown) = agents.iter().find(|a| !names.contains(&a.as_str())) {
                return Err(format!(
                    "termination-authorized agent {:?} is not a participant",
                    unknown
                ));
            }
        }
        match &self.condition {
            TerminationCondition::ContentMatch { marker } if marker.is_empty() => {
                return Err("termination marker must not be empty".to_string());
            }
            TerminationCondition::AuthorEquals { agent } if !names.contains(&agent.as_str()) => {
                return Err(format!("final agent {:?} is not a participant", agent));
            }
            TerminationCondition::Model(model) if model.affirmative.trim().is_empty() => {
                return Err("affirmative token must not be empty".to_string());
            }
            TerminationCondition::Model(model) if !model.template.uses(HISTORY_VARIABLE) => {
                log::warn!(
                    "agentchat::termination::TerminationStrategy::validate(...): termination prompt has no {{{{${}}}}} placeholder",
                    HISTORY_VARIABLE
                );
            }
            _ => {}
        }
        if let Some(reducer) = &self.history_reducer {
            reducer.validate()?;
        }
        Ok(())
    }

    /// Authorization check followed, when permitted, by the condition itself.
    pub async fn should_terminate(
        &self,
        view: &[ChatMessage],
        last_author: &str,
    ) -> Result<TerminationDecision, TerminationError> {
        if !self.is_authorized(last_author) {
            return Ok(TerminationDecision {
                evaluated: false,
                terminate: false,
            });
        }
        let terminate = self.evaluate(view).await?;
        Ok(TerminationDecision {
            evaluated: true,
            terminate,
        })
    }

    /// Evaluate the condition over `view`, ignoring authorization.
    pub async fn evaluate(&self, view: &[ChatMessage]) -> Result<bool, TerminationError> {
        let latest = match view.last() {
            Some(m) => m,
            None => return Ok(false),
        };

        match &self.condition {
            TerminationCondition::ContentMatch { marker } => {
                Ok(contains_ignore_case(&latest.content, marker))
            }
            TerminationCondition::AuthorEquals { agent } => Ok(&latest.author == agent),
            TerminationCondition::Model(model) => {
                let prompt = model.render_prompt(view);
                let reply = model
                    .client
                    .send_message(&[Message::new(Role::User, prompt)], Some(&model.options))
                    .await
                    .map_err(|e| TerminationError(e.to_string()))?;
                Ok(model.parse_answer(&reply.content))
            }
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

//! Next-speaker selection.
//!
//! A [`SelectionStrategy`] names the participant that takes the next turn. It is either
//! rule based (deterministic) or model driven (a text generation service reads a rendered
//! prompt and answers with a name). Whatever the variant, the returned name is checked
//! against the registered participants before it leaves this module.
//!
//! # Example
//!
//! ```rust
//! use agentchat::history::HistoryReducer;
//! use agentchat::selection::SelectionStrategy;
//!
//! let strategy = SelectionStrategy::successors([
//!     ("PMAgent", "DesignAgent"),
//!     ("DesignAgent", "DeveloperAgent"),
//!     ("DeveloperAgent", "PMAgent"),
//! ])
//! .with_initial_agent("PMAgent")
//! .with_history_reducer(HistoryReducer::tail(1));
//! assert_eq!(strategy.initial_agent(), Some("PMAgent"));
//! ```

use crate::agentchat::agent::Participant;
use crate::agentchat::client_wrapper::{ClientWrapper, GenerationOptions, Message, Role};
use crate::agentchat::history::{ChatMessage, HistoryReducer};
use crate::agentchat::prompt_template::{
    format_history, format_roster, PromptTemplate, AGENTS_VARIABLE, DEFAULT_SELECTION_TEMPLATE,
    HISTORY_VARIABLE,
};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Why a participant was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionReason {
    /// Configured initial participant on the first turn.
    Initial,
    /// A deterministic rule.
    Rule,
    /// The model named a registered participant.
    Model,
    /// The model answer did not match anyone; the configured default was used.
    Fallback,
}

/// Result of one selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub agent_name: String,
    pub reason: SelectionReason,
}

/// Why a selection could not produce a registered participant.
#[derive(Debug, Clone)]
pub enum SelectionError {
    /// The strategy named someone who is not part of the chat and no fallback applies.
    UnknownParticipant(String),
    /// The text generation service behind a model-driven strategy failed.
    External(String),
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::UnknownParticipant(name) => {
                write!(f, "Selected participant is not registered: {:?}", name)
            }
            SelectionError::External(msg) => write!(f, "Selection model call failed: {}", msg),
        }
    }
}

impl Error for SelectionError {}

/// Deterministic selection rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionRule {
    /// Registration order: the participant after the most recent agent author, wrapping
    /// around. Starts at the first participant when no agent has spoken.
    RoundRobin,
    /// "After A comes B" table. Authors without an entry fall back to round-robin order.
    Successors(HashMap<String, String>),
}

/// Model-driven selection settings.
#[derive(Clone)]
pub struct ModelSelection {
    client: Arc<dyn ClientWrapper>,
    template: PromptTemplate,
    fallback_agent: Option<String>,
    evaluate_name_only: bool,
    include_descriptions: bool,
    options: GenerationOptions,
}

impl ModelSelection {
    /// Selection driven by `client` with the default prompt.
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            template: PromptTemplate::new(DEFAULT_SELECTION_TEMPLATE),
            fallback_agent: None,
            evaluate_name_only: false,
            include_descriptions: true,
            options: GenerationOptions::deterministic(),
        }
    }

    /// Replace the prompt. `{{$history}}` and `{{$agents}}` are filled in per turn.
    pub fn with_template(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.template = template.into();
        self
    }

    /// Participant used when the model answer does not name anyone registered.
    pub fn with_fallback_agent(mut self, name: impl Into<String>) -> Self {
        self.fallback_agent = Some(name.into());
        self
    }

    /// Render `{{$history}}` with authors only, leaving message content out.
    pub fn evaluate_name_only(mut self, names_only: bool) -> Self {
        self.evaluate_name_only = names_only;
        self
    }

    /// Include participant descriptions in `{{$agents}}`.
    pub fn with_descriptions(mut self, include: bool) -> Self {
        self.include_descriptions = include;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fallback_agent(&self) -> Option<&str> {
        self.fallback_agent.as_deref()
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Render the prompt this strategy would send for the given roster and view.
    pub fn render_prompt(
        &self,
        participants: &[Arc<dyn Participant>],
        view: &[ChatMessage],
    ) -> String {
        let mut variables = HashMap::new();
        variables.insert(
            HISTORY_VARIABLE,
            format_history(view, self.evaluate_name_only),
        );
        variables.insert(
            AGENTS_VARIABLE,
            format_roster(
                participants.iter().map(|p| (p.name(), p.description())),
                self.include_descriptions,
            ),
        );
        self.template.render(&variables)
    }
}

impl fmt::Debug for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSelection")
            .field("model", &self.client.model_name())
            .field("fallback_agent", &self.fallback_agent)
            .field("evaluate_name_only", &self.evaluate_name_only)
            .field("include_descriptions", &self.include_descriptions)
            .finish()
    }
}

/// How a strategy decides after the first turn.
#[derive(Clone, Debug)]
pub enum SelectionKind {
    Rule(SelectionRule),
    Model(ModelSelection),
}

/// Decides which participant acts next.
#[derive(Clone, Debug)]
pub struct SelectionStrategy {
    initial_agent: Option<String>,
    history_reducer: Option<HistoryReducer>,
    kind: SelectionKind,
}

impl SelectionStrategy {
    pub fn round_robin() -> Self {
        Self::from_kind(SelectionKind::Rule(SelectionRule::RoundRobin))
    }

    /// Rule-based selection from `(after, next)` pairs.
    pub fn successors<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let table = pairs
            .into_iter()
            .map(|(after, next)| (after.into(), next.into()))
            .collect();
        Self::from_kind(SelectionKind::Rule(SelectionRule::Successors(table)))
    }

    pub fn model(selection: ModelSelection) -> Self {
        Self::from_kind(SelectionKind::Model(selection))
    }

    fn from_kind(kind: SelectionKind) -> Self {
        Self {
            initial_agent: None,
            history_reducer: None,
            kind,
        }
    }

    /// Participant that always takes the first turn of a run.
    pub fn with_initial_agent(mut self, name: impl Into<String>) -> Self {
        self.initial_agent = Some(name.into());
        self
    }

    /// Reducer applied to the transcript before this strategy sees it.
    pub fn with_history_reducer(mut self, reducer: HistoryReducer) -> Self {
        self.history_reducer = Some(reducer);
        self
    }

    pub fn initial_agent(&self) -> Option<&str> {
        self.initial_agent.as_deref()
    }

    pub fn history_reducer(&self) -> Option<&HistoryReducer> {
        self.history_reducer.as_ref()
    }

    pub fn kind(&self) -> &SelectionKind {
        &self.kind
    }

    /// Configuration checks against the registered participant names.
    pub fn validate(&self, names: &[&str]) -> Result<(), String> {
        if let Some(initial) = &self.initial_agent {
            if !names.contains(&initial.as_str()) {
                return Err(format!("initial agent {:?} is not a participant", initial));
            }
        }
        if let SelectionKind::Model(model) = &self.kind {
            if !model.template.uses(HISTORY_VARIABLE) {
                log::warn!(
                    "agentchat::selection::SelectionStrategy::validate(...): selection prompt has no {{{{${}}}}} placeholder",
                    HISTORY_VARIABLE
                );
            }
            if let Some(fallback) = &model.fallback_agent {
                if !names.contains(&fallback.as_str()) {
                    return Err(format!("fallback agent {:?} is not a participant", fallback));
                }
            }
        }
        if let Some(reducer) = &self.history_reducer {
            reducer.validate()?;
        }
        Ok(())
    }

    /// Name the participant for `turn` (1-based) given the strategy view of the transcript.
    pub async fn select(
        &self,
        participants: &[Arc<dyn Participant>],
        view: &[ChatMessage],
        turn: usize,
    ) -> Result<SelectionOutcome, SelectionError> {
        if turn == 1 {
            if let Some(initial) = &self.initial_agent {
                return ensure_registered(participants, initial, SelectionReason::Initial);
            }
        }

        match &self.kind {
            SelectionKind::Rule(rule) => select_by_rule(rule, participants, view),
            SelectionKind::Model(model) => select_by_model(model, participants, view).await,
        }
    }
}

fn ensure_registered(
    participants: &[Arc<dyn Participant>],
    name: &str,
    reason: SelectionReason,
) -> Result<SelectionOutcome, SelectionError> {
    participants
        .iter()
        .find(|p| p.name() == name)
        .map(|p| SelectionOutcome {
            agent_name: p.name().to_string(),
            reason,
        })
        .ok_or_else(|| SelectionError::UnknownParticipant(name.to_string()))
}

/// Most recent author in `view` that is a registered participant.
fn last_agent_index(participants: &[Arc<dyn Participant>], view: &[ChatMessage]) -> Option<usize> {
    view.iter()
        .rev()
        .filter(|m| !m.is_from_user())
        .find_map(|m| participants.iter().position(|p| p.name() == m.author))
}

fn select_by_rule(
    rule: &SelectionRule,
    participants: &[Arc<dyn Participant>],
    view: &[ChatMessage],
) -> Result<SelectionOutcome, SelectionError> {
    if participants.is_empty() {
        return Err(SelectionError::UnknownParticipant(String::new()));
    }
    let last = last_agent_index(participants, view);

    if let SelectionRule::Successors(table) = rule {
        if let Some(next) = last.and_then(|i| table.get(participants[i].name())) {
            return ensure_registered(participants, next, SelectionReason::Rule);
        }
    }

    let next = match last {
        Some(i) => (i + 1) % participants.len(),
        None => 0,
    };
    Ok(SelectionOutcome {
        agent_name: participants[next].name().to_string(),
        reason: SelectionReason::Rule,
    })
}

async fn select_by_model(
    model: &ModelSelection,
    participants: &[Arc<dyn Participant>],
    view: &[ChatMessage],
) -> Result<SelectionOutcome, SelectionError> {
    let prompt = model.render_prompt(participants, view);
    let reply = model
        .client
        .send_message(&[Message::new(Role::User, prompt)], Some(&model.options))
        .await
        .map_err(|e| SelectionError::External(e.to_string()))?;

    let names: Vec<&str> = participants.iter().map(|p| p.name()).collect();
    if let Some(name) = parse_agent_name(&reply.content, &names) {
        log::debug!(
            "agentchat::selection::select_by_model(...): model selected {}",
            name
        );
        return Ok(SelectionOutcome {
            agent_name: name.to_string(),
            reason: SelectionReason::Model,
        });
    }

    match &model.fallback_agent {
        Some(fallback) => {
            log::warn!(
                "agentchat::selection::select_by_model(...): unrecognised answer {:?}, falling back to {}",
                reply.content,
                fallback
            );
            ensure_registered(participants, fallback, SelectionReason::Fallback)
        }
        None => Err(SelectionError::UnknownParticipant(
            reply.content.trim().to_string(),
        )),
    }
}

/// Match the first non-empty line of a model answer against `names`, ignoring case,
/// surrounding quotes, markdown emphasis and trailing punctuation.
pub fn parse_agent_name<'a>(raw: &str, names: &[&'a str]) -> Option<&'a str> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let candidate = line
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .trim();
    names
        .iter()
        .copied()
        .find(|name| name.eq_ignore_ascii_case(candidate))
}

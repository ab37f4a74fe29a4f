//! Multi-agent group chat orchestration.
//!
//! A [`GroupChat`] drives a strictly sequential turn loop over a fixed set of
//! [`Participant`]s:
//!
//! ```text
//! append initial user message
//! loop until terminated, capped or cancelled:
//!     view   = reducer(transcript)             (selection strategy view)
//!     name   = selection.select(view)          (must be a registered participant)
//!     reply  = participant.produce_reply(transcript)
//!     append reply; turn_count += 1
//!     view   = reducer(transcript)             (termination strategy view)
//!     stop?  = termination.should_terminate(view, name)  (authorized authors only)
//! ```
//!
//! The transcript is owned by a single [`GroupChat::run`] call, so one `GroupChat` can
//! serve several concurrent runs. Participants always see the full transcript; strategies
//! see the reduced view.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentchat::agent::Agent;
//! use agentchat::clients::openai::OpenAIClient;
//! use agentchat::group_chat::GroupChat;
//! use agentchat::history::HistoryReducer;
//! use agentchat::selection::SelectionStrategy;
//! use agentchat::termination::TerminationStrategy;
//! use agentchat::ProviderConfig;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = Arc::new(OpenAIClient::new(&ProviderConfig::from_env()));
//! let chat = GroupChat::builder()
//!     .add_agent(Agent::new("PMAgent", client.clone()).with_instructions("Write the plan."))
//!     .add_agent(Agent::new("DesignAgent", client.clone()).with_instructions("Design it."))
//!     .add_agent(Agent::new("DeveloperAgent", client.clone()).with_instructions("Build it."))
//!     .with_selection(SelectionStrategy::round_robin().with_initial_agent("PMAgent"))
//!     .with_termination(
//!         TerminationStrategy::content_match("approve")
//!             .with_authorized_agents(["PMAgent"])
//!             .with_maximum_iterations(10),
//!     )
//!     .with_history_reducer(HistoryReducer::tail(1))
//!     .build()?;
//!
//! let result = chat
//!     .run("We need to add a Dark Mode feature to our mobile app", None)
//!     .await?;
//! println!("completed={} after {} turns", result.completed, result.turn_count);
//! # Ok(())
//! # }
//! ```

use crate::agentchat::agent::{Agent, Participant};
use crate::agentchat::client_wrapper::Role;
use crate::agentchat::config::AgentChatConfig;
use crate::agentchat::event::{ChatEvent, EventHandler};
use crate::agentchat::history::{strategy_view, ChatMessage, HistoryReducer, USER_AUTHOR};
use crate::agentchat::selection::{SelectionError, SelectionStrategy};
use crate::agentchat::termination::{TerminationDecision, TerminationStrategy};
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The termination strategy fired.
    Terminated,
    /// The turn cap was reached without a termination signal.
    IterationCap,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Outcome of a run that did not abort.
#[derive(Clone, Debug)]
pub struct RunResult {
    /// Full transcript, starting with the initial user message.
    pub history: Vec<ChatMessage>,
    /// True only when the termination strategy fired.
    pub completed: bool,
    /// Participant invocations whose reply was appended.
    pub turn_count: usize,
    pub stop_reason: StopReason,
}

/// Which external call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallStage {
    Selection,
    Participant,
    Termination,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStage::Selection => write!(f, "selection"),
            CallStage::Participant => write!(f, "participant"),
            CallStage::Termination => write!(f, "termination"),
        }
    }
}

/// Errors raised while configuring or running a group chat.
#[derive(Debug, Clone)]
pub enum GroupChatError {
    /// Invalid setup: empty or duplicate participants, missing or zero turn cap, strategies
    /// naming unknown participants, empty initial message. Never raised mid-run.
    Configuration(String),
    /// The selection strategy named someone who is not a participant.
    Selection { turn: usize, name: String },
    /// A model, tool or participant call failed. Not retried.
    ExternalCall {
        turn: usize,
        stage: CallStage,
        message: String,
    },
}

impl fmt::Display for GroupChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupChatError::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
            GroupChatError::Selection { turn, name } => write!(
                f,
                "Turn {}: selection returned unknown participant {:?}",
                turn, name
            ),
            GroupChatError::ExternalCall {
                turn,
                stage,
                message,
            } => write!(f, "Turn {}: {} call failed: {}", turn, stage, message),
        }
    }
}

impl Error for GroupChatError {}

/// A fatal failure together with the transcript accumulated up to that point.
#[derive(Debug, Clone)]
pub struct RunError {
    pub error: GroupChatError,
    pub history: Vec<ChatMessage>,
    pub turn_count: usize,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} turns)", self.error, self.turn_count)
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Builder for [`GroupChat`]. All checks happen in [`build`](GroupChatBuilder::build).
#[derive(Default)]
pub struct GroupChatBuilder {
    participants: Vec<Arc<dyn Participant>>,
    selection: Option<SelectionStrategy>,
    termination: Option<TerminationStrategy>,
    history_reducer: Option<HistoryReducer>,
    maximum_iterations: Option<usize>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GroupChatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant. Registration order is the round-robin order.
    pub fn add_participant(mut self, participant: Arc<dyn Participant>) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn add_agent(self, agent: Agent) -> Self {
        self.add_participant(Arc::new(agent))
    }

    /// Defaults to round-robin when not set.
    pub fn with_selection(mut self, selection: SelectionStrategy) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Without a termination strategy a run always ends at the turn cap.
    pub fn with_termination(mut self, termination: TerminationStrategy) -> Self {
        self.termination = Some(termination);
        self
    }

    /// Reducer for strategies that do not carry their own.
    pub fn with_history_reducer(mut self, reducer: HistoryReducer) -> Self {
        self.history_reducer = Some(reducer);
        self
    }

    /// Turn cap used when the termination strategy does not set one.
    pub fn with_maximum_iterations(mut self, maximum_iterations: usize) -> Self {
        self.maximum_iterations = Some(maximum_iterations);
        self
    }

    /// Fill unset values from `config`: the turn cap and the strategy history window.
    pub fn with_config(mut self, config: &AgentChatConfig) -> Self {
        if self.maximum_iterations.is_none() {
            self.maximum_iterations = Some(config.maximum_iterations);
        }
        if self.history_reducer.is_none() {
            self.history_reducer = config.strategy_history_window.map(HistoryReducer::tail);
        }
        self
    }

    /// Observer for chat events; also handed to participants on every invocation.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<GroupChat, GroupChatError> {
        if self.participants.is_empty() {
            return Err(GroupChatError::Configuration(
                "a group chat needs at least one participant".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for participant in &self.participants {
            let name = participant.name();
            if name.trim().is_empty() {
                return Err(GroupChatError::Configuration(
                    "participant names must not be empty".to_string(),
                ));
            }
            if name.eq_ignore_ascii_case(USER_AUTHOR) {
                return Err(GroupChatError::Configuration(format!(
                    "participant name {:?} is reserved for the initial message",
                    name
                )));
            }
            // Model-driven selection matches names ignoring case.
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(GroupChatError::Configuration(format!(
                    "duplicate participant name {:?}",
                    name
                )));
            }
        }
        let names: Vec<&str> = self.participants.iter().map(|p| p.name()).collect();

        let selection = self.selection.unwrap_or_else(SelectionStrategy::round_robin);
        selection
            .validate(&names)
            .map_err(GroupChatError::Configuration)?;

        if let Some(termination) = &self.termination {
            termination
                .validate(&names)
                .map_err(GroupChatError::Configuration)?;
        }

        if let Some(reducer) = &self.history_reducer {
            reducer.validate().map_err(GroupChatError::Configuration)?;
        }

        let maximum_iterations = self
            .termination
            .as_ref()
            .and_then(TerminationStrategy::maximum_iterations)
            .or(self.maximum_iterations)
            .ok_or_else(|| {
                GroupChatError::Configuration(
                    "an explicit maximum iteration count is required".to_string(),
                )
            })?;
        if maximum_iterations == 0 {
            return Err(GroupChatError::Configuration(
                "maximum iterations must be positive".to_string(),
            ));
        }

        Ok(GroupChat {
            participants: self.participants,
            selection,
            termination: self.termination,
            history_reducer: self.history_reducer,
            maximum_iterations,
            event_handler: self.event_handler,
        })
    }
}

/// A validated group chat configuration. Each [`run`](GroupChat::run) owns its own transcript.
pub struct GroupChat {
    participants: Vec<Arc<dyn Participant>>,
    selection: SelectionStrategy,
    termination: Option<TerminationStrategy>,
    history_reducer: Option<HistoryReducer>,
    maximum_iterations: usize,
    event_handler: Option<Arc<dyn EventHandler>>,
}

/// Per-run state: the canonical transcript and the turn counter.
struct RunState {
    history: Vec<ChatMessage>,
    turn_count: usize,
}

impl RunState {
    fn append(&mut self, mut message: ChatMessage) {
        message.sequence = self.history.len();
        self.history.push(message);
    }

    fn finish(self, stop_reason: StopReason) -> RunResult {
        RunResult {
            history: self.history,
            completed: stop_reason == StopReason::Terminated,
            turn_count: self.turn_count,
            stop_reason,
        }
    }

    fn abort(self, error: GroupChatError) -> RunError {
        RunError {
            error,
            history: self.history,
            turn_count: self.turn_count,
        }
    }
}

impl GroupChat {
    pub fn builder() -> GroupChatBuilder {
        GroupChatBuilder::new()
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name()).collect()
    }

    pub fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }

    async fn emit(&self, event: ChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_chat_event(&event).await;
        }
    }

    fn participant(&self, name: &str) -> Option<&Arc<dyn Participant>> {
        self.participants.iter().find(|p| p.name() == name)
    }

    fn selection_reducer(&self) -> Option<&HistoryReducer> {
        self.selection
            .history_reducer()
            .or(self.history_reducer.as_ref())
    }

    fn termination_reducer<'a>(
        &'a self,
        strategy: &'a TerminationStrategy,
    ) -> Option<&'a HistoryReducer> {
        strategy.history_reducer().or(self.history_reducer.as_ref())
    }

    async fn cancelled(&self, state: RunState) -> RunResult {
        log::info!(
            "agentchat::group_chat::GroupChat::run(...): cancelled after {} turns",
            state.turn_count
        );
        self.emit(ChatEvent::RunCancelled {
            turn_count: state.turn_count,
        })
        .await;
        state.finish(StopReason::Cancelled)
    }

    async fn failed(&self, state: RunState, error: GroupChatError) -> RunError {
        log::error!("agentchat::group_chat::GroupChat::run(...): {}", error);
        self.emit(ChatEvent::RunFailed {
            turn_count: state.turn_count,
            error: error.to_string(),
        })
        .await;
        state.abort(error)
    }

    /// Run the chat from `initial_message` until termination, the turn cap, or cancellation.
    ///
    /// `cancel` is checked before every selection and every participant invocation; an
    /// invocation in flight when it fires is dropped and its reply never appended.
    pub async fn run(
        &self,
        initial_message: impl AsRef<str>,
        cancel: Option<CancellationToken>,
    ) -> Result<RunResult, RunError> {
        let initial_message = initial_message.as_ref();
        if initial_message.trim().is_empty() {
            return Err(RunError {
                error: GroupChatError::Configuration(
                    "the initial message must not be empty".to_string(),
                ),
                history: Vec::new(),
                turn_count: 0,
            });
        }

        let mut state = RunState {
            history: Vec::new(),
            turn_count: 0,
        };
        state.append(ChatMessage::user(initial_message));

        log::info!(
            "agentchat::group_chat::GroupChat::run(...): starting with {} participants, cap {}",
            self.participants.len(),
            self.maximum_iterations
        );
        self.emit(ChatEvent::RunStarted {
            participants: self
                .participant_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            maximum_iterations: self.maximum_iterations,
        })
        .await;

        let is_cancelled = || cancel.as_ref().is_some_and(CancellationToken::is_cancelled);

        while state.turn_count < self.maximum_iterations {
            let turn = state.turn_count + 1;

            if is_cancelled() {
                return Ok(self.cancelled(state).await);
            }

            // Selection
            self.emit(ChatEvent::SelectionStarted { turn }).await;
            let view = strategy_view(self.selection_reducer(), &state.history);
            let selected = self.selection.select(&self.participants, view, turn).await;
            let outcome = match selected {
                Ok(outcome) => outcome,
                Err(SelectionError::UnknownParticipant(name)) => {
                    return Err(self
                        .failed(state, GroupChatError::Selection { turn, name })
                        .await);
                }
                Err(SelectionError::External(message)) => {
                    return Err(self
                        .failed(
                            state,
                            GroupChatError::ExternalCall {
                                turn,
                                stage: CallStage::Selection,
                                message,
                            },
                        )
                        .await);
                }
            };
            let participant = match self.participant(&outcome.agent_name) {
                Some(p) => p.clone(),
                None => {
                    let name = outcome.agent_name;
                    return Err(self
                        .failed(state, GroupChatError::Selection { turn, name })
                        .await);
                }
            };
            let agent_name = participant.name().to_string();
            log::debug!(
                "agentchat::group_chat::GroupChat::run(...): turn {} -> {} ({:?})",
                turn,
                agent_name,
                outcome.reason
            );
            self.emit(ChatEvent::AgentSelected {
                turn,
                agent_name: agent_name.clone(),
                reason: outcome.reason,
            })
            .await;

            // Invocation
            if is_cancelled() {
                return Ok(self.cancelled(state).await);
            }
            self.emit(ChatEvent::AgentInvoking {
                turn,
                agent_name: agent_name.clone(),
            })
            .await;

            let invocation =
                participant.produce_reply(&state.history, self.event_handler.as_ref());
            let reply = match &cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        reply = invocation => Some(reply),
                    }
                }
                None => Some(invocation.await),
            };
            let reply = match reply {
                None => return Ok(self.cancelled(state).await),
                Some(Ok(reply)) => reply,
                Some(Err(e)) => {
                    let message = e.to_string();
                    self.emit(ChatEvent::AgentFailed {
                        turn,
                        agent_name: agent_name.clone(),
                        error: message.clone(),
                    })
                    .await;
                    return Err(self
                        .failed(
                            state,
                            GroupChatError::ExternalCall {
                                turn,
                                stage: CallStage::Participant,
                                message,
                            },
                        )
                        .await);
                }
            };

            let response_length = reply.content.len();
            state.append(ChatMessage::new(
                agent_name.clone(),
                Role::Assistant,
                &reply.content,
            ));
            state.turn_count += 1;
            self.emit(ChatEvent::AgentResponded {
                turn,
                agent_name: agent_name.clone(),
                response_length,
                tokens_used: reply.tokens_used,
            })
            .await;

            // Termination
            let decision = match &self.termination {
                Some(strategy) => {
                    let view = strategy_view(self.termination_reducer(strategy), &state.history);
                    let checked = strategy.should_terminate(view, &agent_name).await;
                    match checked {
                        Ok(decision) => decision,
                        Err(e) => {
                            return Err(self
                                .failed(
                                    state,
                                    GroupChatError::ExternalCall {
                                        turn,
                                        stage: CallStage::Termination,
                                        message: e.to_string(),
                                    },
                                )
                                .await);
                        }
                    }
                }
                None => TerminationDecision {
                    evaluated: false,
                    terminate: false,
                },
            };
            self.emit(ChatEvent::TerminationChecked {
                turn,
                agent_name,
                evaluated: decision.evaluated,
                terminate: decision.terminate,
            })
            .await;

            if decision.terminate {
                return Ok(self.completed(state, StopReason::Terminated).await);
            }
        }

        Ok(self.completed(state, StopReason::IterationCap).await)
    }

    async fn completed(&self, state: RunState, stop_reason: StopReason) -> RunResult {
        log::info!(
            "agentchat::group_chat::GroupChat::run(...): {:?} after {} turns",
            stop_reason,
            state.turn_count
        );
        self.emit(ChatEvent::RunCompleted {
            turn_count: state.turn_count,
            stop_reason,
        })
        .await;
        state.finish(stop_reason)
    }
}

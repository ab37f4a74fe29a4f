//! Canonical transcript types and history reduction.
//!
//! A [`GroupChat`](crate::group_chat::GroupChat) owns a `Vec<ChatMessage>` for the duration
//! of a run and only ever appends to it. Strategies look at the transcript through a
//! [`HistoryReducer`], which hands back a borrowed view instead of rewriting anything.

use crate::agentchat::client_wrapper::Role;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Author recorded on messages supplied by the caller of a run.
pub const USER_AUTHOR: &str = "user";

/// One entry of the canonical transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    /// Participant name, or [`USER_AUTHOR`].
    pub author: String,
    pub role: Role,
    pub content: Arc<str>,
    /// Zero-based position in the transcript, assigned on append.
    pub sequence: usize,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Message authored by the caller of a run.
    pub fn user(content: impl AsRef<str>) -> Self {
        Self::new(USER_AUTHOR, Role::User, content)
    }

    /// Reply produced by the named participant.
    pub fn assistant(author: impl Into<String>, content: impl AsRef<str>) -> Self {
        Self::new(author, Role::Assistant, content)
    }

    pub fn new(author: impl Into<String>, role: Role, content: impl AsRef<str>) -> Self {
        Self {
            author: author.into(),
            role,
            content: Arc::from(content.as_ref()),
            sequence: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.author == USER_AUTHOR
    }
}

/// Produces a read-only view of the transcript for selection and termination.
///
/// Participants always receive the full transcript; only strategy decisions go through
/// a reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryReducer {
    /// Keep the last `n` messages, in order. `n` must be positive.
    TailTruncation { n: usize },
}

impl HistoryReducer {
    pub fn tail(n: usize) -> Self {
        HistoryReducer::TailTruncation { n }
    }

    /// Borrow the part of `history` this reducer exposes.
    ///
    /// Applying the same reducer to its own output returns the same slice.
    pub fn reduce<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        match self {
            HistoryReducer::TailTruncation { n } => {
                let start = history.len().saturating_sub(*n);
                &history[start..]
            }
        }
    }

    /// Checked at configuration time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            HistoryReducer::TailTruncation { n: 0 } => {
                Err("tail truncation must keep at least one message".to_string())
            }
            HistoryReducer::TailTruncation { .. } => Ok(()),
        }
    }
}

/// Apply an optional reducer; `None` exposes the whole transcript.
pub fn strategy_view<'a>(
    reducer: Option<&HistoryReducer>,
    history: &'a [ChatMessage],
) -> &'a [ChatMessage] {
    match reducer {
        Some(reducer) => reducer.reduce(history),
        None => history,
    }
}

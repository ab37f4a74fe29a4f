//! Minimal placeholder rendering for strategy prompts.
//!
//! Model-driven selection and termination ask a text generation service a question
//! about the transcript. Their prompts are plain strings with `{{$name}}` placeholders;
//! the two that the group chat fills in are:
//!
//! - `{{$history}}`: the (possibly reduced) transcript, one `author: content` line per message
//! - `{{$agents}}`: the participant roster, one name (optionally `name: description`) per line
//!
//! Whitespace inside the braces is tolerated (`{{ $history }}`). Unknown variables render
//! as an empty string.

use crate::agentchat::history::ChatMessage;
use std::collections::HashMap;

pub const HISTORY_VARIABLE: &str = "history";
pub const AGENTS_VARIABLE: &str = "agents";

/// Selection prompt used when a model-driven strategy does not bring its own.
pub const DEFAULT_SELECTION_TEMPLATE: &str = "\
Determine which participant takes the next turn in a conversation based on the most recent participant.
State only the name of the participant to take the next turn.
No participant should take more than one turn in a row.

Choose only from these participants:
{{$agents}}

History:
{{$history}}
";

/// Termination prompt used when a model-driven strategy does not bring its own.
pub const DEFAULT_TERMINATION_TEMPLATE: &str = "\
Determine if the conversation has reached its goal. If so, respond with a single word: yes
Otherwise, respond with any other text.

History:
{{$history}}
";

/// A prompt with `{{$variable}}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Whether the template references `{{$name}}`.
    pub fn uses(&self, name: &str) -> bool {
        self.placeholders().iter().any(|p| p == name)
    }

    /// Variable names referenced by the template, in order of appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.template.as_str();
        while let Some((_, name, after)) = next_placeholder(rest) {
            names.push(name.to_string());
            rest = after;
        }
        names
    }

    /// Substitute every placeholder with its value from `variables`.
    pub fn render(&self, variables: &HashMap<&str, String>) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some((before, name, after)) = next_placeholder(rest) {
            out.push_str(before);
            match variables.get(name) {
                Some(value) => out.push_str(value),
                None => log::debug!(
                    "agentchat::prompt_template::PromptTemplate::render(...): no value for {{{{${}}}}}",
                    name
                ),
            }
            rest = after;
        }
        out.push_str(rest);
        out
    }
}

impl From<&str> for PromptTemplate {
    fn from(value: &str) -> Self {
        PromptTemplate::new(value)
    }
}

impl From<String> for PromptTemplate {
    fn from(value: String) -> Self {
        PromptTemplate::new(value)
    }
}

/// Split `text` around its first well-formed placeholder: (text before, name, text after).
fn next_placeholder(text: &str) -> Option<(&str, &str, &str)> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("{{") {
        let open = search_from + rel;
        let inner_start = open + 2;
        let close = inner_start + text[inner_start..].find("}}")?;
        let inner = text[inner_start..close].trim();
        if let Some(name) = inner.strip_prefix('$') {
            if !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Some((&text[..open], name, &text[close + 2..]));
            }
        }
        search_from = inner_start;
    }
    None
}

/// Render transcript lines for `{{$history}}`.
///
/// With `names_only` each line carries just the author, which is all a selection prompt
/// needs to apply "after A comes B" style rules.
pub fn format_history(history: &[ChatMessage], names_only: bool) -> String {
    history
        .iter()
        .map(|m| {
            if names_only {
                m.author.clone()
            } else {
                format!("{}: {}", m.author, m.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render roster lines for `{{$agents}}` from `(name, description)` pairs.
pub fn format_roster<'a, I>(participants: I, include_descriptions: bool) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    participants
        .into_iter()
        .map(|(name, description)| {
            if include_descriptions && !description.is_empty() {
                format!("- {}: {}", name, description)
            } else {
                format!("- {}", name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

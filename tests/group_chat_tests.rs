use agentchat::agent::{AgentResponse, Participant};
use agentchat::event::{ChatEvent, EventHandler};
use agentchat::group_chat::{CallStage, GroupChat, GroupChatError, StopReason};
use agentchat::history::{ChatMessage, USER_AUTHOR};
use agentchat::selection::{SelectionReason, SelectionStrategy};
use agentchat::termination::TerminationStrategy;
use agentchat::AgentChatConfig;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Replies from a script, then repeats `fallback` forever.
struct ScriptedParticipant {
    name: String,
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    invocations: Mutex<usize>,
}

impl ScriptedParticipant {
    fn new(name: &str, fallback: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            invocations: Mutex::new(0),
        }
    }

    fn with_script(self, replies: &[&str]) -> Self {
        *self.replies.lock().unwrap() = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    fn invocations(&self) -> usize {
        *self.invocations.lock().unwrap()
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        _history: &[ChatMessage],
        _events: Option<&Arc<dyn EventHandler>>,
    ) -> Result<AgentResponse, Box<dyn Error + Send + Sync>> {
        *self.invocations.lock().unwrap() += 1;
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(AgentResponse::text(reply))
    }
}

struct FailingParticipant {
    name: String,
}

#[async_trait]
impl Participant for FailingParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        _history: &[ChatMessage],
        _events: Option<&Arc<dyn EventHandler>>,
    ) -> Result<AgentResponse, Box<dyn Error + Send + Sync>> {
        Err("model endpoint returned 503".into())
    }
}

/// Cancels the run's token while producing its reply; optionally never finishes.
struct CancellingParticipant {
    name: String,
    token: CancellationToken,
    hang: bool,
}

#[async_trait]
impl Participant for CancellingParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_reply(
        &self,
        _history: &[ChatMessage],
        _events: Option<&Arc<dyn EventHandler>>,
    ) -> Result<AgentResponse, Box<dyn Error + Send + Sync>> {
        self.token.cancel();
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(AgentResponse::text("stopping here"))
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<ChatEvent>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_chat_event(&self, event: &ChatEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn scripted(name: &str, fallback: &str) -> Arc<dyn Participant> {
    Arc::new(ScriptedParticipant::new(name, fallback))
}

fn authors(history: &[ChatMessage]) -> Vec<&str> {
    history.iter().map(|m| m.author.as_str()).collect()
}

#[tokio::test]
async fn test_cap_reached_when_closer_never_says_done() {
    let chat = GroupChat::builder()
        .add_participant(scripted("Drafter", "done drafting"))
        .add_participant(scripted("Reviewer", "done"))
        .add_participant(scripted("Closer", "still thinking"))
        .with_termination(
            TerminationStrategy::content_match("done")
                .with_authorized_agents(["Closer"])
                .with_maximum_iterations(5),
        )
        .build()
        .unwrap();

    let result = chat.run("Plan the offsite", None).await.unwrap();

    assert!(!result.completed);
    assert_eq!(result.turn_count, 5);
    assert_eq!(result.stop_reason, StopReason::IterationCap);
    assert_eq!(result.history.len(), result.turn_count + 1);
}

#[tokio::test]
async fn test_round_robin_five_turns() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(scripted("B", "b"))
        .add_participant(scripted("C", "c"))
        .with_selection(SelectionStrategy::round_robin())
        .with_maximum_iterations(5)
        .build()
        .unwrap();

    let result = chat.run("go", None).await.unwrap();

    assert_eq!(
        authors(&result.history),
        vec![USER_AUTHOR, "A", "B", "C", "A", "B"]
    );
}

#[tokio::test]
async fn test_terminates_on_authorized_approval() {
    let pm = Arc::new(
        ScriptedParticipant::new("PMAgent", "Plan APPROVED by PM").with_script(&["Draft plan v1"]),
    );
    let chat = GroupChat::builder()
        .add_participant(pm.clone())
        .add_participant(scripted("DesignAgent", "I approve of the palette"))
        .add_participant(scripted("DeveloperAgent", "Estimate: two sprints"))
        .with_selection(
            SelectionStrategy::successors([
                ("PMAgent", "DesignAgent"),
                ("DesignAgent", "DeveloperAgent"),
                ("DeveloperAgent", "PMAgent"),
            ])
            .with_initial_agent("PMAgent"),
        )
        .with_termination(
            TerminationStrategy::content_match("approve")
                .with_authorized_agents(["PMAgent"])
                .with_maximum_iterations(10),
        )
        .build()
        .unwrap();

    let result = chat
        .run("We need to add a Dark Mode feature to our mobile app", None)
        .await
        .unwrap();

    assert!(result.completed);
    assert_eq!(result.stop_reason, StopReason::Terminated);
    assert_eq!(result.turn_count, 4);
    assert_eq!(
        authors(&result.history),
        vec![USER_AUTHOR, "PMAgent", "DesignAgent", "DeveloperAgent", "PMAgent"]
    );
    assert_eq!(pm.invocations(), 2);
}

#[tokio::test]
async fn test_transcript_sequence_and_roles() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(scripted("B", "b"))
        .with_maximum_iterations(3)
        .build()
        .unwrap();

    let result = chat.run("hello", None).await.unwrap();

    for (i, message) in result.history.iter().enumerate() {
        assert_eq!(message.sequence, i);
    }
    assert!(result.history[0].is_from_user());
    assert_eq!(&*result.history[0].content, "hello");
    assert_eq!(&*result.history[1].content, "a");
}

#[tokio::test]
async fn test_cancelled_before_first_selection() {
    let participant = Arc::new(ScriptedParticipant::new("A", "a"));
    let chat = GroupChat::builder()
        .add_participant(participant.clone())
        .with_maximum_iterations(3)
        .build()
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = chat.run("hello", Some(token)).await.unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert!(!result.completed);
    assert_eq!(result.turn_count, 0);
    assert_eq!(result.history.len(), 1);
    assert_eq!(participant.invocations(), 0);
}

#[tokio::test]
async fn test_cancellation_checked_before_next_turn() {
    let token = CancellationToken::new();
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(Arc::new(CancellingParticipant {
            name: "B".to_string(),
            token: token.clone(),
            hang: false,
        }))
        .with_maximum_iterations(10)
        .build()
        .unwrap();

    let result = chat.run("hello", Some(token)).await.unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.turn_count, 2);
    assert_eq!(authors(&result.history), vec![USER_AUTHOR, "A", "B"]);
}

#[tokio::test]
async fn test_cancellation_drops_in_flight_reply() {
    let token = CancellationToken::new();
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(Arc::new(CancellingParticipant {
            name: "B".to_string(),
            token: token.clone(),
            hang: true,
        }))
        .with_maximum_iterations(10)
        .build()
        .unwrap();

    let result = chat.run("hello", Some(token)).await.unwrap();

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.turn_count, 1);
    assert_eq!(result.history.len(), 2);
}

#[tokio::test]
async fn test_participant_failure_keeps_partial_history() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(Arc::new(FailingParticipant {
            name: "B".to_string(),
        }))
        .with_maximum_iterations(5)
        .build()
        .unwrap();

    let err = chat.run("hello", None).await.unwrap_err();

    match &err.error {
        GroupChatError::ExternalCall {
            turn,
            stage,
            message,
        } => {
            assert_eq!(*turn, 2);
            assert_eq!(*stage, CallStage::Participant);
            assert!(message.contains("503"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.turn_count, 1);
    assert_eq!(err.history.len(), err.turn_count + 1);
}

#[tokio::test]
async fn test_successor_to_unknown_participant_is_selection_error() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(scripted("B", "b"))
        .with_selection(SelectionStrategy::successors([("A", "Ghost")]))
        .with_maximum_iterations(5)
        .build()
        .unwrap();

    let err = chat.run("hello", None).await.unwrap_err();

    match &err.error {
        GroupChatError::Selection { turn, name } => {
            assert_eq!(*turn, 2);
            assert_eq!(name, "Ghost");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.history.len(), 2);
    assert_eq!(err.turn_count, 1);
}

#[tokio::test]
async fn test_configuration_errors() {
    let no_participants = GroupChat::builder().with_maximum_iterations(3).build();
    assert!(matches!(no_participants, Err(GroupChatError::Configuration(_))));

    let duplicate = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(scripted("A", "again"))
        .with_maximum_iterations(3)
        .build();
    assert!(matches!(duplicate, Err(GroupChatError::Configuration(_))));

    let case_duplicate = GroupChat::builder()
        .add_participant(scripted("PMAgent", "a"))
        .add_participant(scripted("pmagent", "b"))
        .with_maximum_iterations(3)
        .build();
    assert!(matches!(case_duplicate, Err(GroupChatError::Configuration(_))));

    let reserved = GroupChat::builder()
        .add_participant(scripted(USER_AUTHOR, "hi"))
        .add_participant(scripted("B", "b"))
        .with_maximum_iterations(4)
        .build();
    assert!(matches!(reserved, Err(GroupChatError::Configuration(_))));

    let reserved_other_case = GroupChat::builder()
        .add_participant(scripted("User", "hi"))
        .with_maximum_iterations(4)
        .build();
    assert!(matches!(reserved_other_case, Err(GroupChatError::Configuration(_))));

    let no_cap = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .build();
    assert!(matches!(no_cap, Err(GroupChatError::Configuration(_))));

    let zero_cap = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .with_maximum_iterations(0)
        .build();
    assert!(matches!(zero_cap, Err(GroupChatError::Configuration(_))));

    let zero_strategy_cap = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .with_termination(TerminationStrategy::content_match("done").with_maximum_iterations(0))
        .with_maximum_iterations(3)
        .build();
    assert!(matches!(zero_strategy_cap, Err(GroupChatError::Configuration(_))));

    let unknown_initial = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .with_selection(SelectionStrategy::round_robin().with_initial_agent("Z"))
        .with_maximum_iterations(3)
        .build();
    assert!(matches!(unknown_initial, Err(GroupChatError::Configuration(_))));
}

#[tokio::test]
async fn test_empty_initial_message_is_rejected() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .with_maximum_iterations(3)
        .build()
        .unwrap();

    let err = chat.run("   ", None).await.unwrap_err();
    assert!(matches!(err.error, GroupChatError::Configuration(_)));
    assert!(err.history.is_empty());
    assert_eq!(err.turn_count, 0);
}

#[tokio::test]
async fn test_config_supplies_default_cap() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(scripted("B", "b"))
        .with_config(&AgentChatConfig::default())
        .build()
        .unwrap();
    assert_eq!(chat.maximum_iterations(), 10);

    let result = chat.run("hello", None).await.unwrap();
    assert_eq!(result.turn_count, 10);
}

#[tokio::test]
async fn test_strategy_cap_overrides_chat_cap() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .with_termination(TerminationStrategy::content_match("never").with_maximum_iterations(2))
        .with_maximum_iterations(8)
        .build()
        .unwrap();
    assert_eq!(chat.maximum_iterations(), 2);
}

#[tokio::test]
async fn test_events_follow_the_turn_loop() {
    let handler = Arc::new(RecordingHandler::default());
    let chat = GroupChat::builder()
        .add_participant(scripted("Writer", "draft"))
        .add_participant(scripted("Editor", "final, done"))
        .with_selection(SelectionStrategy::round_robin().with_initial_agent("Writer"))
        .with_termination(
            TerminationStrategy::content_match("done")
                .with_authorized_agents(["Editor"])
                .with_maximum_iterations(4),
        )
        .with_event_handler(handler.clone())
        .build()
        .unwrap();

    let result = chat.run("write it", None).await.unwrap();
    assert!(result.completed);

    let events = handler.events.lock().unwrap();
    assert!(matches!(events.first(), Some(ChatEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ChatEvent::RunCompleted {
            turn_count: 2,
            stop_reason: StopReason::Terminated
        })
    ));

    let selections: Vec<(String, SelectionReason)> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::AgentSelected {
                agent_name, reason, ..
            } => Some((agent_name.clone(), *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        selections,
        vec![
            ("Writer".to_string(), SelectionReason::Initial),
            ("Editor".to_string(), SelectionReason::Rule),
        ]
    );

    let checks: Vec<(bool, bool)> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::TerminationChecked {
                evaluated,
                terminate,
                ..
            } => Some((*evaluated, *terminate)),
            _ => None,
        })
        .collect();
    assert_eq!(checks, vec![(false, false), (true, true)]);
}

#[tokio::test]
async fn test_concurrent_runs_have_independent_transcripts() {
    let chat = GroupChat::builder()
        .add_participant(scripted("A", "a"))
        .add_participant(scripted("B", "b"))
        .with_maximum_iterations(3)
        .build()
        .unwrap();

    let (first, second) = tokio::join!(chat.run("first", None), chat.run("second", None));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(&*first.history[0].content, "first");
    assert_eq!(&*second.history[0].content, "second");
    assert_eq!(first.history.len(), 4);
    assert_eq!(second.history.len(), 4);
}

use agentchat::agent::{Agent, Participant};
use agentchat::client_wrapper::{ClientWrapper, GenerationOptions, Message, Role, TokenUsage};
use agentchat::event::{AgentEvent, EventHandler};
use agentchat::history::ChatMessage;
use agentchat::tool_protocol::{ToolMetadata, ToolRegistry, ToolResult};
use agentchat::tool_protocols::CustomToolProtocol;
use agentchat::tools::DateTimeTool;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Replays scripted answers, records every request and reports fixed usage per call.
struct ScriptedClient {
    answers: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
    usage: Mutex<Option<TokenUsage>>,
}

impl ScriptedClient {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            usage: Mutex::new(None),
        }
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _options: Option<&GenerationOptions>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.requests.lock().unwrap().push(messages.to_vec());
        *self.usage.lock().unwrap() = Some(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        });
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or("script exhausted")?;
        Ok(Message::new(Role::Assistant, answer))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<AgentEvent>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_agent_event(&self, event: &AgentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn shared_transcript() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("We need a Dark Mode feature"),
        ChatMessage::assistant("PMAgent", "Plan: three milestones"),
        ChatMessage::assistant("DesignAgent", "Use a slate palette"),
    ]
}

async fn echo_registry() -> ToolRegistry {
    let protocol = Arc::new(CustomToolProtocol::named("text"));
    protocol
        .register_tool(
            ToolMetadata::new("shout", "Upper-cases its input"),
            Arc::new(|params| {
                let text = params["text"].as_str().unwrap_or_default().to_uppercase();
                Ok(ToolResult::success(serde_json::json!(text)))
            }),
        )
        .await;
    protocol
        .register_tool(
            ToolMetadata::new("broken", "Always fails"),
            Arc::new(|_| Ok(ToolResult::failure("disk on fire"))),
        )
        .await;
    let mut registry = ToolRegistry::new();
    registry.add_protocol(protocol).await.unwrap();
    registry
}

#[test]
fn test_messages_from_agent_point_of_view() {
    let client = Arc::new(ScriptedClient::new(&[]));
    let agent = Agent::new("PMAgent", client).with_instructions("You own the plan.");

    let messages = agent.build_messages(&shared_transcript());

    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(&*messages[0].content, "You own the plan.");
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(&*messages[1].content, "We need a Dark Mode feature");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(&*messages[2].content, "Plan: three milestones");
    assert_eq!(messages[3].role, Role::User);
    assert_eq!(&*messages[3].content, "[DesignAgent]: Use a slate palette");
}

#[test]
fn test_no_system_message_without_instructions_or_tools() {
    let client = Arc::new(ScriptedClient::new(&[]));
    let agent = Agent::new("DeveloperAgent", client);

    let messages = agent.build_messages(&shared_transcript());
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.role != Role::System));
}

#[tokio::test]
async fn test_plain_reply_reports_usage() {
    let client = Arc::new(ScriptedClient::new(&["Estimate: two sprints"]));
    let agent = Agent::new("DeveloperAgent", client.clone());

    let response = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();

    assert_eq!(response.content, "Estimate: two sprints");
    assert_eq!(response.tool_calls_made, 0);
    assert_eq!(response.tokens_used.unwrap().total_tokens, 15);
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn test_sequential_agents_on_shared_client_get_own_usage() {
    let client = Arc::new(ScriptedClient::new(&["Plan v1", "Palette: slate"]));
    let pm = Agent::new("PMAgent", client.clone());
    let design = Agent::new("DesignAgent", client.clone());

    let first = pm.produce_reply(&shared_transcript(), None).await.unwrap();
    let second = design
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();

    assert_eq!(first.tokens_used.unwrap().total_tokens, 15);
    assert_eq!(second.tokens_used.unwrap().total_tokens, 15);
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn test_tool_loop_feeds_result_back() {
    let client = Arc::new(ScriptedClient::new(&[
        r#"{"tool_call": {"name": "shout", "parameters": {"text": "dark mode"}}}"#,
        "Final answer: DARK MODE",
    ]));
    let handler = Arc::new(RecordingHandler::default());
    let agent = Agent::new("DesignAgent", client.clone())
        .with_instructions("Design things.")
        .with_tools(echo_registry().await)
        .with_event_handler(handler.clone());

    let response = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();

    assert_eq!(response.content, "Final answer: DARK MODE");
    assert_eq!(response.tool_calls_made, 1);
    assert_eq!(response.tokens_used.unwrap().total_tokens, 30);

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let system = &requests[0][0];
    assert!(system.content.contains("You have access to the following tools:"));
    assert!(system.content.contains("shout"));
    let feedback = requests[1].last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert!(feedback.content.contains("Tool 'shout' executed successfully"));
    assert!(feedback.content.contains("DARK MODE"));

    let events = handler.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::ToolExecutionCompleted { tool_name, success: true, .. } if tool_name == "shout"
    )));
}

#[tokio::test]
async fn test_tool_failure_is_reported_to_model() {
    let client = Arc::new(ScriptedClient::new(&[
        r#"{"tool_call": {"name": "broken", "parameters": {}}}"#,
        "The tool failed, sorry.",
    ]));
    let agent = Agent::new("DesignAgent", client.clone()).with_tools(echo_registry().await);

    let response = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();

    assert_eq!(response.content, "The tool failed, sorry.");
    let feedback = client.requests()[1].last().unwrap().content.to_string();
    assert!(feedback.contains("Tool 'broken' failed. Error: disk on fire"));
}

#[tokio::test]
async fn test_max_tool_iterations_appends_warning() {
    let call = r#"{"tool_call": {"name": "shout", "parameters": {"text": "again"}}}"#;
    let client = Arc::new(ScriptedClient::new(&[call, call, call]));
    let handler = Arc::new(RecordingHandler::default());
    let agent = Agent::new("DesignAgent", client.clone())
        .with_tools(echo_registry().await)
        .with_max_tool_iterations(2)
        .with_event_handler(handler.clone());

    let response = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();

    assert_eq!(response.tool_calls_made, 2);
    assert!(response
        .content
        .ends_with("[Warning: Maximum tool iterations reached]"));
    assert_eq!(client.requests().len(), 3);
    assert!(handler.events.lock().unwrap().iter().any(|e| matches!(
        e,
        AgentEvent::ToolMaxIterationsReached { max_iterations: 2, .. }
    )));
}

#[tokio::test]
async fn test_tool_call_text_without_tools_is_plain_reply() {
    let text = r#"{"tool_call": {"name": "shout", "parameters": {}}}"#;
    let client = Arc::new(ScriptedClient::new(&[text]));
    let agent = Agent::new("PMAgent", client.clone());

    let response = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();
    assert_eq!(response.content, text);
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn test_allow_list_restricts_catalogue() {
    let mut registry = echo_registry().await;
    registry
        .add_protocol(Arc::new(DateTimeTool::with_clock(Arc::new(|| {
            Utc.with_ymd_and_hms(2025, 10, 14, 10, 0, 0).unwrap()
        }))))
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new(&[]));
    let scheduler = Agent::new("SchedulingAgent", client.clone())
        .with_allowed_tools(&registry, &["datetime"])
        .unwrap();
    let names: Vec<&str> = scheduler
        .tools()
        .list_tools()
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(names, vec!["get_date_difference", "get_datetime"]);

    let shouter = Agent::new("Shouter", client.clone())
        .with_allowed_tools(&registry, &["shout"])
        .unwrap();
    assert_eq!(shouter.tools().len(), 1);

    assert!(Agent::new("Typo", client)
        .with_allowed_tools(&registry, &["get_wether"])
        .is_err());
}

#[tokio::test]
async fn test_disallowed_tool_call_is_fed_back_as_error() {
    let mut registry = echo_registry().await;
    registry
        .add_protocol(Arc::new(DateTimeTool::new()))
        .await
        .unwrap();
    let client = Arc::new(ScriptedClient::new(&[
        r#"{"tool_call": {"name": "shout", "parameters": {"text": "hi"}}}"#,
        "Could not use that tool.",
    ]));
    let agent = Agent::new("SchedulingAgent", client.clone())
        .with_allowed_tools(&registry, &["datetime"])
        .unwrap();

    let response = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap();

    assert_eq!(response.content, "Could not use that tool.");
    let feedback = client.requests()[1].last().unwrap().content.to_string();
    assert!(feedback.starts_with("Tool execution error:"));
}

#[tokio::test]
async fn test_client_error_propagates() {
    let client = Arc::new(ScriptedClient::new(&[]));
    let agent = Agent::new("PMAgent", client);

    let err = agent
        .produce_reply(&shared_transcript(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("script exhausted"));
}

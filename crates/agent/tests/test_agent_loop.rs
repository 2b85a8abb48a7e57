//! Tests for the think/act loop

mod common;

use common::{envelope, llm, ScriptedProvider};
use fusion_agent::summary::{FINAL_ANSWER_CLOSE, FINAL_ANSWER_OPEN};
use fusion_agent::{extract_final_answer, AgentError, AgentLoop, AgentState, ToolRegistry};
use fusion_config::AgentSettings;
use fusion_provider::{ProviderError, ToolChoice};

fn agent(main: &std::sync::Arc<ScriptedProvider>, fallback: &std::sync::Arc<ScriptedProvider>) -> AgentLoop {
    AgentLoop::new(llm(main.clone()), llm(fallback.clone()), ToolRegistry::with_defaults())
}

#[tokio::test]
async fn test_plain_answer_without_tools() {
    let main = ScriptedProvider::constant("4");
    let fallback = ScriptedProvider::offline();
    let mut agent = agent(&main, &fallback)
        .with_tool_choice(ToolChoice::None)
        .with_max_steps(2);

    let result = agent.run("What is 2+2?").await;

    assert!(result.contains(FINAL_ANSWER_OPEN));
    assert!(result.contains(FINAL_ANSWER_CLOSE));
    assert_eq!(extract_final_answer(&result), Some("4"));
    assert_eq!(agent.state(), AgentState::Finished);
    assert_eq!(
        agent.memory().last().unwrap().content.as_deref(),
        Some("FINAL ANSWER: 4")
    );
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn test_none_mode_sends_no_tool_instructions() {
    let main = ScriptedProvider::constant("4");
    let mut agent = agent(&main, &ScriptedProvider::offline())
        .with_tool_choice(ToolChoice::None)
        .with_max_steps(1);

    agent.run("What is 2+2?").await;

    let first = &main.requests()[0];
    let system = first.messages[0].content.as_deref().unwrap();
    assert_eq!(first.messages[0].role, "system");
    assert!(!system.contains("You have access to the following tools"));
}

#[tokio::test]
async fn test_terminate_finishes_with_status() {
    let main = ScriptedProvider::new(&[
        Ok(envelope("terminate", r#"{"status":"success"}"#).as_str()),
        Ok("Paris is the capital of France."),
    ]);
    let mut agent = agent(&main, &ScriptedProvider::offline());

    let result = agent.run("What is the capital of France?").await;

    assert_eq!(agent.state(), AgentState::Finished);
    assert_eq!(agent.current_step(), 1);
    assert!(result.starts_with("The interaction has been completed with status: success"));
    assert!(result.contains("success"));
    assert_eq!(
        extract_final_answer(&result),
        Some("Paris is the capital of France.")
    );

    let roles: Vec<&str> = agent
        .memory()
        .messages()
        .iter()
        .map(|m| m.role.as_str())
        .collect();
    assert_eq!(roles, vec!["user", "user", "assistant", "tool", "assistant"]);

    let tool_message = &agent.memory().messages()[3];
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_test0001"));
    assert!(tool_message
        .content
        .as_deref()
        .unwrap()
        .contains("The interaction has been completed with status: success"));
}

#[tokio::test]
async fn test_terminate_failure_status_is_reported() {
    let main = ScriptedProvider::new(&[
        Ok(envelope("terminate", r#"{"status":"failure"}"#).as_str()),
        Ok("I could not find it."),
    ]);
    let mut agent = agent(&main, &ScriptedProvider::offline());

    let result = agent.run("Where is the page?").await;
    assert!(result.starts_with("The interaction has been completed with status: failure"));
}

#[tokio::test]
async fn test_tool_instructions_reach_the_model() {
    let main = ScriptedProvider::new(&[
        Ok(envelope("terminate", r#"{"status":"success"}"#).as_str()),
        Ok("done"),
    ]);
    let mut agent = agent(&main, &ScriptedProvider::offline());
    agent.run("q").await;

    let think = &main.requests()[0];
    let system = think.messages[0].content.as_deref().unwrap();
    assert!(system.contains("Tool: create_chat_completion"));
    assert!(system.contains("Tool: browser_use"));
    assert!(system.contains("Tool: terminate"));
    assert!(!think.stream);

    let summary = &main.requests()[1];
    assert_eq!(summary.messages.len(), 1);
    assert!(summary.messages[0]
        .content
        .as_deref()
        .unwrap()
        .contains("Please provide a clear answer to this question: \"q\""));
}

#[tokio::test]
async fn test_malformed_tool_call_is_plain_text() {
    let raw = r#"{"tool_calls": [{"function": {"name": "terminate""#;
    let main = ScriptedProvider::constant(raw);
    let mut agent = agent(&main, &ScriptedProvider::offline());

    assert!(agent.think().await);
    let result = agent.act().await.unwrap();

    assert_eq!(result, raw);
    assert!(!agent.memory().last().unwrap().has_tool_calls());
}

#[tokio::test]
async fn test_required_without_calls_fails_act() {
    let main = ScriptedProvider::constant("I would rather chat.");
    let mut agent = agent(&main, &ScriptedProvider::offline())
        .with_tool_choice(ToolChoice::Required);

    assert!(agent.think().await);
    let err = agent.act().await.unwrap_err();

    assert!(matches!(err, AgentError::ToolCallRequired));
    assert_eq!(err.to_string(), "Tool calls required but none provided");
}

#[tokio::test]
async fn test_required_without_calls_run_falls_back() {
    let main = ScriptedProvider::constant("I would rather chat.");
    let fallback = ScriptedProvider::constant("4");
    let mut agent = agent(&main, &fallback).with_tool_choice(ToolChoice::Required);

    let result = agent.run("What is 2+2?").await;

    assert_eq!(agent.state(), AgentState::Error);
    assert_eq!(extract_final_answer(&result), Some("4"));
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn test_auto_without_calls_or_content_stops() {
    let main = ScriptedProvider::constant("");
    let mut agent = agent(&main, &ScriptedProvider::offline());

    assert!(!agent.think().await);
    assert_eq!(
        agent.step().await.unwrap(),
        "Thinking complete - no action needed"
    );
}

#[tokio::test]
async fn test_auto_content_only_acts_on_content() {
    let main = ScriptedProvider::constant("Let me think about that.");
    let mut agent = agent(&main, &ScriptedProvider::offline());

    assert_eq!(agent.step().await.unwrap(), "Let me think about that.");
}

#[tokio::test]
async fn test_communication_failure_uses_fallback_gateway() {
    let main = ScriptedProvider::offline();
    let fallback = ScriptedProvider::constant("4");
    let mut agent = agent(&main, &fallback);

    let result = agent.run("What is 2+2?").await;

    assert_eq!(agent.state(), AgentState::Finished);
    assert_eq!(agent.current_step(), 1);
    assert!(result.starts_with(FINAL_ANSWER_OPEN));
    assert_eq!(extract_final_answer(&result), Some("4"));
    assert_eq!(main.calls(), 2);
    assert!(fallback.requests()[0].messages[0]
        .content
        .as_deref()
        .unwrap()
        .ends_with("Keep your answer simple and under 150 words."));
}

#[tokio::test]
async fn test_total_outage_still_answers() {
    let mut agent = agent(&ScriptedProvider::offline(), &ScriptedProvider::offline());

    let result = agent.run("What is 2+2?").await;

    assert!(result.contains("Sorry, I couldn't generate an answer to your question: 'What is 2+2?'"));
    assert!(result.ends_with(FINAL_ANSWER_CLOSE));
}

#[tokio::test]
async fn test_step_budget_exhaustion_still_summarizes() {
    let call = envelope("create_chat_completion", r#"{"response":"working"}"#);
    let main = ScriptedProvider::new(&[Ok(call.as_str()), Ok(call.as_str()), Ok(call.as_str()), Ok("done")]);
    let mut agent = agent(&main, &ScriptedProvider::offline()).with_max_steps(3);

    let result = agent.run("Keep going").await;

    assert_eq!(agent.current_step(), 3);
    assert_eq!(agent.state(), AgentState::Finished);
    assert!(result.contains("status: success"));
    assert_eq!(extract_final_answer(&result), Some("done"));
}

#[tokio::test]
async fn test_failing_call_does_not_abort_others() {
    let two_calls = serde_json::json!({
        "tool_calls": [
            {"id": "call_a", "function": {"name": "nope", "arguments": "{}"}},
            {"id": "call_b", "function": {"name": "create_chat_completion", "arguments": "{\"response\":\"ok\"}"}}
        ]
    })
    .to_string();
    let main = ScriptedProvider::constant(&two_calls);
    let mut agent = agent(&main, &ScriptedProvider::offline());

    assert!(agent.think().await);
    let result = agent.act().await.unwrap();

    assert_eq!(
        result,
        "Error: Unknown tool 'nope'\n\nObserved output of cmd `create_chat_completion` executed:\nok"
    );
    let tool_ids: Vec<_> = agent
        .memory()
        .messages()
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_ids, vec!["call_a", "call_b"]);
}

#[tokio::test]
async fn test_observations_are_truncated() {
    let call = envelope("create_chat_completion", r#"{"response":"a long observation"}"#);
    let main = ScriptedProvider::constant(&call);
    let mut agent = agent(&main, &ScriptedProvider::offline()).with_max_observe(Some(10));

    agent.think().await;
    let result = agent.act().await.unwrap();

    assert_eq!(result, "Observed o");
    assert_eq!(
        agent.memory().last().unwrap().content.as_deref(),
        Some("Observed o")
    );
}

#[tokio::test]
async fn test_second_run_needs_reset() {
    let main = ScriptedProvider::new(&[
        Ok(envelope("terminate", r#"{"status":"success"}"#).as_str()),
        Ok("first"),
    ]);
    let fallback = ScriptedProvider::constant("from fallback");
    let mut agent = agent(&main, &fallback);

    agent.run("one").await;
    assert_eq!(agent.state(), AgentState::Finished);

    let second = agent.run("two").await;
    assert_eq!(extract_final_answer(&second), Some("from fallback"));
    assert_eq!(agent.state(), AgentState::Finished);

    agent.reset();
    assert_eq!(agent.state(), AgentState::Idle);
    assert!(agent.memory().is_empty());
    assert!(agent.final_summary().is_none());
}

#[test]
fn test_settings_apply() {
    let settings = AgentSettings {
        name: "scout".to_string(),
        max_steps: 4,
        tool_choice: "required".to_string(),
        ..Default::default()
    };
    let agent = agent(&ScriptedProvider::offline(), &ScriptedProvider::offline())
        .with_settings(&settings)
        .unwrap();

    assert_eq!(agent.name(), "scout");
    assert_eq!(agent.tool_choice(), ToolChoice::Required);
}

#[test]
fn test_settings_reject_unknown_tool_choice() {
    let settings = AgentSettings {
        tool_choice: "sometimes".to_string(),
        ..Default::default()
    };
    let result = agent(&ScriptedProvider::offline(), &ScriptedProvider::offline())
        .with_settings(&settings);

    assert!(matches!(
        result,
        Err(AgentError::Provider(ProviderError::Validation(_)))
    ));
}

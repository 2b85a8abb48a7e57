//! Prompt assembly for the think step

use chrono::Local;

/// Appended as a user message before every think
pub const NEXT_STEP_PROMPT: &str = "Based on the conversation so far, decide the next step. \
Use a tool if it brings you closer to the answer. When the question is answered, \
call the `terminate` tool with status \"success\" (or \"failure\" if you cannot proceed).";

/// Default system prompt for an agent holding `tool_names`
pub fn system_prompt(agent_name: &str, tool_names: &[String]) -> String {
    let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
    let tools = if tool_names.is_empty() {
        "(none)".to_string()
    } else {
        tool_names.join(", ")
    };

    format!(
        r#"# {name}

You are {name}, an agent that answers questions by reasoning step by step and calling tools.

## Current Time
{now}

## Tools
{tools}

Call at most the tools you need, one step at a time, and read every observation before
deciding what to do next. Keep answers accurate and concise."#,
        name = agent_name,
        now = now,
        tools = tools,
    )
}

/// First-tier summary request
pub fn summary_prompt(question: &str) -> String {
    format!(
        "Please provide a clear answer to this question: \"{}\"\n\n\
         Keep your answer direct, informative, and under 200 words.",
        question
    )
}

/// Second-tier summary request
pub fn fallback_prompt(question: &str) -> String {
    format!("{} Keep your answer simple and under 150 words.", question)
}

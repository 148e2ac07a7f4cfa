//! Prompt 构造
//!
//! system 消息 = 角色说明 + 任务标记 + 输出格式（JSON Schema）；user 消息是结构化的 JSON 负载，
//! 认知层看不到会话的任何可变状态，只看到这里显式给出的内容。

use serde_json::{json, Value};

use crate::core::{SessionState, ToolCall};
use crate::llm::{ControlTask, Message};
use crate::tools::{plan_schema_json, tool_call_schema_json, Capability};

const PLANNER_ROLE: &str = "You are the planning component of a guarded question-answering loop. \
Choose an ordered list of steps that answers the question with the least work. \
Steps: REFLECT (think), RETRIEVE (fetch knowledge), EXECUTE (call one tool), ANSWER (final answer). \
The plan must end with ANSWER.";

const SELECTOR_ROLE: &str = "You choose exactly one tool call for the question. \
Pick only from the listed capabilities and satisfy its input_schema. \
Prefer cheaper and faster capabilities. Return an empty tool name if none fits.";

const REPAIR_ROLE: &str = "A tool call failed. Propose ONE different call (another capability or corrected arguments) \
that can still answer the question. Never repeat the failed call. \
Return an empty tool name if no alternative can work.";

const REFLECT_ROLE: &str = "Think step-by-step about the question using the evidence below. \
Be concise; your notes are advisory and never final answers.";

const SUMMARIZE_ROLE: &str = "Compress the reasoning notes into a short summary that keeps facts, \
intermediate results and open issues.";

fn system(role: &str, task: ControlTask, schema: Option<String>) -> Message {
    let mut s = format!("{role}\n{}\n", task.marker());
    if let Some(schema) = schema {
        s.push_str("Respond with JSON only, matching this schema:\n");
        s.push_str(&schema);
    }
    Message::system(s)
}

fn catalog(capabilities: &[&Capability]) -> Value {
    Value::Array(capabilities.iter().map(|c| c.descriptor()).collect())
}

pub fn plan_messages(state: &SessionState) -> Vec<Message> {
    let mut payload = json!({
        "question": state.question(),
        "have_knowledge": !state.knowledge().is_empty(),
        "have_tool_results": state.tool_results().iter().any(|r| r.ok),
        "max_plan_len": state.guardrails().max_plan_len,
    });
    let memory = state.memory().to_prompt_section();
    if !memory.is_empty() {
        payload["memory"] = Value::from(memory);
    }
    vec![
        system(PLANNER_ROLE, ControlTask::Plan, Some(plan_schema_json())),
        Message::user(payload.to_string()),
    ]
}

pub fn select_tool_messages(state: &SessionState, capabilities: &[&Capability]) -> Vec<Message> {
    let knowledge: Vec<&str> = state.knowledge().iter().map(|k| k.title.as_str()).collect();
    let payload = json!({
        "question": state.question(),
        "knowledge_titles": knowledge,
        "capabilities": catalog(capabilities),
    });
    vec![
        system(SELECTOR_ROLE, ControlTask::SelectTool, Some(tool_call_schema_json())),
        Message::user(payload.to_string()),
    ]
}

pub fn repair_messages(state: &SessionState, failed: &ToolCall, capabilities: &[&Capability]) -> Vec<Message> {
    let payload = json!({
        "question": state.question(),
        "last_error": state.last_error().unwrap_or(""),
        "failed_call": failed,
        "capabilities": catalog(capabilities),
    });
    vec![
        system(REPAIR_ROLE, ControlTask::Repair, Some(tool_call_schema_json())),
        Message::user(payload.to_string()),
    ]
}

pub fn reflect_messages(state: &SessionState) -> Vec<Message> {
    let mut user = format!("Question: {}\n", state.question());
    if !state.knowledge().is_empty() {
        user.push_str("\nKnowledge:\n");
        for k in state.knowledge() {
            user.push_str(&format!("- {}: {}\n", k.title, k.text));
        }
    }
    let results: Vec<String> = state
        .tool_results()
        .iter()
        .map(|r| format!("- {} ok={} {}", r.tool, r.ok, r.output))
        .collect();
    if !results.is_empty() {
        user.push_str("\nTool results:\n");
        user.push_str(&results.join("\n"));
        user.push('\n');
    }
    user.push_str(&state.memory().to_prompt_section());
    vec![
        system(REFLECT_ROLE, ControlTask::Reflect, None),
        Message::user(user),
    ]
}

pub fn summarize_messages(summary: Option<&str>, notes: &[String]) -> Vec<Message> {
    let mut user = String::new();
    if let Some(prev) = summary {
        user.push_str(&format!("Previous summary:\n{prev}\n\n"));
    }
    user.push_str("Notes:\n");
    for (i, n) in notes.iter().enumerate() {
        user.push_str(&format!("{}. {}\n", i + 1, n));
    }
    vec![
        system(SUMMARIZE_ROLE, ControlTask::Summarize, None),
        Message::user(user),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Guardrails;
    use crate::tools::CalculatorTool;

    #[test]
    fn test_each_prompt_carries_its_task_marker() {
        let state = SessionState::new("What is LangGraph?", Guardrails::default());
        let cap = Capability::from_tool(CalculatorTool);
        let caps = [&cap];
        let failed = ToolCall::new("calculator", serde_json::Map::new());

        let cases = [
            (plan_messages(&state), ControlTask::Plan),
            (select_tool_messages(&state, &caps), ControlTask::SelectTool),
            (repair_messages(&state, &failed, &caps), ControlTask::Repair),
            (reflect_messages(&state), ControlTask::Reflect),
            (summarize_messages(None, &["a".into()]), ControlTask::Summarize),
        ];
        for (messages, task) in cases {
            assert_eq!(ControlTask::detect(&messages), Some(task));
        }
    }

    #[test]
    fn test_select_payload_lists_only_given_capabilities() {
        let state = SessionState::new("2 * 3", Guardrails::default());
        let cap = Capability::from_tool(CalculatorTool);
        let messages = select_tool_messages(&state, &[&cap]);
        let payload: Value = serde_json::from_str(&messages[1].content).unwrap();
        assert_eq!(payload["question"], "2 * 3");
        assert_eq!(payload["capabilities"].as_array().unwrap().len(), 1);
        assert_eq!(payload["capabilities"][0]["name"], "calculator");
    }
}

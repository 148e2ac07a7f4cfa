//! 离线 LLM 客户端（无需 API）
//!
//! - MockLlmClient：按 system 消息中的任务标记给出确定性的控制响应，便于本地跑通整条会话
//! - ScriptedLlmClient：按顺序回放预置响应并记录收到的每个请求，用于测试

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::llm::{ControlTask, LlmClient, Message, Role};

/// Mock 客户端：确定性策略
///
/// - plan：问题像计算题则 EXECUTE → ANSWER，否则 RETRIEVE → ANSWER
/// - select_tool：选目录中的第一个能力，必填字符串参数用问题（或其中的算式）填充
/// - repair：一律放弃（空 tool）
/// - reflect / summarize：固定格式文本
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let user = last_user(messages);
        let payload: Value = serde_json::from_str(user).unwrap_or(Value::Null);
        let question = payload
            .get("question")
            .and_then(|v| v.as_str())
            .unwrap_or(user);

        let response = match ControlTask::detect(messages) {
            Some(ControlTask::Plan) => {
                let plan = if looks_computational(question) {
                    json!({ "plan": ["EXECUTE", "ANSWER"] })
                } else {
                    json!({ "plan": ["RETRIEVE", "ANSWER"] })
                };
                plan.to_string()
            }
            Some(ControlTask::SelectTool) => select_first(&payload, question).to_string(),
            Some(ControlTask::Repair) => json!({ "tool": "", "args": {} }).to_string(),
            Some(ControlTask::Reflect) => format!(
                "Working through the question step by step: {question}. Use the evidence gathered so far."
            ),
            Some(ControlTask::Summarize) => {
                let text: String = user.chars().take(400).collect();
                format!("Earlier reasoning: {text}")
            }
            None => format!("Mock reply to: {user}"),
        };
        Ok(response)
    }
}

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

fn looks_computational(question: &str) -> bool {
    let q = question.to_lowercase();
    ["calculate", "compute", "evaluate", "how much is"]
        .iter()
        .any(|k| q.contains(k))
        || arithmetic_span(question).is_some()
}

/// 问题中最长的算式片段（至少含一个数字与一个运算符）
fn arithmetic_span(question: &str) -> Option<String> {
    let is_arith = |c: char| c.is_ascii_digit() || " +-*/%().".contains(c);
    question
        .split(|c: char| !is_arith(c))
        .map(str::trim)
        .filter(|s| s.chars().any(|c| c.is_ascii_digit()) && s.chars().any(|c| "+-*/%".contains(c)))
        .max_by_key(|s| s.len())
        .map(String::from)
}

fn select_first(payload: &Value, question: &str) -> Value {
    let Some(first) = payload
        .get("capabilities")
        .and_then(|v| v.as_array())
        .and_then(|caps| caps.first())
    else {
        return json!({ "tool": "", "args": {} });
    };
    let name = first.get("name").and_then(|v| v.as_str()).unwrap_or("");
    let mut args = Map::new();
    let required = first["input_schema"]["required"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    for field in required.iter().filter_map(|f| f.as_str()) {
        let value = if field == "expression" {
            arithmetic_span(question).unwrap_or_else(|| question.to_string())
        } else {
            question.to_string()
        };
        args.insert(field.to_string(), Value::from(value));
    }
    json!({ "tool": name, "args": args })
}

/// 脚本客户端：依次返回预置响应，耗尽后返回 Err；记录所有请求
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次调用失败
    pub fn then_error(self, err: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(err.into()));
        self
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 已收到的请求种类（按顺序）
    pub fn tasks(&self) -> Vec<Option<ControlTask>> {
        self.requests()
            .iter()
            .map(|msgs| ControlTask::detect(msgs))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(task: ControlTask, payload: Value) -> Vec<Message> {
        vec![
            Message::system(format!("control\n{}", task.marker())),
            Message::user(payload.to_string()),
        ]
    }

    #[tokio::test]
    async fn test_mock_plans_retrieval_for_factual_questions() {
        let out = MockLlmClient
            .complete(&request(ControlTask::Plan, json!({"question": "What is LangGraph?"})))
            .await
            .unwrap();
        assert_eq!(out, r#"{"plan":["RETRIEVE","ANSWER"]}"#);
    }

    #[tokio::test]
    async fn test_mock_plans_execution_for_calculations() {
        let out = MockLlmClient
            .complete(&request(ControlTask::Plan, json!({"question": "Please calculate 3 * 7"})))
            .await
            .unwrap();
        assert!(out.contains("EXECUTE"));
    }

    #[tokio::test]
    async fn test_mock_selects_first_capability_and_extracts_expression() {
        let payload = json!({
            "question": "Please calculate 3 * 7 for me",
            "capabilities": [
                {"name": "calculator", "input_schema": {"required": ["expression"]}},
                {"name": "other", "input_schema": {"required": ["query"]}}
            ]
        });
        let out = MockLlmClient
            .complete(&request(ControlTask::SelectTool, payload))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["tool"], "calculator");
        assert_eq!(v["args"]["expression"], "3 * 7");
    }

    #[tokio::test]
    async fn test_mock_declines_repairs() {
        let out = MockLlmClient
            .complete(&request(ControlTask::Repair, json!({})))
            .await
            .unwrap();
        assert!(out.contains(r#""tool":"""#));
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order_then_errors() {
        let client = ScriptedLlmClient::new(["a", "b"]).then_error("boom");
        let msgs = [Message::user("x")];
        assert_eq!(client.complete(&msgs).await.unwrap(), "a");
        assert_eq!(client.complete(&msgs).await.unwrap(), "b");
        assert_eq!(client.complete(&msgs).await.unwrap_err(), "boom");
        assert_eq!(client.complete(&msgs).await.unwrap_err(), "script exhausted");
        assert_eq!(client.requests().len(), 4);
        assert_eq!(client.remaining(), 0);
    }
}

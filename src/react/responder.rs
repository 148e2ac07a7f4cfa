//! Responder：终止步骤，从证据合成最终答案
//!
//! 证据优先级：最近一次成功的工具结果 > 已检索知识 > 明确的「证据不足」答复。永不失败。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Phase, SessionState, ToolResult};

/// 答案所依据的证据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    ToolResult,
    Knowledge,
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub evidence: Evidence,
}

impl Answer {
    /// 没有任何证据支撑
    pub fn incomplete(&self) -> bool {
        self.evidence == Evidence::Insufficient
    }
}

pub struct Responder;

impl Responder {
    pub fn respond(state: &SessionState) -> Answer {
        if let Some(result) = state.last_successful_result() {
            return Answer {
                text: render_tool_result(result),
                evidence: Evidence::ToolResult,
            };
        }

        if !state.knowledge().is_empty() {
            let text = state
                .knowledge()
                .iter()
                .map(|k| k.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            return Answer {
                text,
                evidence: Evidence::Knowledge,
            };
        }

        let mut text = String::from(
            "I don't have enough evidence to answer confidently; this answer is based on incomplete evidence.",
        );
        if state.phase() == Phase::GuardrailStopped {
            if let Some(last) = state.rationale().last() {
                text.push_str(&format!(" Stopped because: {}", last.text));
            }
        }
        if let Some(err) = state.last_error() {
            text.push_str(&format!(" Last error: {err}"));
        }
        Answer {
            text,
            evidence: Evidence::Insufficient,
        }
    }
}

fn render_tool_result(result: &ToolResult) -> String {
    let value = result.result().cloned().unwrap_or(Value::Null);
    if result.tool == "calculator" {
        if let Some(n) = value.as_f64() {
            return format!("The result is {}.", format_number(n));
        }
    }
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// 整数结果去掉小数点：4.0 → "4"
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    use crate::config::Guardrails;
    use crate::core::{KnowledgeChunk, NextAction};

    fn state() -> SessionState {
        SessionState::new("q", Guardrails::default())
    }

    #[test]
    fn test_calculator_result_takes_priority() {
        let mut s = state();
        s.record_retrieval(Ok(vec![KnowledgeChunk::new("t", "some text")]));
        s.record_tool_attempt(ToolResult::success("calculator", Map::new(), json!(4.0)), 5, false);
        s.record_tool_attempt(ToolResult::failure("calculator", Map::new(), "bad"), 5, false);
        let a = Responder::respond(&s);
        assert_eq!(a.text, "The result is 4.");
        assert_eq!(a.evidence, Evidence::ToolResult);
        assert!(!a.incomplete());
    }

    #[test]
    fn test_knowledge_is_joined_in_order() {
        let mut s = state();
        s.record_retrieval(Ok(vec![
            KnowledgeChunk::new("a", "First."),
            KnowledgeChunk::new("b", "Second."),
        ]));
        let a = Responder::respond(&s);
        assert_eq!(a.text, "First. Second.");
        assert_eq!(a.evidence, Evidence::Knowledge);
    }

    #[test]
    fn test_insufficient_evidence_is_explicit() {
        let mut s = state();
        s.record_tool_attempt(ToolResult::failure("calculator", Map::new(), "division by zero"), 5, false);
        s.apply_decision(
            NextAction::Respond(Phase::GuardrailStopped),
            "STOP: tool_fail_cap reached (1/1)".into(),
            None,
        );
        let a = Responder::respond(&s);
        assert!(a.incomplete());
        assert!(a.text.contains("incomplete evidence"));
        assert!(a.text.contains("tool_fail_cap"));
        assert!(a.text.contains("division by zero"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_non_calculator_result_rendered_as_text() {
        let r = ToolResult::success("web_lookup_stub", Map::new(), json!("Stubbed"));
        assert_eq!(render_tool_result(&r), "Stubbed");
    }
}

//! 认知层控制响应解析
//!
//! 认知层只会返回两种结构：计划 `{"plan": [...]}` 与工具调用 `{"tool": "...", "args": {...}}`。
//! 先从文本中提取 JSON（```json 代码块或首尾花括号），再严格按结构解析；无法解析即 MalformedControlResponse。

use serde_json::Value;

use crate::core::{AgentError, Step, ToolCall};

/// 从 LLM 文本中提取 JSON 片段
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find(|c| c == '{' || c == '[')?;
    let end = trimmed.rfind(|c| c == '}' || c == ']')?;
    (end >= start).then(|| &trimmed[start..=end])
}

fn malformed(raw: &str, reason: impl std::fmt::Display) -> AgentError {
    let preview: String = raw.trim().chars().take(120).collect();
    AgentError::MalformedControlResponse(format!("{reason}: {preview}"))
}

/// 解析计划：丢弃词表外的步骤，截断到 max_len；没有任何有效步骤视为格式错误
///
/// 同时接受 `{"plan": [...]}` 与裸数组 `[...]`。
pub fn parse_plan(raw: &str, max_len: usize) -> Result<Vec<Step>, AgentError> {
    let json = extract_json(raw).ok_or_else(|| malformed(raw, "no JSON found"))?;
    let value: Value = serde_json::from_str(json).map_err(|e| malformed(raw, e))?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("plan")
            .and_then(|p| p.as_array())
            .ok_or_else(|| malformed(raw, "missing 'plan' array"))?,
        _ => return Err(malformed(raw, "expected an object or array")),
    };

    let mut plan = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().and_then(Step::parse) {
            Some(step) => plan.push(step),
            None => tracing::debug!(step = %item, "dropping unknown plan step"),
        }
    }
    plan.truncate(max_len);
    if plan.is_empty() {
        return Err(malformed(raw, "plan has no valid steps"));
    }
    Ok(plan)
}

/// 解析工具调用；tool 为空表示「没有可行动作」，返回 Ok(None)
pub fn parse_tool_call(raw: &str) -> Result<Option<ToolCall>, AgentError> {
    let json = extract_json(raw).ok_or_else(|| malformed(raw, "no JSON found"))?;
    let mut call: ToolCall = serde_json::from_str(json).map_err(|e| malformed(raw, e))?;
    call.tool = call.tool.trim().to_string();
    if call.tool.is_empty() {
        return Ok(None);
    }
    Ok(Some(call))
}

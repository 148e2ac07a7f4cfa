//! 控制面 JSON Schema 生成（schemars）
//!
//! 认知层只会被问两种结构：计划 `{"plan": [...]}` 与工具调用 `{"tool": "...", "args": {...}}`。
//! 把它们的 Schema 注入 system prompt，减少输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

use crate::core::Step;

/// 计划格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanFormat {
    /// 有序步骤，只能取 REFLECT / RETRIEVE / EXECUTE / ANSWER
    pub plan: Vec<Step>,
}

/// 工具调用格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 能力名；返回空字符串表示没有可行动作
    pub tool: String,
    /// 参数，必须满足该能力的输入契约
    pub args: HashMap<String, Value>,
}

pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

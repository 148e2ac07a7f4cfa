//! 快速通道：识别纯算术问题，绕过计划直接调用计算器
//!
//! 只认一种窄模式（数字、空白、+ - * / % 与括号，且至少一个数字）；这是控制面唯一基于字符串匹配的分支。

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::{AgentError, ToolCall};

const ARITHMETIC_PATTERN: &str = r"^[0-9\s+\-*/%().]+$";

#[derive(Debug, Clone)]
pub struct FastPath {
    pattern: Regex,
    capability: String,
    argument: String,
}

impl FastPath {
    /// 纯算术 → calculator(expression)
    pub fn arithmetic() -> Result<Self, AgentError> {
        let pattern = Regex::new(ARITHMETIC_PATTERN)
            .map_err(|e| AgentError::ConfigError(format!("fast path pattern: {e}")))?;
        Ok(Self {
            pattern,
            capability: "calculator".to_string(),
            argument: "expression".to_string(),
        })
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// 匹配时返回要派发的调用
    pub fn detect(&self, question: &str) -> Option<ToolCall> {
        let q = question.trim();
        if !self.pattern.is_match(q) || !q.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let mut args = Map::new();
        args.insert(self.argument.clone(), Value::from(q));
        Some(ToolCall::new(self.capability.clone(), args))
    }
}

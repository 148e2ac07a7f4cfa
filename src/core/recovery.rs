//! 错误恢复引擎
//!
//! 把控制面错误映射为动作：降级为「路由到 Responder」、视为无产出继续，或宣告修复耗尽。

use crate::core::AgentError;

/// 恢复引擎给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 放弃剩余计划，带着说明路由到 Responder（护栏式降级）
    RouteToResponder(String),
    /// 无产出但不致命，照常推进
    Continue,
    /// 本次工具步骤不再修复，失败留在 last_error 中
    ExhaustRepair(String),
}

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::NoResults(_) => RecoveryAction::Continue,
            AgentError::NoViableRepair(reason) => RecoveryAction::ExhaustRepair(reason.clone()),
            AgentError::MalformedControlResponse(raw) => RecoveryAction::RouteToResponder(format!(
                "cognitive layer returned an unparsable control response ({raw})"
            )),
            AgentError::LlmError(msg) => {
                RecoveryAction::RouteToResponder(format!("cognitive layer unavailable ({msg})"))
            }
            AgentError::NoEligibleCapability(max) => RecoveryAction::RouteToResponder(format!(
                "no capability is allowed under risk ceiling '{max}'"
            )),
            other => RecoveryAction::RouteToResponder(other.to_string()),
        }
    }

    /// 修复阶段专用：任何错误都意味着本次尝试已耗尽
    pub fn handle_repair(&self, err: &AgentError) -> RecoveryAction {
        match self.handle(err) {
            RecoveryAction::ExhaustRepair(reason) => RecoveryAction::ExhaustRepair(reason),
            _ => RecoveryAction::ExhaustRepair(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tier;

    #[test]
    fn test_malformed_response_routes_to_responder() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::MalformedControlResponse("{oops".into()));
        match action {
            RecoveryAction::RouteToResponder(msg) => assert!(msg.contains("unparsable")),
            other => panic!("Expected RouteToResponder, got {other:?}"),
        }
    }

    #[test]
    fn test_no_results_is_not_fatal() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::NoResults("q".into()));
        assert_eq!(action, RecoveryAction::Continue);
    }

    #[test]
    fn test_no_eligible_capability_names_ceiling() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::NoEligibleCapability(Tier::Low));
        assert!(matches!(action, RecoveryAction::RouteToResponder(m) if m.contains("'low'")));
    }

    #[test]
    fn test_repair_errors_exhaust_attempt() {
        let engine = RecoveryEngine::new();
        let action = engine.handle_repair(&AgentError::MalformedControlResponse("x".into()));
        assert!(matches!(action, RecoveryAction::ExhaustRepair(_)));
        let action = engine.handle_repair(&AgentError::NoViableRepair("declined".into()));
        assert_eq!(action, RecoveryAction::ExhaustRepair("declined".into()));
    }
}

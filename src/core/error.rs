//! 控制面错误类型
//!
//! 所有错误都不会让进程退出：Reasoner 通过 RecoveryEngine 把它们降级为「路由到 Responder + 说明理由」，
//! 工具失败则在 Executor 内修复一次后以 last_error / tool_fail_count 的形式累积在会话状态里。

use thiserror::Error;

use crate::tools::Tier;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Duplicate capability: {0}")]
    DuplicateCapability(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// 当前风险上限下没有任何可用能力
    #[error("No eligible capability under risk ceiling '{0}'")]
    NoEligibleCapability(Tier),

    #[error("Capability '{tool}' has risk '{risk}', above ceiling '{max}'")]
    RiskExceeded { tool: String, risk: Tier, max: Tier },

    #[error("No viable repair: {0}")]
    NoViableRepair(String),

    /// 认知层返回的 plan / tool-call JSON 无法解析
    #[error("Malformed control response: {0}")]
    MalformedControlResponse(String),

    #[error("Retrieval found nothing: {0}")]
    NoResults(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

//! 会话事件与决策理由
//!
//! 事件日志是整个会话的全序记录：每条事件携带所属步数、毫秒时间戳以及事件发生后的计数器快照，
//! 便于离线核对计数器单调性与护栏上限。理由条目与 Reasoner 决策一一对应，并指向促成该决策的事件。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::state::{Counters, Phase, Step};
use crate::react::Evidence;

/// 触发终止的护栏
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guardrail {
    MaxSteps,
    RetrieveCap,
    ToolFailCap,
    ToolCallCap,
    ToolLatencyCap,
}

impl Guardrail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Guardrail::MaxSteps => "max_steps",
            Guardrail::RetrieveCap => "retrieve_cap",
            Guardrail::ToolFailCap => "tool_fail_cap",
            Guardrail::ToolCallCap => "tool_call_cap",
            Guardrail::ToolLatencyCap => "tool_latency_cap_ms",
        }
    }
}

impl std::fmt::Display for Guardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件类型与载荷（序列化为 {"type": ..., "payload": {...}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// Reasoner 做出一次决策
    Decision { next: String, phase: Phase },
    PlanCreated { plan: Vec<Step> },
    GuardrailTriggered { guardrail: Guardrail, detail: String },
    ToolSucceeded {
        tool: String,
        args: Map<String, Value>,
        latency_ms: u64,
        repair: bool,
    },
    ToolFailed {
        tool: String,
        args: Map<String, Value>,
        error: String,
        latency_ms: u64,
        repair: bool,
    },
    /// Executor 在调用前拒绝（未知能力 / 风险超限 / 参数不合契约），不消耗调用额度
    ToolRejected { tool: String, reason: String },
    RepairProposed { tool: String, args: Map<String, Value> },
    RepairUnavailable { reason: String },
    Retrieved { titles: Vec<String> },
    RetrieveEmpty { reason: String },
    Reflected { ok: bool, chars: usize },
    MemorySummarized { summarized: usize, kept: usize },
    Answered { evidence: Evidence },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Decision { .. } => "decision",
            EventKind::PlanCreated { .. } => "plan_created",
            EventKind::GuardrailTriggered { .. } => "guardrail_triggered",
            EventKind::ToolSucceeded { .. } => "tool_succeeded",
            EventKind::ToolFailed { .. } => "tool_failed",
            EventKind::ToolRejected { .. } => "tool_rejected",
            EventKind::RepairProposed { .. } => "repair_proposed",
            EventKind::RepairUnavailable { .. } => "repair_unavailable",
            EventKind::Retrieved { .. } => "retrieved",
            EventKind::RetrieveEmpty { .. } => "retrieve_empty",
            EventKind::Reflected { .. } => "reflected",
            EventKind::MemorySummarized { .. } => "memory_summarized",
            EventKind::Answered { .. } => "answered",
        }
    }
}

/// 单条事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub step: u32,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp_ms: i64,
    /// 事件发生后的计数器
    pub counters: Counters,
}

/// 决策理由：与一次 Reasoner 决策一一对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub step: u32,
    pub text: String,
    /// 对应 Decision 事件在日志中的下标
    pub decision_event: usize,
    /// 上一次决策之后、本次决策之前发生的事件下标
    pub caused_by: Vec<usize>,
}

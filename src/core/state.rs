//! 会话状态：贯穿每一步的唯一可变记录
//!
//! 问题、计划、计数器、知识、工具结果、错误、事件日志与理由日志都在这里。
//! 计数器只能通过 record_* 方法递增，每个对应事件恰好 +1；理由条目只能通过 apply_decision 追加，
//! 与 step_count 的递增在同一个方法里完成，因此理由条数始终等于 step_count。

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Guardrails;
use crate::core::events::{Event, EventKind, Guardrail, Rationale};
use crate::core::AgentError;
use crate::react::{Answer, ReasoningMemory};

/// 计划步骤（认知层只能从这四个词里选）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Step {
    Reflect,
    Retrieve,
    Execute,
    Answer,
}

impl Step {
    /// 宽松解析：大小写不敏感，兼容旧词表 THINK / TOOL
    pub fn parse(s: &str) -> Option<Step> {
        match s.trim().to_uppercase().as_str() {
            "REFLECT" | "THINK" => Some(Step::Reflect),
            "RETRIEVE" => Some(Step::Retrieve),
            "EXECUTE" | "TOOL" => Some(Step::Execute),
            "ANSWER" => Some(Step::Answer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Reflect => "REFLECT",
            Step::Retrieve => "RETRIEVE",
            Step::Execute => "EXECUTE",
            Step::Answer => "ANSWER",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态机阶段；ANSWERED 与 GUARDRAIL_STOPPED 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    Executing,
    Retrieving,
    Reflecting,
    Answered,
    GuardrailStopped,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Answered | Phase::GuardrailStopped)
    }
}

/// 工具调用请求：{"tool": "...", "args": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 工具输出契约：{tool, input, output, ok}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub input: Map<String, Value>,
    pub output: Value,
    pub ok: bool,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, input: Map<String, Value>, result: Value) -> Self {
        Self {
            tool: tool.into(),
            input,
            output: serde_json::json!({ "result": result }),
            ok: true,
        }
    }

    pub fn failure(
        tool: impl Into<String>,
        input: Map<String, Value>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            input,
            output: serde_json::json!({ "error": error.into() }),
            ok: false,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.output.get("result")
    }

    pub fn error(&self) -> Option<&str> {
        self.output.get("error").and_then(|v| v.as_str())
    }
}

/// 检索得到的知识片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub title: String,
    pub text: String,
}

impl KnowledgeChunk {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// 下一步动作，只由 Reasoner 设置
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// 回到 Reasoner（如刚建好计划）
    Reason,
    Reflect,
    Retrieve,
    Execute(ToolCall),
    /// 进入 Responder，携带终态
    Respond(Phase),
}

impl NextAction {
    pub fn phase(&self) -> Phase {
        match self {
            NextAction::Reason => Phase::Planning,
            NextAction::Reflect => Phase::Reflecting,
            NextAction::Retrieve => Phase::Retrieving,
            NextAction::Execute(_) => Phase::Executing,
            NextAction::Respond(terminal) => *terminal,
        }
    }

    pub fn label(&self) -> String {
        match self {
            NextAction::Reason => "REASON".to_string(),
            NextAction::Reflect => "REFLECT".to_string(),
            NextAction::Retrieve => "RETRIEVE".to_string(),
            NextAction::Execute(call) => format!("EXECUTE({})", call.tool),
            NextAction::Respond(Phase::GuardrailStopped) => "ANSWER(guardrail)".to_string(),
            NextAction::Respond(_) => "ANSWER".to_string(),
        }
    }
}

/// 会话计数器，全部单调不减
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub step_count: u32,
    pub retrieve_count: u32,
    pub tool_fail_count: u32,
    pub tool_call_count: u32,
    pub tool_latency_used_ms: u64,
}

/// 会话状态（每个问题一份，由运行中的会话独占）
#[derive(Debug)]
pub struct SessionState {
    run_id: String,
    question: String,
    guardrails: Guardrails,
    plan: Option<VecDeque<Step>>,
    counters: Counters,
    knowledge: Vec<KnowledgeChunk>,
    tool_results: Vec<ToolResult>,
    last_error: Option<String>,
    events: Vec<Event>,
    rationale: Vec<Rationale>,
    memory: ReasoningMemory,
    next: NextAction,
    phase: Phase,
    /// 快速通道已派发、结果尚未被 Reasoner 看过
    fast_path_pending: bool,
    fast_path_used: bool,
    /// 上一次决策之后的第一个事件下标
    pending_from: usize,
}

impl SessionState {
    pub fn new(question: impl Into<String>, guardrails: Guardrails) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            question: question.into(),
            guardrails,
            plan: None,
            counters: Counters::default(),
            knowledge: Vec::new(),
            tool_results: Vec::new(),
            last_error: None,
            events: Vec::new(),
            rationale: Vec::new(),
            memory: ReasoningMemory::new(),
            next: NextAction::Reason,
            phase: Phase::Planning,
            fast_path_pending: false,
            fast_path_used: false,
            pending_from: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn guardrails(&self) -> &Guardrails {
        &self.guardrails
    }

    pub fn plan(&self) -> Option<&VecDeque<Step>> {
        self.plan.as_ref()
    }

    /// 计划已建立且还有剩余步骤
    pub fn has_plan_steps(&self) -> bool {
        self.plan.as_ref().map_or(false, |p| !p.is_empty())
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn knowledge(&self) -> &[KnowledgeChunk] {
        &self.knowledge
    }

    pub fn tool_results(&self) -> &[ToolResult] {
        &self.tool_results
    }

    pub fn last_tool_result(&self) -> Option<&ToolResult> {
        self.tool_results.last()
    }

    /// 最近一次成功的工具结果（失败记录不算证据）
    pub fn last_successful_result(&self) -> Option<&ToolResult> {
        self.tool_results.iter().rev().find(|r| r.ok)
    }

    pub fn has_evidence(&self) -> bool {
        !self.knowledge.is_empty() || self.tool_results.iter().any(|r| r.ok)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn rationale(&self) -> &[Rationale] {
        &self.rationale
    }

    pub fn memory(&self) -> &ReasoningMemory {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut ReasoningMemory {
        &mut self.memory
    }

    pub fn next(&self) -> &NextAction {
        &self.next
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_plan(&mut self, plan: Vec<Step>) {
        self.push_event(EventKind::PlanCreated { plan: plan.clone() });
        self.plan = Some(plan.into_iter().collect());
    }

    pub(crate) fn pop_plan_step(&mut self) -> Option<Step> {
        self.plan.as_mut().and_then(|p| p.pop_front())
    }

    /// 剩余计划的可读形式，如 "[RETRIEVE, ANSWER]"
    pub fn remaining_plan(&self) -> String {
        let steps: Vec<&str> = self
            .plan
            .iter()
            .flatten()
            .map(|s| s.as_str())
            .collect();
        format!("[{}]", steps.join(", "))
    }

    pub(crate) fn mark_fast_path(&mut self) {
        self.fast_path_pending = true;
        self.fast_path_used = true;
    }

    pub fn fast_path_used(&self) -> bool {
        self.fast_path_used
    }

    /// 取出「快速通道结果待检查」标记（只会返回一次 true）
    pub(crate) fn take_fast_path_pending(&mut self) -> bool {
        std::mem::take(&mut self.fast_path_pending)
    }

    /// 记录一次 Reasoner 决策：step_count +1、追加 Decision 事件与唯一一条理由，并设置 next
    pub(crate) fn apply_decision(
        &mut self,
        next: NextAction,
        rationale: String,
        guardrail: Option<(Guardrail, String)>,
    ) -> u32 {
        self.counters.step_count += 1;
        let step = self.counters.step_count;
        if let Some((guardrail, detail)) = guardrail {
            self.push_event(EventKind::GuardrailTriggered { guardrail, detail });
        }
        let caused_by: Vec<usize> = (self.pending_from..self.events.len()).collect();
        let phase = next.phase();
        self.push_event(EventKind::Decision {
            next: next.label(),
            phase,
        });
        let decision_event = self.events.len() - 1;
        self.rationale.push(Rationale {
            step,
            text: rationale,
            decision_event,
            caused_by,
        });
        self.pending_from = self.events.len();
        self.next = next;
        self.phase = phase;
        step
    }

    /// 记录一次真实的工具调用（无论成败）：调用数 +1、延迟按能力声明计入，失败时失败数 +1
    pub(crate) fn record_tool_attempt(&mut self, result: ToolResult, latency_ms: u64, repair: bool) {
        self.counters.tool_call_count += 1;
        self.counters.tool_latency_used_ms += latency_ms;
        let kind = if result.ok {
            self.last_error = None;
            EventKind::ToolSucceeded {
                tool: result.tool.clone(),
                args: result.input.clone(),
                latency_ms,
                repair,
            }
        } else {
            self.counters.tool_fail_count += 1;
            let error = result
                .error()
                .unwrap_or("tool returned ok=false")
                .to_string();
            self.last_error = Some(format!("{}: {}", result.tool, error));
            EventKind::ToolFailed {
                tool: result.tool.clone(),
                args: result.input.clone(),
                error,
                latency_ms,
                repair,
            }
        };
        self.tool_results.push(result);
        self.push_event(kind);
    }

    /// Executor 在调用前拒绝请求：不计调用，只留下错误与事件
    pub(crate) fn record_tool_rejected(&mut self, tool: &str, err: &AgentError) {
        self.last_error = Some(err.to_string());
        self.push_event(EventKind::ToolRejected {
            tool: tool.to_string(),
            reason: err.to_string(),
        });
    }

    /// 记录一次检索（无论有无结果）：检索数 +1
    pub(crate) fn record_retrieval(&mut self, result: Result<Vec<KnowledgeChunk>, AgentError>) {
        self.counters.retrieve_count += 1;
        match result {
            Ok(chunks) => {
                let titles = chunks.iter().map(|c| c.title.clone()).collect();
                self.knowledge.extend(chunks);
                self.push_event(EventKind::Retrieved { titles });
            }
            Err(e) => self.push_event(EventKind::RetrieveEmpty {
                reason: e.to_string(),
            }),
        }
    }

    pub(crate) fn push_event(&mut self, kind: EventKind) {
        self.events.push(Event {
            step: self.counters.step_count,
            kind,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            counters: self.counters,
        });
    }

    pub(crate) fn record_answer(&mut self, answer: &Answer) {
        self.push_event(EventKind::Answered {
            evidence: answer.evidence,
        });
    }

    /// 拆出会话的全部内容，供生成只读快照；之后状态不复存在
    pub(crate) fn into_parts(self) -> SessionParts {
        SessionParts {
            run_id: self.run_id,
            question: self.question,
            guardrails: self.guardrails,
            counters: self.counters,
            knowledge: self.knowledge,
            tool_results: self.tool_results,
            last_error: self.last_error,
            events: self.events,
            rationale: self.rationale,
            memory: self.memory,
            phase: self.phase,
        }
    }
}

/// 会话结束时移交给轨迹快照的内容
pub(crate) struct SessionParts {
    pub run_id: String,
    pub question: String,
    pub guardrails: Guardrails,
    pub counters: Counters,
    pub knowledge: Vec<KnowledgeChunk>,
    pub tool_results: Vec<ToolResult>,
    pub last_error: Option<String>,
    pub events: Vec<Event>,
    pub rationale: Vec<Rationale>,
    pub memory: ReasoningMemory,
    pub phase: Phase,
}

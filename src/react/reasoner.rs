//! Reasoner：控制面策略
//!
//! 每次调用恰好做出一个决策，顺序固定：
//! 1. 护栏检查（步数、检索、失败、调用、延迟上限），触发即路由到 Responder 并终止
//! 2. 工具步骤的收尾：快速通道成功则作答；上一步工具失败且未修复（last_error 仍在）则交给 Responder
//! 3. 快速通道（纯算术 → 计算器），整个会话至多一次
//! 4. 计划创建（认知层返回步骤序列；本次决策不派发任何动作）
//! 5. 计划推进（弹出一步；EXECUTE 还需经风险过滤后的能力目录解析出具体调用，且不得与失败过的调用相同）
//!
//! 任何解析或能力解析错误都通过 RecoveryEngine 降级为「路由到 Responder + 说明」，不会中断会话。
//! step_count 递增与理由追加在 SessionState::apply_decision 中一次完成。

use std::sync::Arc;

use crate::core::{
    AgentError, Guardrail, NextAction, Phase, RecoveryAction, RecoveryEngine, SessionState, Step,
    ToolCall,
};
use crate::llm::LlmClient;
use crate::react::control::{parse_plan, parse_tool_call};
use crate::react::fast_path::FastPath;
use crate::react::prompts;
use crate::tools::{CapabilityRegistry, Tier};

/// 一次决策：下一步动作、理由，以及（若有）触发的护栏
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub next: NextAction,
    pub rationale: String,
    pub guardrail: Option<(Guardrail, String)>,
}

impl Decision {
    fn go(next: NextAction, rationale: impl Into<String>) -> Self {
        Self {
            next,
            rationale: rationale.into(),
            guardrail: None,
        }
    }

    fn stop(guardrail: Guardrail, detail: String) -> Self {
        Self {
            next: NextAction::Respond(Phase::GuardrailStopped),
            rationale: format!("STOP: {guardrail} reached ({detail})"),
            guardrail: Some((guardrail, detail)),
        }
    }

    fn degraded(reason: impl std::fmt::Display) -> Self {
        Self::go(
            NextAction::Respond(Phase::GuardrailStopped),
            format!("DEGRADED → ANSWER: {reason}"),
        )
    }
}

pub struct Reasoner {
    llm: Arc<dyn LlmClient>,
    fast_path: Option<FastPath>,
    recovery: RecoveryEngine,
}

impl Reasoner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fast_path: None,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn with_fast_path(mut self, fast_path: Option<FastPath>) -> Self {
        self.fast_path = fast_path;
        self
    }

    /// 做出一次决策并写入会话状态，返回本次决策的步号
    pub async fn decide(&self, state: &mut SessionState, registry: &CapabilityRegistry) -> u32 {
        let decision = self.choose(state, registry).await;
        let label = decision.next.label();
        let terminal = decision.next.phase().is_terminal();
        if decision.guardrail.is_some() || decision.next == NextAction::Respond(Phase::GuardrailStopped) {
            tracing::warn!(next = %label, rationale = %decision.rationale, "guardrail decision");
        } else {
            tracing::info!(next = %label, rationale = %decision.rationale, "decision");
        }
        let step = state.apply_decision(decision.next, decision.rationale, decision.guardrail);
        if terminal {
            tracing::info!(step, phase = ?state.phase(), "session reached terminal phase");
        }
        step
    }

    async fn choose(&self, state: &mut SessionState, registry: &CapabilityRegistry) -> Decision {
        let step = state.counters().step_count + 1;
        if let Some(stop) = check_guardrails(state, step) {
            return stop;
        }

        if state.take_fast_path_pending() {
            if let Some(r) = state.last_tool_result().filter(|r| r.ok) {
                return Decision::go(
                    NextAction::Respond(Phase::Answered),
                    format!("REASON → ANSWER (fast path '{}' succeeded)", r.tool),
                );
            }
        }

        if let Some(stop) = check_unrepaired_failure(state) {
            return stop;
        }

        if !state.fast_path_used() {
            if let Some(decision) = self.try_fast_path(state, registry) {
                return decision;
            }
        }

        if state.plan().is_none() {
            self.create_plan(state).await
        } else {
            self.advance_plan(state, registry).await
        }
    }

    fn try_fast_path(&self, state: &mut SessionState, registry: &CapabilityRegistry) -> Option<Decision> {
        let fp = self.fast_path.as_ref()?;
        let call = fp.detect(state.question())?;
        let capability = match registry.get(&call.tool) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "fast path capability missing");
                return None;
            }
        };
        let max_risk = state.guardrails().max_tool_risk;
        if capability.risk != Tier::Low || capability.cost != Tier::Low || capability.risk > max_risk {
            tracing::debug!(tool = %capability.name, "fast path capability not eligible");
            return None;
        }
        if let Some(stop) = check_dispatch_budget(state, &capability.name, capability.latency_ms) {
            return Some(stop);
        }
        state.mark_fast_path();
        let rationale = format!(
            "FAST PATH → EXECUTE ({}): question is a pure arithmetic expression, planning bypassed",
            capability.name
        );
        Some(Decision::go(NextAction::Execute(call), rationale))
    }

    async fn create_plan(&self, state: &mut SessionState) -> Decision {
        let messages = prompts::plan_messages(state);
        let raw = match self.llm.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => return self.degrade(&AgentError::LlmError(e)),
        };
        tracing::debug!(raw = %raw, "plan response");

        let plan = match parse_plan(&raw, state.guardrails().max_plan_len) {
            Ok(plan) => plan,
            Err(e) => return self.degrade(&e),
        };
        let names: Vec<&str> = plan.iter().map(|s| s.as_str()).collect();
        let rationale = format!("PLAN created: [{}]; {}", names.join(", "), explain_plan(&plan, state));
        state.set_plan(plan);
        Decision::go(NextAction::Reason, rationale)
    }

    async fn advance_plan(&self, state: &mut SessionState, registry: &CapabilityRegistry) -> Decision {
        let mut skipped = String::new();
        loop {
            let Some(step) = state.pop_plan_step() else {
                return Decision::go(
                    NextAction::Respond(Phase::Answered),
                    format!("{skipped}PLAN exhausted → ANSWER"),
                );
            };
            let remaining = state.remaining_plan();
            let decision = match step {
                Step::Retrieve => {
                    let c = state.counters();
                    let cap = state.guardrails().retrieve_cap;
                    if c.retrieve_count >= cap {
                        skipped.push_str(&format!(
                            "RETRIEVE skipped: retrieve_cap reached ({}/{cap}); ",
                            c.retrieve_count
                        ));
                        continue;
                    }
                    Decision::go(NextAction::Retrieve, format!("PLAN step → RETRIEVE (remaining={remaining})"))
                }
                Step::Reflect => {
                    Decision::go(NextAction::Reflect, format!("PLAN step → REFLECT (remaining={remaining})"))
                }
                Step::Answer => Decision::go(
                    NextAction::Respond(Phase::Answered),
                    format!("PLAN step → ANSWER (remaining={remaining})"),
                ),
                Step::Execute => match self.resolve_execute(state, registry).await {
                    Ok((call, latency_ms)) => {
                        if let Some(stop) = check_dispatch_budget(state, &call.tool, latency_ms) {
                            stop
                        } else {
                            let tool = call.tool.clone();
                            Decision::go(
                                NextAction::Execute(call),
                                format!("PLAN step → EXECUTE ({tool}) (remaining={remaining})"),
                            )
                        }
                    }
                    Err(e) => self.degrade(&e),
                },
            };
            let mut decision = decision;
            decision.rationale.insert_str(0, &skipped);
            return decision;
        }
    }

    /// EXECUTE 步骤：让认知层从风险过滤、按成本/延迟排序的目录中选出调用，并按契约校验
    async fn resolve_execute(
        &self,
        state: &SessionState,
        registry: &CapabilityRegistry,
    ) -> Result<(ToolCall, u64), AgentError> {
        let max_risk = state.guardrails().max_tool_risk;
        let catalog = registry.ranked(max_risk);
        if catalog.is_empty() {
            return Err(AgentError::NoEligibleCapability(max_risk));
        }

        let messages = prompts::select_tool_messages(state, &catalog);
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        tracing::debug!(raw = %raw, "tool selection response");

        let call = parse_tool_call(&raw)?.ok_or_else(|| {
            AgentError::MalformedControlResponse("no viable action: empty tool name".to_string())
        })?;
        // 失败过的调用只能经由修复提案改写后重试
        if state
            .tool_results()
            .iter()
            .any(|r| !r.ok && r.tool == call.tool && r.input == call.args)
        {
            return Err(AgentError::NoViableRepair(format!(
                "'{}' call repeats an earlier failed call",
                call.tool
            )));
        }
        let capability = registry.get(&call.tool)?;
        if capability.risk > max_risk {
            return Err(AgentError::RiskExceeded {
                tool: capability.name.clone(),
                risk: capability.risk,
                max: max_risk,
            });
        }
        capability
            .input
            .validate(&call.args)
            .map_err(|reason| AgentError::InvalidArguments {
                tool: capability.name.clone(),
                reason,
            })?;
        Ok((call, capability.latency_ms))
    }

    fn degrade(&self, err: &AgentError) -> Decision {
        tracing::warn!(error = %err, "control decision degraded");
        match self.recovery.handle(err) {
            RecoveryAction::RouteToResponder(reason) => Decision::degraded(reason),
            RecoveryAction::Continue | RecoveryAction::ExhaustRepair(_) => Decision::degraded(err),
        }
    }
}

/// 护栏检查（每次决策前）；step 为本次决策的步号
fn check_guardrails(state: &SessionState, step: u32) -> Option<Decision> {
    let g = state.guardrails();
    let c = state.counters();
    if step >= g.max_steps {
        return Some(Decision::stop(Guardrail::MaxSteps, format!("step {step}/{}", g.max_steps)));
    }
    if c.retrieve_count >= g.retrieve_cap && !state.has_plan_steps() {
        return Some(Decision::stop(
            Guardrail::RetrieveCap,
            format!("{}/{} with no plan step left", c.retrieve_count, g.retrieve_cap),
        ));
    }
    if c.tool_fail_count >= g.tool_fail_cap {
        return Some(Decision::stop(
            Guardrail::ToolFailCap,
            format!("{}/{}", c.tool_fail_count, g.tool_fail_cap),
        ));
    }
    if c.tool_call_count >= g.tool_call_cap {
        return Some(Decision::stop(
            Guardrail::ToolCallCap,
            format!("{}/{}", c.tool_call_count, g.tool_call_cap),
        ));
    }
    if c.tool_latency_used_ms >= g.tool_latency_cap_ms {
        return Some(Decision::stop(
            Guardrail::ToolLatencyCap,
            format!("{}/{}ms", c.tool_latency_used_ms, g.tool_latency_cap_ms),
        ));
    }
    None
}

/// 上一步是工具步骤且以 last_error 结束（修复未成功或调用被拒）：不再推进计划，直接交给 Responder
fn check_unrepaired_failure(state: &SessionState) -> Option<Decision> {
    if !matches!(state.next(), NextAction::Execute(_)) {
        return None;
    }
    let err = state.last_error()?;
    let terminal = if state.has_evidence() {
        Phase::Answered
    } else {
        Phase::GuardrailStopped
    };
    Some(Decision::go(
        NextAction::Respond(terminal),
        format!("unrepaired tool failure → ANSWER: {err}"),
    ))
}

/// 派发前的预算检查：这次调用本身也必须装得进调用数与延迟上限
fn check_dispatch_budget(state: &SessionState, tool: &str, latency_ms: u64) -> Option<Decision> {
    let g = state.guardrails();
    let c = state.counters();
    if c.tool_call_count + 1 > g.tool_call_cap {
        return Some(Decision::stop(
            Guardrail::ToolCallCap,
            format!("calling '{tool}' would make {}/{}", c.tool_call_count + 1, g.tool_call_cap),
        ));
    }
    if c.tool_latency_used_ms + latency_ms > g.tool_latency_cap_ms {
        return Some(Decision::stop(
            Guardrail::ToolLatencyCap,
            format!(
                "calling '{tool}' would use {}+{latency_ms}ms of {}ms",
                c.tool_latency_used_ms, g.tool_latency_cap_ms
            ),
        ));
    }
    None
}

/// 计划理由：说明每一步为何在这个位置
fn explain_plan(plan: &[Step], state: &SessionState) -> String {
    let have_knowledge = !state.knowledge().is_empty();
    let reasons: Vec<String> = plan
        .iter()
        .map(|step| match step {
            Step::Retrieve if have_knowledge => "RETRIEVE adds knowledge beyond what is already held".to_string(),
            Step::Retrieve => "RETRIEVE gathers knowledge since none is held yet".to_string(),
            Step::Reflect => "REFLECT reasons over the evidence before acting".to_string(),
            Step::Execute => "EXECUTE computes or acts through a capability".to_string(),
            Step::Answer => "ANSWER synthesizes the reply from gathered evidence".to_string(),
        })
        .collect();
    let mut text = reasons.join(", then ");
    if plan.last() != Some(&Step::Answer) {
        text.push_str("; the session answers once the plan is exhausted");
    }
    text
}

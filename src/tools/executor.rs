//! 工具执行器
//!
//! 按名查找能力、复核风险上限与输入契约，在超时内调用处理器并校验输出；每次真实调用都写入会话状态
//! （ToolResult、计数器、事件）并输出一条 JSON 审计日志。失败时在上限允许的前提下向 Reflector
//! 请求一次修复，并以修复后的调用重试一次；修复同样消耗调用次数与延迟预算。

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::{AgentError, EventKind, RecoveryAction, RecoveryEngine, SessionState, ToolCall, ToolResult};
use crate::react::Reflector;
use crate::tools::CapabilityRegistry;

/// 单次尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    /// 调用前被拒绝（未知能力 / 风险超限 / 参数不合契约），未消耗调用额度
    Rejected,
}

pub struct Executor<'a> {
    registry: &'a CapabilityRegistry,
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a CapabilityRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            recovery: RecoveryEngine::new(),
        }
    }

    /// 执行一次工具步骤：原始调用 + 至多一次修复重试
    pub async fn run(&self, state: &mut SessionState, call: ToolCall, reflector: &Reflector) -> AttemptOutcome {
        let outcome = self.attempt(state, &call, false).await;
        if outcome != AttemptOutcome::Failed {
            return outcome;
        }

        if let Some(reason) = repair_budget_exhausted(state) {
            tracing::warn!(tool = %call.tool, reason = %reason, "repair skipped");
            state.push_event(EventKind::RepairUnavailable { reason });
            return outcome;
        }

        let repair = match reflector.propose_repair(state, &call, self.registry).await {
            Ok(repair) => repair,
            Err(e) => {
                let reason = match self.recovery.handle_repair(&e) {
                    RecoveryAction::ExhaustRepair(reason) => reason,
                    RecoveryAction::RouteToResponder(reason) => reason,
                    RecoveryAction::Continue => e.to_string(),
                };
                tracing::warn!(tool = %call.tool, reason = %reason, "repair unavailable");
                state.push_event(EventKind::RepairUnavailable { reason });
                return outcome;
            }
        };

        // 修复调用的延迟也必须装得进预算
        if let Ok(cap) = self.registry.get(&repair.tool) {
            let counters = state.counters();
            let latency_cap = state.guardrails().tool_latency_cap_ms;
            if counters.tool_latency_used_ms + cap.latency_ms > latency_cap {
                let reason = format!(
                    "repair via '{}' would exceed tool_latency_cap_ms ({} + {} > {})",
                    repair.tool, counters.tool_latency_used_ms, cap.latency_ms, latency_cap
                );
                tracing::warn!(reason = %reason, "repair skipped");
                state.push_event(EventKind::RepairUnavailable { reason });
                return outcome;
            }
        }

        tracing::info!(tool = %repair.tool, "retrying with repair proposal");
        state.push_event(EventKind::RepairProposed {
            tool: repair.tool.clone(),
            args: repair.args.clone(),
        });
        self.attempt(state, &repair, true).await
    }

    /// 单次尝试：复核 → 超时内调用 → 输出校验 → 写入状态与审计日志
    async fn attempt(&self, state: &mut SessionState, call: &ToolCall, repair: bool) -> AttemptOutcome {
        let capability = match self.validate(state, call) {
            Ok(cap) => cap,
            Err(e) => {
                tracing::warn!(tool = %call.tool, error = %e, "tool call rejected");
                state.record_tool_rejected(&call.tool, &e);
                return AttemptOutcome::Rejected;
            }
        };

        let start = Instant::now();
        let result = timeout(self.timeout, capability.handler().execute(&call.args)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (result, outcome) = match result {
            Ok(Ok(r)) if r.ok => match capability.handler().check_output(&r.output) {
                Ok(()) => (r, "ok"),
                Err(e) => (ToolResult::failure(&call.tool, call.args.clone(), e), "invalid_output"),
            },
            Ok(Ok(r)) => (r, "error"),
            Ok(Err(e)) => (
                ToolResult::failure(&call.tool, call.args.clone(), AgentError::ToolExecutionFailed(e).to_string()),
                "error",
            ),
            Err(_) => (
                ToolResult::failure(
                    &call.tool,
                    call.args.clone(),
                    AgentError::ToolTimeout(call.tool.clone()).to_string(),
                ),
                "timeout",
            ),
        };

        let ok = result.ok;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "ok": ok,
            "outcome": outcome,
            "repair": repair,
            "duration_ms": duration_ms,
            "charged_latency_ms": capability.latency_ms,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        state.record_tool_attempt(result, capability.latency_ms, repair);
        if ok {
            AttemptOutcome::Succeeded
        } else {
            AttemptOutcome::Failed
        }
    }

    fn validate(&self, state: &SessionState, call: &ToolCall) -> Result<&'a crate::tools::Capability, AgentError> {
        let capability = self.registry.get(&call.tool)?;
        let max = state.guardrails().max_tool_risk;
        if capability.risk > max {
            return Err(AgentError::RiskExceeded {
                tool: capability.name.clone(),
                risk: capability.risk,
                max,
            });
        }
        capability
            .input
            .validate(&call.args)
            .map_err(|reason| AgentError::InvalidArguments {
                tool: capability.name.clone(),
                reason,
            })?;
        Ok(capability)
    }
}

/// 修复前的上限检查：失败数或调用数已到顶则不再修复
fn repair_budget_exhausted(state: &SessionState) -> Option<String> {
    let c = state.counters();
    let g = state.guardrails();
    if c.tool_fail_count >= g.tool_fail_cap {
        return Some(format!(
            "tool_fail_cap reached ({}/{})",
            c.tool_fail_count, g.tool_fail_cap
        ));
    }
    if c.tool_call_count >= g.tool_call_cap {
        return Some(format!(
            "tool_call_cap reached ({}/{})",
            c.tool_call_count, g.tool_call_cap
        ));
    }
    None
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

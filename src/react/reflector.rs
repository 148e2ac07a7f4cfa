//! Reflector：推理笔记、记忆压缩与修复提议
//!
//! 两项职责都不决定控制流：REFLECT 步骤产出的笔记只进入推理记忆；工具失败时提出一个替代调用，
//! 由 Executor 决定是否采用。提议必须指向已注册、风险不超限、参数满足契约且不同于失败调用的能力，
//! 否则返回 NoViableRepair。

use std::sync::Arc;

use crate::core::{AgentError, EventKind, SessionState, ToolCall};
use crate::llm::LlmClient;
use crate::react::control::parse_tool_call;
use crate::react::prompts;
use crate::tools::CapabilityRegistry;

pub struct Reflector {
    llm: Arc<dyn LlmClient>,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// REFLECT 步骤：写一条笔记，必要时压缩记忆；调用失败不致命
    pub async fn reflect(&self, state: &mut SessionState) {
        let messages = prompts::reflect_messages(state);
        match self.llm.complete(&messages).await {
            Ok(note) => {
                let note = note.trim().to_string();
                let chars = note.chars().count();
                tracing::info!(chars, "reflection note");
                state.memory_mut().push_note(note);
                state.push_event(EventKind::Reflected { ok: true, chars });
            }
            Err(e) => {
                tracing::warn!(error = %e, "reflection failed");
                state.push_event(EventKind::Reflected { ok: false, chars: 0 });
            }
        }
        self.maybe_summarize(state).await;
    }

    async fn maybe_summarize(&self, state: &mut SessionState) {
        let every = state.guardrails().memory_every;
        if !state.memory().due(every) {
            return;
        }
        if state.memory().compressible().is_empty() {
            state.memory_mut().mark_checked();
            return;
        }
        let messages =
            prompts::summarize_messages(state.memory().summary(), state.memory().compressible());
        match self.llm.complete(&messages).await {
            Ok(summary) => {
                let (summarized, kept) = state.memory_mut().compress(summary.trim().to_string());
                tracing::info!(summarized, kept, "memory summarized");
                state.push_event(EventKind::MemorySummarized { summarized, kept });
            }
            Err(e) => tracing::warn!(error = %e, "memory summarization failed, notes kept"),
        }
    }

    /// 针对失败调用提出一个替代调用
    pub async fn propose_repair(
        &self,
        state: &SessionState,
        failed: &ToolCall,
        registry: &CapabilityRegistry,
    ) -> Result<ToolCall, AgentError> {
        let max_risk = state.guardrails().max_tool_risk;
        let catalog = registry.ranked(max_risk);
        if catalog.is_empty() {
            return Err(AgentError::NoViableRepair(format!(
                "no capability under risk ceiling '{max_risk}'"
            )));
        }

        let messages = prompts::repair_messages(state, failed, &catalog);
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        tracing::debug!(raw = %raw, "repair response");

        let proposal = parse_tool_call(&raw)?
            .ok_or_else(|| AgentError::NoViableRepair("cognitive layer declined to repair".into()))?;
        if &proposal == failed {
            return Err(AgentError::NoViableRepair(format!(
                "proposal repeats the failed call to '{}'",
                failed.tool
            )));
        }

        let capability = registry
            .get(&proposal.tool)
            .map_err(|e| AgentError::NoViableRepair(e.to_string()))?;
        if capability.risk > max_risk {
            return Err(AgentError::NoViableRepair(
                AgentError::RiskExceeded {
                    tool: capability.name.clone(),
                    risk: capability.risk,
                    max: max_risk,
                }
                .to_string(),
            ));
        }
        capability.input.validate(&proposal.args).map_err(|reason| {
            AgentError::NoViableRepair(format!("'{}' arguments rejected: {reason}", proposal.tool))
        })?;

        tracing::info!(tool = %proposal.tool, "repair proposed");
        Ok(proposal)
    }
}

//! 会话主循环
//!
//! Reasoner → {Reflector | Retriever | Executor | Responder} → Reasoner，直到进入终态。
//! 单线程、逐步执行：同一时刻只有一个节点在运行，挂起点只在认知层、工具与检索这三类外部调用处。
//! 每次 Reasoner 决策都让 step_count +1，而 max_steps 护栏在决策前检查，因此循环必然在 max_steps 次决策内结束。

use std::sync::Arc;

use tracing::Instrument;

use crate::config::Guardrails;
use crate::core::{AgentError, NextAction, RecoveryAction, RecoveryEngine, SessionState};
use crate::llm::LlmClient;
use crate::react::{FastPath, Reasoner, Reflector, Responder};
use crate::retrieve::Retriever;
use crate::tools::{CapabilityRegistry, Executor};
use crate::trace::{TokenCounts, TraceSnapshot};

/// 默认单次工具调用超时（秒）
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// 会话配置：注册表与检索后端只读借用，护栏在 run 时复制进会话状态
pub struct Session<'a> {
    pub registry: &'a CapabilityRegistry,
    pub llm: Arc<dyn LlmClient>,
    pub retriever: &'a dyn Retriever,
    pub guardrails: Guardrails,
    pub tool_timeout_secs: u64,
    pub fast_path: Option<FastPath>,
}

impl<'a> Session<'a> {
    pub fn new(
        registry: &'a CapabilityRegistry,
        llm: Arc<dyn LlmClient>,
        retriever: &'a dyn Retriever,
    ) -> Self {
        let fast_path = match FastPath::arithmetic() {
            Ok(fp) => Some(fp),
            Err(e) => {
                tracing::warn!(error = %e, "fast path disabled");
                None
            }
        };
        Self {
            registry,
            llm,
            retriever,
            guardrails: Guardrails::default(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            fast_path,
        }
    }

    pub fn with_guardrails(mut self, guardrails: Guardrails) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    /// 关闭或替换快速通道
    pub fn with_fast_path(mut self, fast_path: Option<FastPath>) -> Self {
        self.fast_path = fast_path;
        self
    }

    /// 回答一个问题。只有护栏配置非法时返回 Err；会话内部的错误全部降级为理由与 Responder 路由。
    pub async fn run(&self, question: &str) -> Result<TraceSnapshot, AgentError> {
        self.guardrails.validate()?;

        let usage_before = self.llm.token_usage();
        let state = SessionState::new(question, self.guardrails.clone());
        let span = tracing::info_span!("session", run_id = %state.run_id());
        let mut state = self.drive(state).instrument(span.clone()).await;

        let answer = Responder::respond(&state);
        state.record_answer(&answer);
        let tokens = TokenCounts::between(usage_before, self.llm.token_usage());
        let c = state.counters();
        span.in_scope(|| {
            tracing::info!(
                phase = ?state.phase(),
                steps = c.step_count,
                tool_calls = c.tool_call_count,
                retrievals = c.retrieve_count,
                incomplete = answer.incomplete(),
                tokens = tokens.total,
                "session finished"
            )
        });
        Ok(TraceSnapshot::from_parts(state.into_parts(), answer, tokens))
    }

    /// 决策循环：直到 Reasoner 选择 Respond
    async fn drive(&self, mut state: SessionState) -> SessionState {
        let reasoner = Reasoner::new(self.llm.clone()).with_fast_path(self.fast_path.clone());
        let reflector = Reflector::new(self.llm.clone());
        let executor = Executor::new(self.registry, self.tool_timeout_secs);
        let recovery = RecoveryEngine::new();
        tracing::info!(question = %state.question(), "session started");

        loop {
            reasoner.decide(&mut state, self.registry).await;
            match state.next().clone() {
                NextAction::Reason => continue,
                NextAction::Reflect => reflector.reflect(&mut state).await,
                NextAction::Retrieve => {
                    let result = self.retriever.fetch(state.question(), state.knowledge()).await;
                    if let Err(e) = &result {
                        if recovery.handle(e) == RecoveryAction::Continue {
                            tracing::info!(error = %e, "retrieval unproductive, continuing");
                        }
                    }
                    state.record_retrieval(result);
                }
                NextAction::Execute(call) => {
                    let outcome = executor.run(&mut state, call, &reflector).await;
                    tracing::debug!(?outcome, "executor step finished");
                }
                NextAction::Respond(_) => return state,
            }
        }
    }
}

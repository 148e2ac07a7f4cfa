//! 会话轨迹：只读快照、JSON 导出与控制台渲染
//!
//! 会话结束时把状态整体移交为 TraceSnapshot；此后不再有任何可变状态。导出只写不读回会话，
//! load_trace 返回 serde_json::Value 供离线审计使用。

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;

use crate::config::Guardrails;
use crate::core::state::SessionParts;
use crate::core::{Counters, Event, KnowledgeChunk, Phase, Rationale, ToolResult};
use crate::react::Answer;

#[derive(Debug, Clone, Serialize)]
pub struct TraceSnapshot {
    pub run_id: String,
    pub question: String,
    pub phase: Phase,
    pub answer: Answer,
    pub counters: Counters,
    pub guardrails: Guardrails,
    pub knowledge: Vec<KnowledgeChunk>,
    pub tool_results: Vec<ToolResult>,
    pub last_error: Option<String>,
    pub notes: Vec<String>,
    pub memory_summary: Option<String>,
    pub events: Vec<Event>,
    pub rationale: Vec<Rationale>,
    /// 本次会话消耗的认知层 token（后端不统计时为 0）
    pub token_usage: TokenCounts,
    /// RFC 3339
    pub exported_at: String,
}

/// token 计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenCounts {
    /// 由 LlmClient::token_usage 的前后两次累计值求差
    pub fn between(before: (u64, u64, u64), after: (u64, u64, u64)) -> Self {
        Self {
            prompt: after.0.saturating_sub(before.0),
            completion: after.1.saturating_sub(before.1),
            total: after.2.saturating_sub(before.2),
        }
    }
}

impl TraceSnapshot {
    pub(crate) fn from_parts(parts: SessionParts, answer: Answer, token_usage: TokenCounts) -> Self {
        Self {
            run_id: parts.run_id,
            question: parts.question,
            phase: parts.phase,
            answer,
            counters: parts.counters,
            guardrails: parts.guardrails,
            knowledge: parts.knowledge,
            tool_results: parts.tool_results,
            last_error: parts.last_error,
            notes: parts.memory.notes().to_vec(),
            memory_summary: parts.memory.summary().map(String::from),
            events: parts.events,
            rationale: parts.rationale,
            token_usage,
            exported_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// 计数器与上限对照，如 ("tool_calls", 1, 4)
    pub fn counter_summary(&self) -> Vec<(&'static str, u64, u64)> {
        let c = &self.counters;
        let g = &self.guardrails;
        vec![
            ("steps", c.step_count as u64, g.max_steps as u64),
            ("retrievals", c.retrieve_count as u64, g.retrieve_cap as u64),
            ("tool_calls", c.tool_call_count as u64, g.tool_call_cap as u64),
            ("tool_failures", c.tool_fail_count as u64, g.tool_fail_cap as u64),
            ("tool_latency_ms", c.tool_latency_used_ms, g.tool_latency_cap_ms),
        ]
    }
}

/// 写入 `<dir>/<run_id>.json`；目录不存在时自动创建
pub fn export_trace(snapshot: &TraceSnapshot, dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).with_context(|| format!("create trace dir {}", dir.display()))?;
    let path = dir.join(format!("{}.json", snapshot.run_id));
    std::fs::write(&path, serde_json::to_string_pretty(snapshot)?)
        .with_context(|| format!("write trace {}", path.display()))?;
    tracing::info!(path = %path.display(), "trace exported");
    Ok(path)
}

pub fn load_trace(path: impl AsRef<Path>) -> anyhow::Result<Value> {
    let data = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read trace {}", path.as_ref().display()))?;
    Ok(serde_json::from_str(&data)?)
}

/// 目录下的轨迹文件，最新的在前；目录不存在时返回空
pub fn list_traces(dir: impl AsRef<Path>) -> anyhow::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let modified = std::fs::metadata(&path)?.modified()?;
            files.push((modified, path));
        }
    }
    files.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

/// 控制台报告：问题、答案、逐步理由、计数器
pub fn render(snapshot: &TraceSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Question: {}", snapshot.question);
    let _ = writeln!(out, "Outcome:  {:?}", snapshot.phase);
    let _ = writeln!(out);
    let _ = writeln!(out, "Decisions:");
    for r in &snapshot.rationale {
        let _ = writeln!(out, "  [{}] {}", r.step, r.text);
    }
    if let Some(summary) = &snapshot.memory_summary {
        let _ = writeln!(out);
        let _ = writeln!(out, "Memory: {summary}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Counters:");
    for (name, used, cap) in snapshot.counter_summary() {
        let _ = writeln!(out, "  {name:<16} {used}/{cap}");
    }
    let t = snapshot.token_usage;
    if t.total > 0 {
        let _ = writeln!(
            out,
            "  {:<16} prompt={} completion={} total={}",
            "tokens", t.prompt, t.completion, t.total
        );
    }
    let _ = writeln!(out);
    let flag = if snapshot.answer.incomplete() {
        " (incomplete evidence)"
    } else {
        ""
    };
    let _ = writeln!(out, "Answer{flag}: {}", snapshot.answer.text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NextAction, SessionState};
    use crate::react::{Evidence, Responder};

    fn snapshot() -> TraceSnapshot {
        let mut s = SessionState::new("What is LangGraph?", Guardrails::default());
        s.apply_decision(NextAction::Retrieve, "PLAN step → RETRIEVE (remaining=[ANSWER])".into(), None);
        s.record_retrieval(Ok(vec![KnowledgeChunk::new("LangGraph", "LangGraph is a library.")]));
        s.apply_decision(NextAction::Respond(Phase::Answered), "PLAN step → ANSWER (remaining=[])".into(), None);
        let answer = Responder::respond(&s);
        s.record_answer(&answer);
        TraceSnapshot::from_parts(s.into_parts(), answer, TokenCounts::between((10, 5, 15), (130, 45, 175)))
    }

    #[test]
    fn test_export_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot();
        let path = export_trace(&snap, dir.path().join("runs")).unwrap();
        assert!(path.ends_with(format!("{}.json", snap.run_id)));

        let v = load_trace(&path).unwrap();
        assert_eq!(v["question"], "What is LangGraph?");
        assert_eq!(v["phase"], "ANSWERED");
        assert_eq!(v["answer"]["evidence"], "knowledge");
        assert_eq!(v["events"][0]["type"], "decision");
        assert_eq!(v["events"][0]["payload"]["next"], "RETRIEVE");
        assert_eq!(v["rationale"].as_array().unwrap().len(), 2);

        let listed = list_traces(dir.path().join("runs")).unwrap();
        assert_eq!(listed, vec![path]);
        assert!(list_traces(dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_render_lists_decisions_and_counters() {
        let snap = snapshot();
        assert_eq!(snap.answer.evidence, Evidence::Knowledge);
        let text = render(&snap);
        assert!(text.contains("[1] PLAN step → RETRIEVE"));
        assert!(text.contains("retrievals       1/2"));
        assert!(text.contains("Answer: LangGraph is a library."));
        assert!(text.contains("prompt=120 completion=40 total=160"));
    }

    #[test]
    fn test_token_counts_never_underflow() {
        let t = TokenCounts::between((50, 20, 70), (10, 30, 40));
        assert_eq!(t, TokenCounts { prompt: 0, completion: 10, total: 0 });
    }
}

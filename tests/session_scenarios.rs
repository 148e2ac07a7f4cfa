//! 会话场景集成测试：脚本化认知层驱动完整会话，核对理由、计数器与终态

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use helm::config::Guardrails;
    use helm::core::{EventKind, Guardrail, Phase};
    use helm::llm::{ControlTask, MockLlmClient, ScriptedLlmClient};
    use helm::react::{Evidence, Session};
    use helm::retrieve::KeywordRetriever;
    use helm::tools::{CapabilityRegistry, Tier, WebLookupTool};
    use helm::{default_registry, trace, TraceSnapshot};

    const PLAN_EXECUTE: &str = r#"{"plan": ["EXECUTE", "ANSWER"]}"#;
    const PLAN_RETRIEVE: &str = r#"{"plan": ["RETRIEVE", "ANSWER"]}"#;

    fn call(expression: &str) -> String {
        serde_json::json!({ "tool": "calculator", "args": { "expression": expression } }).to_string()
    }

    async fn run(
        registry: &CapabilityRegistry,
        llm: Arc<ScriptedLlmClient>,
        guardrails: Guardrails,
        question: &str,
    ) -> TraceSnapshot {
        let retriever = KeywordRetriever::default();
        Session::new(registry, llm, &retriever)
            .with_guardrails(guardrails)
            .run(question)
            .await
            .unwrap()
    }

    fn event_names(snap: &TraceSnapshot) -> Vec<&'static str> {
        snap.events.iter().map(|e| e.kind.name()).collect()
    }

    fn last_rationale(snap: &TraceSnapshot) -> &str {
        snap.rationale.last().map(|r| r.text.as_str()).unwrap_or("")
    }

    #[tokio::test]
    async fn test_fast_path_answers_pure_arithmetic_without_planning() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let snap = run(&reg, llm.clone(), Guardrails::default(), "2 + 2").await;

        assert_eq!(snap.phase, Phase::Answered);
        assert_eq!(snap.answer.text, "The result is 4.");
        assert_eq!(snap.answer.evidence, Evidence::ToolResult);
        assert!(!event_names(&snap).contains(&"plan_created"));
        assert!(llm.requests().is_empty());
        assert_eq!(snap.counters.step_count, 2);
        assert!(snap.rationale[0].text.starts_with("FAST PATH → EXECUTE (calculator)"));
        assert_eq!(last_rationale(&snap), "REASON → ANSWER (fast path 'calculator' succeeded)");
    }

    #[tokio::test]
    async fn test_failed_fast_path_routes_to_responder() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"tool": "", "args": {}}"#]));
        let snap = run(&reg, llm.clone(), Guardrails::default(), "1 / 0").await;

        assert_eq!(llm.tasks(), vec![Some(ControlTask::Repair)]);
        assert!(!event_names(&snap).contains(&"plan_created"));
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(snap.counters.tool_call_count, 1);
        assert_eq!(
            last_rationale(&snap),
            "unrepaired tool failure → ANSWER: calculator: division by zero"
        );
        assert!(snap.answer.incomplete());
        assert!(snap.answer.text.contains("Last error: calculator: division by zero"));
        assert!(event_names(&snap).contains(&"repair_unavailable"));
    }

    #[tokio::test]
    async fn test_unrepaired_execute_step_ends_plan() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"plan": ["EXECUTE", "EXECUTE", "ANSWER"]}"#.to_string(),
            call("1 / 0"),
            r#"{"tool": "", "args": {}}"#.to_string(),
        ]));
        let guardrails = Guardrails {
            tool_fail_cap: 3,
            ..Guardrails::default()
        };
        let snap = run(&reg, llm.clone(), guardrails, "Compute one divided by zero").await;

        assert_eq!(llm.remaining(), 0);
        assert_eq!(llm.requests().len(), 3);
        assert_eq!(snap.counters.tool_call_count, 1);
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert!(last_rationale(&snap).starts_with("unrepaired tool failure"));
    }

    #[tokio::test]
    async fn test_deeply_nested_question_is_answered() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let question = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let snap = run(&reg, llm, Guardrails::default(), &question).await;

        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(snap.counters.tool_fail_count, 1);
        assert!(snap.answer.text.contains("expression nested too deeply"));
    }

    #[tokio::test]
    async fn test_failed_call_is_never_reissued() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"plan": ["EXECUTE", "EXECUTE", "ANSWER"]}"#.to_string(),
            call("1 / 0"),
            call("1 / 1"),
            call("1 / 0"),
        ]));
        let snap = run(&reg, llm, Guardrails::default(), "Compute one divided by zero").await;

        assert_eq!(snap.counters.tool_call_count, 2);
        let failed: Vec<_> = snap.tool_results.iter().filter(|r| !r.ok).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert!(last_rationale(&snap).contains("repeats an earlier failed call"));
        assert_eq!(snap.answer.text, "The result is 1.");
    }

    #[tokio::test]
    async fn test_retrieve_cap_stops_when_plan_is_spent() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"plan": ["RETRIEVE", "RETRIEVE"]}"#]));
        let guardrails = Guardrails {
            retrieve_cap: 2,
            ..Guardrails::default()
        };
        let snap = run(&reg, llm, guardrails, "What is LangGraph?").await;

        assert_eq!(snap.counters.retrieve_count, 2);
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(
            last_rationale(&snap),
            "STOP: retrieve_cap reached (2/2 with no plan step left)"
        );
        assert!(snap.events.iter().any(|e| matches!(
            e.kind,
            EventKind::GuardrailTriggered { guardrail: Guardrail::RetrieveCap, .. }
        )));
        assert_eq!(snap.answer.evidence, Evidence::Knowledge);
    }

    #[tokio::test]
    async fn test_retrieval_plan_answers_from_knowledge() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([PLAN_RETRIEVE]));
        let snap = run(&reg, llm, Guardrails::default(), "What is LangGraph?").await;

        assert_eq!(snap.phase, Phase::Answered);
        assert_eq!(snap.counters.retrieve_count, 1);
        assert_eq!(snap.counters.tool_call_count, 0);
        assert_eq!(snap.answer.evidence, Evidence::Knowledge);
        assert!(snap.answer.text.contains("graph-based control flow"));
        let texts: Vec<&str> = snap.rationale.iter().map(|r| r.text.as_str()).collect();
        assert!(texts[0].starts_with("PLAN created: [RETRIEVE, ANSWER]"));
        assert_eq!(texts[1], "PLAN step → RETRIEVE (remaining=[ANSWER])");
        assert_eq!(texts[2], "PLAN step → ANSWER (remaining=[])");
    }

    #[tokio::test]
    async fn test_empty_retrieval_yields_incomplete_answer() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([PLAN_RETRIEVE]));
        let snap = run(&reg, llm, Guardrails::default(), "Tell me about zebras").await;

        assert_eq!(snap.phase, Phase::Answered);
        assert_eq!(snap.counters.retrieve_count, 1);
        assert!(snap.knowledge.is_empty());
        assert!(event_names(&snap).contains(&"retrieve_empty"));
        assert!(snap.answer.incomplete());
        assert!(snap.answer.text.contains("incomplete evidence"));
    }

    #[tokio::test]
    async fn test_repair_recovers_failed_call() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            PLAN_EXECUTE.to_string(),
            call("1 / 0"),
            call("1 / 1"),
        ]));
        let snap = run(&reg, llm.clone(), Guardrails::default(), "Compute one divided by zero").await;

        assert_eq!(
            llm.tasks(),
            vec![
                Some(ControlTask::Plan),
                Some(ControlTask::SelectTool),
                Some(ControlTask::Repair)
            ]
        );
        assert_eq!(snap.phase, Phase::Answered);
        assert_eq!(snap.answer.text, "The result is 1.");
        assert_eq!(snap.counters.tool_call_count, 2);
        assert_eq!(snap.counters.tool_fail_count, 1);
        assert_eq!(snap.counters.tool_latency_used_ms, 10);
        assert_eq!(snap.last_error, None);
        let names = event_names(&snap);
        let failed = names.iter().position(|n| *n == "tool_failed").unwrap();
        let proposed = names.iter().position(|n| *n == "repair_proposed").unwrap();
        let succeeded = names.iter().position(|n| *n == "tool_succeeded").unwrap();
        assert!(failed < proposed && proposed < succeeded);
        assert!(matches!(
            &snap.events[succeeded].kind,
            EventKind::ToolSucceeded { repair: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_fail_cap_one_stops_without_repair() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([PLAN_EXECUTE.to_string(), call("1 / 0")]));
        let guardrails = Guardrails {
            tool_fail_cap: 1,
            ..Guardrails::default()
        };
        let snap = run(&reg, llm.clone(), guardrails, "Compute one divided by zero").await;

        assert_eq!(llm.requests().len(), 2);
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(snap.counters.tool_call_count, 1);
        assert_eq!(snap.counters.tool_fail_count, 1);
        assert_eq!(last_rationale(&snap), "STOP: tool_fail_cap reached (1/1)");
        assert!(snap.answer.incomplete());
        assert!(snap
            .answer
            .text
            .contains("Stopped because: STOP: tool_fail_cap reached (1/1)"));
        assert!(snap.answer.text.contains("Last error: calculator: division by zero"));
        assert!(snap.events.iter().any(|e| matches!(
            e.kind,
            EventKind::GuardrailTriggered { guardrail: Guardrail::ToolFailCap, .. }
        )));
    }

    #[tokio::test]
    async fn test_failed_repair_exhausts_fail_cap() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            PLAN_EXECUTE.to_string(),
            call("1 / 0"),
            call("2 / 0"),
        ]));
        let snap = run(&reg, llm, Guardrails::default(), "Compute one divided by zero").await;

        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(snap.counters.tool_call_count, 2);
        assert_eq!(snap.counters.tool_fail_count, 2);
        assert_eq!(snap.tool_results.len(), 2);
        assert!(snap.tool_results.iter().all(|r| !r.ok));
        assert_eq!(last_rationale(&snap), "STOP: tool_fail_cap reached (2/2)");
    }

    #[tokio::test]
    async fn test_tool_call_cap_blocks_repair() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([PLAN_EXECUTE.to_string(), call("1 / 0")]));
        let guardrails = Guardrails {
            tool_call_cap: 1,
            ..Guardrails::default()
        };
        let snap = run(&reg, llm.clone(), guardrails, "Compute one divided by zero").await;

        assert_eq!(llm.requests().len(), 2);
        assert_eq!(snap.counters.tool_call_count, 1);
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(last_rationale(&snap), "STOP: tool_call_cap reached (1/1)");
    }

    #[tokio::test]
    async fn test_malformed_plan_degrades_to_answer() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(["I would retrieve some documents first."]));
        let snap = run(&reg, llm, Guardrails::default(), "What is LangGraph?").await;

        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(snap.counters.step_count, 1);
        assert!(last_rationale(&snap).starts_with("DEGRADED → ANSWER"));
        assert!(last_rationale(&snap).contains("unparsable"));
        assert!(snap.answer.incomplete());
    }

    #[tokio::test]
    async fn test_unavailable_cognitive_layer_degrades() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()).then_error("connection refused"));
        let snap = run(&reg, llm, Guardrails::default(), "What is LangGraph?").await;

        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert!(last_rationale(&snap).contains("cognitive layer unavailable (connection refused)"));
    }

    #[tokio::test]
    async fn test_risk_ceiling_hides_high_risk_capability() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([PLAN_EXECUTE.to_string(), call("6 * 7")]));
        let snap = run(&reg, llm.clone(), Guardrails::default(), "Compute six times seven").await;

        assert_eq!(snap.answer.text, "The result is 42.");
        let select = &llm.requests()[1];
        assert!(select.iter().any(|m| m.content.contains("calculator")));
        assert!(select.iter().all(|m| !m.content.contains("web_lookup_stub")));
    }

    #[tokio::test]
    async fn test_no_eligible_capability_degrades() {
        let mut reg = CapabilityRegistry::new();
        reg.register(WebLookupTool).unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([PLAN_EXECUTE]));
        let snap = run(&reg, llm.clone(), Guardrails::default(), "Look something up").await;

        assert_eq!(llm.requests().len(), 1);
        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert!(last_rationale(&snap).contains("no capability is allowed under risk ceiling 'medium'"));
        assert_eq!(snap.counters.tool_call_count, 0);
    }

    #[tokio::test]
    async fn test_high_ceiling_allows_web_lookup() {
        let mut reg = CapabilityRegistry::new();
        reg.register(WebLookupTool).unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            PLAN_EXECUTE,
            r#"{"tool": "web_lookup_stub", "args": {"query": "rust"}}"#,
        ]));
        let guardrails = Guardrails {
            max_tool_risk: Tier::High,
            ..Guardrails::default()
        };
        let snap = run(&reg, llm, guardrails, "Look up rust").await;

        assert_eq!(snap.phase, Phase::Answered);
        assert_eq!(snap.counters.tool_latency_used_ms, 2_000);
        assert!(snap.answer.text.contains("Stubbed web lookup"));
    }

    #[tokio::test]
    async fn test_step_cap_terminates_session() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"plan": ["REFLECT", "REFLECT", "REFLECT"]}"#,
            "First I consider what LangGraph is.",
        ]));
        let guardrails = Guardrails {
            max_steps: 3,
            ..Guardrails::default()
        };
        let snap = run(&reg, llm, guardrails, "What is LangGraph?").await;

        assert_eq!(snap.phase, Phase::GuardrailStopped);
        assert_eq!(snap.counters.step_count, 3);
        assert_eq!(last_rationale(&snap), "STOP: max_steps reached (step 3/3)");
        assert_eq!(snap.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_rationale_matches_decisions() {
        let reg = default_registry().unwrap();
        let retriever = KeywordRetriever::default();
        let snap = Session::new(&reg, Arc::new(MockLlmClient), &retriever)
            .run("What is the agent pattern?")
            .await
            .unwrap();

        assert_eq!(snap.rationale.len() as u32, snap.counters.step_count);
        let decisions = snap
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Decision { .. }))
            .count();
        assert_eq!(decisions, snap.rationale.len());
        for (i, r) in snap.rationale.iter().enumerate() {
            assert_eq!(r.step as usize, i + 1);
            assert!(matches!(snap.events[r.decision_event].kind, EventKind::Decision { .. }));
            assert!(r.caused_by.iter().all(|&idx| idx < r.decision_event));
        }
    }

    #[tokio::test]
    async fn test_counters_monotonic_and_within_caps() {
        let reg = default_registry().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"plan": ["RETRIEVE", "EXECUTE", "ANSWER"]}"#.to_string(),
            call("1 / 0"),
            call("3 * 3"),
        ]));
        let guardrails = Guardrails::default();
        let snap = run(&reg, llm, guardrails.clone(), "Compute LangGraph steps times three").await;

        for pair in snap.events.windows(2) {
            let (a, b) = (pair[0].counters, pair[1].counters);
            assert!(a.step_count <= b.step_count);
            assert!(a.retrieve_count <= b.retrieve_count);
            assert!(a.tool_call_count <= b.tool_call_count);
            assert!(a.tool_fail_count <= b.tool_fail_count);
            assert!(a.tool_latency_used_ms <= b.tool_latency_used_ms);
        }
        let c = snap.counters;
        assert!(c.step_count <= guardrails.max_steps);
        assert!(c.retrieve_count <= guardrails.retrieve_cap);
        assert!(c.tool_call_count <= guardrails.tool_call_cap);
        assert!(c.tool_fail_count <= guardrails.tool_fail_cap);
        assert!(c.tool_latency_used_ms <= guardrails.tool_latency_cap_ms);
        assert_eq!(snap.answer.text, "The result is 9.");
    }

    #[tokio::test]
    async fn test_trace_export_round_trip() {
        let reg = default_registry().unwrap();
        let retriever = KeywordRetriever::default();
        let snap = Session::new(&reg, Arc::new(MockLlmClient), &retriever)
            .run("What is 12 * 7?")
            .await
            .unwrap();
        assert_eq!(snap.answer.text, "The result is 84.");

        let dir = tempfile::tempdir().unwrap();
        let path = trace::export_trace(&snap, dir.path()).unwrap();
        let loaded = trace::load_trace(&path).unwrap();
        assert_eq!(loaded["run_id"], snap.run_id.as_str());
        assert_eq!(loaded["answer"]["evidence"], "tool_result");
        assert_eq!(
            loaded["rationale"].as_array().map(|a| a.len()),
            Some(snap.rationale.len())
        );
        assert_eq!(trace::list_traces(dir.path()).unwrap(), vec![path]);

        let report = trace::render(&snap);
        assert!(report.contains("Question: What is 12 * 7?"));
        assert!(report.contains("Answer: The result is 84."));
    }
}

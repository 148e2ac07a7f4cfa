//! 无头运行时：按配置组装 LLM、能力注册表与检索后端，回答单个问题
//!
//! create_llm_from_config 选择认知层后端，default_registry 注册内置能力，
//! answer_question 跑一次完整会话并返回轨迹快照。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::react::Session;
use crate::retrieve::KeywordRetriever;
use crate::tools::{CalculatorTool, CapabilityRegistry, WebLookupTool};
use crate::trace::TraceSnapshot;

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
///
/// provider = "mock" 时始终离线；否则有 DEEPSEEK_API_KEY 走 DeepSeek，有 OPENAI_API_KEY 走 OpenAI 兼容端点，都没有则退回 Mock。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient);
    }
    let timeout = cfg.llm.request_timeout_secs;
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        let client = create_deepseek_client(Some(&model)).with_timeout(timeout);
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(client)
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let client = OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        )
        .with_timeout(timeout);
        tracing::info!("Using OpenAI LLM ({})", client.model());
        Arc::new(client)
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 内置能力：calculator（低风险）与 web_lookup_stub（高风险，默认上限下不可选）
pub fn default_registry() -> Result<CapabilityRegistry, AgentError> {
    let mut registry = CapabilityRegistry::new();
    registry.register(CalculatorTool)?;
    registry.register(WebLookupTool)?;
    Ok(registry)
}

/// 用给定 LLM 跑一次会话
pub async fn answer_with(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    question: &str,
) -> Result<TraceSnapshot, AgentError> {
    let registry = default_registry()?;
    let retriever = KeywordRetriever::default().with_top_k(cfg.retrieval.top_k);
    Session::new(&registry, llm, &retriever)
        .with_guardrails(cfg.guardrails.clone())
        .with_tool_timeout(cfg.tools.tool_timeout_secs)
        .run(question)
        .await
}

/// 按配置选择后端并回答问题
pub async fn answer_question(cfg: &AppConfig, question: &str) -> Result<TraceSnapshot, AgentError> {
    answer_with(cfg, create_llm_from_config(cfg), question).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phase;
    use crate::tools::Tier;

    #[test]
    fn test_default_registry_contents() {
        let reg = default_registry().unwrap();
        assert_eq!(reg.names(), vec!["calculator", "web_lookup_stub"]);
        assert_eq!(reg.list(Tier::Medium).len(), 1);
        assert_eq!(reg.list(Tier::High).len(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_answers_offline() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let snap = answer_question(&cfg, "What is 12 * 7?").await.unwrap();
        assert_eq!(snap.phase, Phase::Answered);
        assert!(snap.answer.text.contains("84"));
    }
}

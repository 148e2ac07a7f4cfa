//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HELM__*` 覆盖（双下划线表示嵌套，如 `HELM__GUARDRAILS__MAX_STEPS=8`）。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::tools::Tier;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub guardrails: Guardrails,
    pub tools: ToolsSection,
    pub retrieval: RetrievalSection,
}

/// [app] 段：应用名、轨迹导出目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_trace_dir")]
    pub trace_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            trace_dir: default_trace_dir(),
        }
    }
}

fn default_trace_dir() -> PathBuf {
    PathBuf::from("./runs")
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；无 API Key 时一律退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: ProviderModelSection,
    #[serde(default)]
    pub openai: ProviderModelSection,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: ProviderModelSection::default(),
            openai: ProviderModelSection::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderModelSection {
    pub model: Option<String>,
}

/// [guardrails] 段：会话创建时固定、之后只读的资源上限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardrails {
    /// Reasoner 决策次数上限（含护栏终止那一次）
    pub max_steps: u32,
    pub retrieve_cap: u32,
    pub tool_fail_cap: u32,
    pub tool_call_cap: u32,
    pub tool_latency_cap_ms: u64,
    /// 可选能力的最高风险等级
    pub max_tool_risk: Tier,
    /// 每积累多少条推理笔记做一次摘要
    pub memory_every: u32,
    /// 计划最多几步
    pub max_plan_len: usize,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_steps: 12,
            retrieve_cap: 2,
            tool_fail_cap: 2,
            tool_call_cap: 4,
            tool_latency_cap_ms: 5_000,
            max_tool_risk: Tier::Medium,
            memory_every: 4,
            max_plan_len: 3,
        }
    }
}

impl Guardrails {
    /// 所有上限必须为正数，否则会话无法保证在有限步内终止
    pub fn validate(&self) -> Result<(), AgentError> {
        let checks: [(&str, u64); 7] = [
            ("max_steps", self.max_steps as u64),
            ("retrieve_cap", self.retrieve_cap as u64),
            ("tool_fail_cap", self.tool_fail_cap as u64),
            ("tool_call_cap", self.tool_call_cap as u64),
            ("tool_latency_cap_ms", self.tool_latency_cap_ms),
            ("memory_every", self.memory_every as u64),
            ("max_plan_len", self.max_plan_len as u64),
        ];
        match checks.iter().find(|(_, v)| *v == 0) {
            Some((name, _)) => Err(AgentError::ConfigError(format!(
                "guardrail '{name}' must be positive"
            ))),
            None => Ok(()),
        }
    }
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [retrieval] 段：每次检索返回的文档数
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    2
}

/// 从 config 目录加载配置，环境变量 HELM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HELM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HELM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

//! 能力注册表
//!
//! 所有工具实现 Tool trait（自描述：名称、描述、输入契约、成本/风险/延迟、执行），
//! 注册为 Capability 后由 CapabilityRegistry 按名查找。注册只在会话创建前进行，会话期间只读。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::{AgentError, ToolResult};
use crate::tools::{InputContract, Tier};

/// 工具 trait：自描述的外部能力
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段，注册表内唯一）
    fn name(&self) -> &str;

    /// 工具描述（供认知层理解功能）
    fn description(&self) -> &str;

    fn input_contract(&self) -> InputContract;

    fn cost(&self) -> Tier;

    fn risk(&self) -> Tier;

    /// 预期延迟（毫秒），用于延迟预算
    fn latency_ms(&self) -> u64;

    /// 输出语义校验：ok=true 但结果不合理时返回 Err
    fn check_output(&self, _output: &Value) -> Result<(), String> {
        Ok(())
    }

    /// 执行工具；Err 与 ok=false 同样视为可恢复的失败
    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolResult, String>;
}

/// 已注册的能力：元数据快照 + 处理器
#[derive(Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub input: InputContract,
    pub cost: Tier,
    pub risk: Tier,
    pub latency_ms: u64,
    handler: Arc<dyn Tool>,
}

impl Capability {
    pub fn from_tool(tool: impl Tool + 'static) -> Self {
        Self::from_arc(Arc::new(tool))
    }

    pub fn from_arc(handler: Arc<dyn Tool>) -> Self {
        Self {
            name: handler.name().to_string(),
            description: handler.description().to_string(),
            input: handler.input_contract(),
            cost: handler.cost(),
            risk: handler.risk(),
            latency_ms: handler.latency_ms(),
            handler,
        }
    }

    pub fn handler(&self) -> &Arc<dyn Tool> {
        &self.handler
    }

    /// 不含处理器的描述，用于 prompt 中的能力目录
    pub fn descriptor(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input.to_json_schema(),
            "cost": self.cost,
            "risk": self.risk,
            "latency_ms": self.latency_ms,
        })
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("cost", &self.cost)
            .field("risk", &self.risk)
            .field("latency_ms", &self.latency_ms)
            .finish()
    }
}

/// 能力注册表：名称唯一，按名称有序存储
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_capability(Capability::from_tool(tool))
    }

    pub fn register_capability(&mut self, capability: Capability) -> Result<(), AgentError> {
        if self.capabilities.contains_key(&capability.name) {
            return Err(AgentError::DuplicateCapability(capability.name));
        }
        tracing::debug!(
            name = %capability.name,
            risk = %capability.risk,
            cost = %capability.cost,
            "capability registered"
        );
        self.capabilities.insert(capability.name.clone(), capability);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Capability, AgentError> {
        self.capabilities
            .get(name)
            .ok_or_else(|| AgentError::UnknownCapability(name.to_string()))
    }

    /// 风险不超过 max_risk 的全部能力（按名称排序）
    pub fn list(&self, max_risk: Tier) -> Vec<&Capability> {
        self.capabilities
            .values()
            .filter(|c| c.risk <= max_risk)
            .collect()
    }

    /// 策略排序：成本低者优先，其次延迟低者，最后按名称
    pub fn ranked(&self, max_risk: Tier) -> Vec<&Capability> {
        let mut caps = self.list(max_risk);
        caps.sort_by(|a, b| {
            (a.cost, a.latency_ms, &a.name).cmp(&(b.cost, b.latency_ms, &b.name))
        });
        caps
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

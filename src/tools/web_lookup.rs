//! Web 查询工具（桩）：不联网，固定返回占位文本
//!
//! 元数据按真实网络搜索声明（高成本、高风险、约 2 秒），用于检验风险上限过滤与延迟预算。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::ToolResult;
use crate::tools::{FieldType, InputContract, Tier, Tool};

pub struct WebLookupTool;

#[async_trait]
impl Tool for WebLookupTool {
    fn name(&self) -> &str {
        "web_lookup_stub"
    }

    fn description(&self) -> &str {
        "Look up information on the web (stubbed; returns placeholder text)."
    }

    fn input_contract(&self) -> InputContract {
        InputContract::new().required("query", FieldType::String, "Search query to look up on the web")
    }

    fn cost(&self) -> Tier {
        Tier::High
    }

    fn risk(&self) -> Tier {
        Tier::High
    }

    fn latency_ms(&self) -> u64 {
        2000
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolResult, String> {
        tracing::info!(query = ?args.get("query"), "web lookup (stub)");
        Ok(ToolResult::success(
            self.name(),
            args.clone(),
            Value::from("Stubbed web lookup: no network enabled."),
        ))
    }
}

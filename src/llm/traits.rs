//! LLM 客户端抽象
//!
//! 控制面只把认知层当作「消息进、文本出」的黑盒：所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 LlmClient。
//! 每个请求的 system 消息都带一行任务标记（`Task: plan` 等），离线后端据此区分请求种类。

use async_trait::async_trait;

use crate::llm::{Message, Role};

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)，默认全 0
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 控制面向认知层发出的请求种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTask {
    Plan,
    SelectTool,
    Repair,
    Reflect,
    Summarize,
}

impl ControlTask {
    const ALL: [ControlTask; 5] = [
        ControlTask::Plan,
        ControlTask::SelectTool,
        ControlTask::Repair,
        ControlTask::Reflect,
        ControlTask::Summarize,
    ];

    pub fn marker(&self) -> &'static str {
        match self {
            ControlTask::Plan => "Task: plan",
            ControlTask::SelectTool => "Task: select_tool",
            ControlTask::Repair => "Task: repair",
            ControlTask::Reflect => "Task: reflect",
            ControlTask::Summarize => "Task: summarize",
        }
    }

    /// 从 system 消息中识别任务标记
    pub fn detect(messages: &[Message]) -> Option<ControlTask> {
        messages
            .iter()
            .filter(|m| m.role == Role::System)
            .find_map(|m| {
                Self::ALL
                    .into_iter()
                    .find(|t| m.content.lines().any(|l| l.trim() == t.marker()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_reads_system_marker_only() {
        let msgs = vec![
            Message::system(format!("You are a planner.\n{}", ControlTask::Plan.marker())),
            Message::user("Task: repair"),
        ];
        assert_eq!(ControlTask::detect(&msgs), Some(ControlTask::Plan));
        assert_eq!(ControlTask::detect(&[Message::user("hi")]), None);
    }
}

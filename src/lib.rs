//! Helm - 策略驱动的问答执行循环
//!
//! 模块划分：
//! - **agent**: 无头运行时（按配置组装 LLM、能力注册表、检索后端）
//! - **config**: 应用配置加载（TOML + 环境变量）与护栏
//! - **core**: 错误与恢复、会话状态、事件与理由日志
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本回放）
//! - **observability**: tracing 初始化
//! - **react**: Reasoner、Reflector、Responder、推理记忆与会话主循环
//! - **retrieve**: 知识检索后端
//! - **tools**: 能力注册表、输入契约与执行器（calculator、web_lookup_stub）
//! - **trace**: 会话轨迹快照、导出与渲染

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod retrieve;
pub mod tools;
pub mod trace;

pub use agent::{answer_question, answer_with, create_llm_from_config, default_registry};
pub use react::Session;
pub use trace::TraceSnapshot;

//! 核心层：错误与恢复、会话状态、事件与理由日志

pub mod error;
pub mod events;
pub mod recovery;
pub mod state;

pub use error::AgentError;
pub use events::{Event, EventKind, Guardrail, Rationale};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use state::{Counters, KnowledgeChunk, NextAction, Phase, SessionState, Step, ToolCall, ToolResult};

//! 控制面：Reasoner 策略、Reflector、Responder、推理记忆与会话主循环

pub mod control;
pub mod fast_path;
pub mod loop_;
pub mod memory;
pub mod prompts;
pub mod reasoner;
pub mod reflector;
pub mod responder;

pub use control::{parse_plan, parse_tool_call};
pub use fast_path::FastPath;
pub use loop_::Session;
pub use memory::ReasoningMemory;
pub use reasoner::{Decision, Reasoner};
pub use reflector::Reflector;
pub use responder::{Answer, Evidence, Responder};

//! 核心层：错误类型、循环状态、会话中断监管

pub mod error;
pub mod session_supervisor;
pub mod state;

pub use error::AgentError;
pub use session_supervisor::SessionSupervisor;
pub use state::LoopState;

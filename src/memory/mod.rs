//! 记忆层：消息模型、会话内对话状态、会话持久化

pub mod conversation;
pub mod persistence;
pub mod session;

pub use conversation::{ConversationState, Message, Role, ToolCallRequest};
pub use persistence::ConversationPersistence;
pub use session::{Session, SessionId};

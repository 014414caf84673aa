//! 会话：id + 独占的 ConversationState
//!
//! 会话之间不共享任何可变状态；ConversationState 只由 Loop Controller 通过 append 修改。

use chrono::{DateTime, Utc};

use crate::core::LoopState;
use crate::memory::{ConversationState, Message};

pub type SessionId = String;

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    conversation: ConversationState,
    state: LoopState,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(format!("session_{}", uuid::Uuid::new_v4()))
    }

    pub fn with_id(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            conversation: ConversationState::new(),
            state: LoopState::Idle,
        }
    }

    /// 从持久化快照恢复（ConversationState 已校验）
    pub fn restore(id: SessionId, created_at: DateTime<Utc>, conversation: ConversationState) -> Self {
        Self {
            id,
            created_at,
            conversation,
            state: LoopState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// 最近一次查询停留的循环状态
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LoopState) {
        self.state = state;
    }

    pub(crate) fn append(&mut self, msg: Message) {
        self.conversation.push(msg);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

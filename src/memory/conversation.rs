//! 对话状态：只追加的消息序列
//!
//! 消息一经创建不可修改，只能追加到末尾；插入顺序即唯一顺序。
//! 配对不变量：每个 ToolCallRequest 在下一次模型调用前必须恰好有一条同 id 的 tool-result。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// tool-result 消息
    Tool,
    /// 仅由 ModelInvoker 临时拼接，不进入 ConversationState
    System,
}

/// 模型发出的单个工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 用于与 tool-result 对应的调用 id
    pub id: String,
    /// 工具名（需与注册表中的名称一致）
    pub name: String,
    /// JSON 参数
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 assistant 消息可携带
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// 仅 tool 消息：指向发起该结果的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// 携带工具调用的 assistant 消息（content 可为空，也可同时带文本）
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 会话内的对话状态：只暴露只读切片，追加仅限 crate 内（Loop Controller）
#[derive(Clone, Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有消息恢复（如持久化加载），恢复前校验配对不变量
    pub fn from_messages(messages: Vec<Message>) -> Result<Self, AgentError> {
        let state = Self { messages };
        state.validate()?;
        Ok(state)
    }

    pub(crate) fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 最近一次工具调用轮中尚未得到结果的请求（按请求顺序）
    pub fn pending_tool_calls(&self) -> Vec<&ToolCallRequest> {
        let Some(idx) = self.messages.iter().rposition(|m| m.role == Role::Assistant) else {
            return Vec::new();
        };
        let resolved: HashSet<&str> = self.messages[idx + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages[idx]
            .tool_calls
            .iter()
            .filter(|tc| !resolved.contains(tc.id.as_str()))
            .collect()
    }

    /// 全量校验配对不变量：
    /// tool-result 必须对应此前尚未解决的请求；请求未全部解决前不能出现新的 user/assistant 消息；
    /// 同一轮内调用 id 不可重复。
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut open: Vec<&str> = Vec::new();
        for (i, msg) in self.messages.iter().enumerate() {
            match msg.role {
                Role::Tool => {
                    let id = msg.tool_call_id.as_deref().ok_or_else(|| {
                        AgentError::Invariant(format!("tool result #{i} has no call id"))
                    })?;
                    let pos = open.iter().position(|o| *o == id).ok_or_else(|| {
                        AgentError::Invariant(format!(
                            "tool result #{i} references unknown or resolved call '{id}'"
                        ))
                    })?;
                    open.remove(pos);
                }
                Role::User | Role::Assistant => {
                    if !open.is_empty() {
                        return Err(AgentError::Invariant(format!(
                            "message #{i} follows unresolved tool calls: {}",
                            open.join(", ")
                        )));
                    }
                    for tc in &msg.tool_calls {
                        if open.contains(&tc.id.as_str()) {
                            return Err(AgentError::Invariant(format!(
                                "duplicate tool call id '{}' in message #{i}",
                                tc.id
                            )));
                        }
                        open.push(&tc.id);
                    }
                }
                Role::System => {
                    return Err(AgentError::Invariant(format!(
                        "system message #{i} stored in transcript"
                    )));
                }
            }
        }
        if open.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Invariant(format!(
                "transcript ends with unresolved tool calls: {}",
                open.join(", ")
            )))
        }
    }
}

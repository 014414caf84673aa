//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：确定性规则，最后一条是用户消息时请求 search_articles，收到工具结果后给出最终回复
//! - ScriptedLlmClient：按脚本依次返回预设回复，并记录每次调用收到的 transcript

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{AssistantTurn, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCallRequest};

/// 确定性 Mock：回复只取决于 transcript 本身
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role != Role::System)
            .ok_or(LlmError::EmptyResponse)?;

        match last.role {
            Role::User if tools.iter().any(|t| t.name == "search_articles") => {
                // id 由 transcript 长度决定，保证同一前缀得到同一回复
                Ok(AssistantTurn::tool_calls(vec![ToolCallRequest::new(
                    format!("mock_call_{}", messages.len()),
                    "search_articles",
                    serde_json::json!({ "query": last.content }),
                )]))
            }
            Role::Tool => Ok(AssistantTurn::text(format!(
                "Mock answer based on tool output: {}",
                last.content
            ))),
            _ => Ok(AssistantTurn::text(format!("Echo from Mock: {}", last.content))),
        }
    }
}

/// 脚本化 Mock：每次 complete 弹出一条预设结果；脚本耗尽时返回 Api 错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<AssistantTurn, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(turns: Vec<AssistantTurn>) -> Self {
        Self {
            script: Mutex::new(turns.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条失败结果（模拟推理服务出错）
    pub fn then_error(self, err: LlmError) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
        self
    }

    /// 每次调用收到的完整消息（含 system）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .script
            .lock()
            .map_err(|e| LlmError::Api(e.to_string()))?
            .pop_front();
        next.unwrap_or_else(|| Err(LlmError::Api("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_spec() -> ToolSpec {
        ToolSpec {
            name: "search_articles".to_string(),
            description: "search".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let client = MockLlmClient;
        let messages = vec![Message::system("sys"), Message::user("statins")];
        let a = client.complete(&messages, &[search_spec()]).await.unwrap();
        let b = client.complete(&messages, &[search_spec()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tool_calls[0].name, "search_articles");
        assert_eq!(a.tool_calls[0].args["query"], "statins");
    }

    #[tokio::test]
    async fn test_mock_without_tools_echoes() {
        let turn = MockLlmClient
            .complete(&[Message::user("hello")], &[])
            .await
            .unwrap();
        assert!(turn.tool_calls.is_empty());
        assert!(turn.content.contains("hello"));
    }

    #[tokio::test]
    async fn test_scripted_pops_in_order_then_errors() {
        let client = ScriptedLlmClient::new(vec![
            AssistantTurn::text("first"),
            AssistantTurn::text("second"),
        ]);
        let msgs = [Message::user("q")];
        assert_eq!(client.complete(&msgs, &[]).await.unwrap().content, "first");
        assert_eq!(client.complete(&msgs, &[]).await.unwrap().content, "second");
        assert!(client.complete(&msgs, &[]).await.is_err());
        assert_eq!(client.call_count(), 3);
    }
}

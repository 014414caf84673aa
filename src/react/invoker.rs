//! Model Invoker：一次模型调用
//!
//! 输入 transcript 与工具声明，前置拼接 system prompt（不写入 ConversationState），
//! 输出一条 assistant 消息（纯文本，或携带工具调用）。推理失败转为 AgentError::Inference，不做内部重试。

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{LlmClient, ToolSpec};
use crate::memory::Message;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a medical research assistant. \
Answer research questions using PubMed: search for relevant articles, fetch their summaries or abstracts, \
and base your answer on what you retrieved. Cite articles by PMID and title. \
If a tool returns an error, adjust the arguments or try another tool.";

/// 持有 LLM 与 system prompt
pub struct ModelInvoker {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl ModelInvoker {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 调用模型；transcript 为空时直接返回 Precondition，不发起请求
    pub async fn invoke(
        &self,
        transcript: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, AgentError> {
        if transcript.is_empty() {
            return Err(AgentError::Precondition(
                "model invoked with an empty transcript".to_string(),
            ));
        }

        let mut full_messages = Vec::with_capacity(transcript.len() + 1);
        if !self.system_prompt.is_empty() {
            full_messages.push(Message::system(self.system_prompt.clone()));
        }
        full_messages.extend_from_slice(transcript);

        let turn = self.llm.complete(&full_messages, tools).await?;

        let mut calls = turn.tool_calls;
        assign_call_ids(&mut calls, transcript.len());
        Ok(Message::assistant_with_tool_calls(turn.content, calls))
    }
}

/// 部分兼容端点不返回 call id 或在同一轮内重复；补齐为轮内唯一的 id
fn assign_call_ids(calls: &mut [crate::memory::ToolCallRequest], turn_index: usize) {
    let mut seen = HashSet::new();
    for (i, call) in calls.iter_mut().enumerate() {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            call.id = format!("call_{turn_index}_{i}");
            seen.insert(call.id.clone());
        }
    }
}

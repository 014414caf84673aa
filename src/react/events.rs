//! 循环过程事件：用于 CLI 等前端展示思考、工具调用、观察与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 第几次模型调用（max_steps 为 None 表示不限）
    StepUpdate { step: usize, max_steps: Option<usize> },
    /// 正在调用 LLM
    Thinking,
    /// 携带工具调用的 assistant 回合中的文本（非最终答案）
    AssistantText { text: String },
    /// 调用工具
    ToolCall {
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        call_id: String,
        tool: String,
        preview: String,
    },
    /// 工具层失败（已作为 tool-result 回填给模型）
    ToolFailure { tool: String, reason: String },
    /// 最终回复结束
    MessageDone,
    /// Token 使用统计（本次查询增量 + 累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        cumulative_total: u64,
    },
    Cancelled,
    /// 错误
    Error { text: String },
}

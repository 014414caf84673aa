//! Agent 错误类型
//!
//! 工具层错误（UnknownTool / InvalidArguments / ToolExecution）由 ToolExecutor 转为 tool-result 内容回填给模型；
//! 推理层错误（Inference）与不变量破坏（Invariant）直接向上传播，结束本轮查询。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// 工具动作本身失败（HTTP 非 2xx、JSON 畸形、缺少字段、超时）
    #[error("Tool {tool} failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("Inference failed: {0}")]
    Inference(#[from] LlmError),

    /// 调用前置条件不满足（如空 transcript 调用模型）
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// transcript 配对不变量被破坏（如 tool-result 找不到对应请求）
    #[error("Transcript invariant violated: {0}")]
    Invariant(String),

    #[error("Step limit reached ({0})")]
    StepLimit(usize),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 稳定的错误类别标签，写入 tool-result 载荷供模型识别
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::UnknownTool(_) => "UnknownToolError",
            AgentError::DuplicateTool(_) => "DuplicateToolError",
            AgentError::InvalidArguments { .. } => "InvalidArgumentsError",
            AgentError::ToolExecution { .. } => "ToolExecutionError",
            AgentError::Inference(_) => "InferenceError",
            AgentError::Precondition(_) => "PreconditionError",
            AgentError::Invariant(_) => "InvariantError",
            AgentError::StepLimit(_) => "StepLimitError",
            AgentError::Cancelled => "Cancelled",
            AgentError::ConfigError(_) => "ConfigError",
        }
    }

    /// 工具层错误的 tool-result 载荷：{"error": {"kind": ..., "message": ...}}
    pub fn to_tool_payload(&self) -> String {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
        .to_string()
    }
}

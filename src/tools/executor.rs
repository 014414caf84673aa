//! 工具执行器（Tool Dispatcher）
//!
//! 持有 ToolRegistry 与全局超时：resolve -> schema 校验 -> 超时内执行 -> 包装为 tool-result 消息。
//! 任何工具层失败（未知工具、参数不合法、执行失败或超时）都转为带 call id 的 tool-result 内容，从不中断循环；
//! 每次调用输出结构化审计日志（JSON）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSpec;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::registry::ToolError;
use crate::tools::schema::validate_args;
use crate::tools::ToolRegistry;

/// 工具执行器：每个 ToolCallRequest 恰好产出一条 tool-result 消息
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    max_result_chars: usize,
    parallel: bool,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout: Duration::from_secs(timeout_secs),
            max_result_chars: 8000,
            parallel: true,
        }
    }

    /// 工具输出超过此字符数时截断
    pub fn with_max_result_chars(mut self, max: usize) -> Self {
        self.max_result_chars = max;
        self
    }

    /// 同一轮多个调用是否并发执行（结果顺序始终与请求顺序一致）
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 分派一轮内的全部调用；返回的消息与 calls 一一对应、顺序一致
    pub async fn dispatch_all(&self, calls: &[ToolCallRequest]) -> Vec<Message> {
        if self.parallel && calls.len() > 1 {
            join_all(calls.iter().map(|c| self.dispatch(c))).await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for call in calls {
                out.push(self.dispatch(call).await);
            }
            out
        }
    }

    /// 分派单个调用：成功时内容为工具输出，失败时内容为 {"error": {...}} 载荷
    pub async fn dispatch(&self, call: &ToolCallRequest) -> Message {
        let start = Instant::now();
        let result = self.execute(call).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(target: "tool_audit", audit = %audit, "tool");

        let content = match result {
            Ok(output) => truncate(output, self.max_result_chars),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                e.to_tool_payload()
            }
        };
        Message::tool_result(call.id.clone(), content)
    }

    /// resolve -> 校验 -> 超时内执行；所有错误均为工具层错误
    async fn execute(&self, call: &ToolCallRequest) -> Result<String, AgentError> {
        let tool = self.registry.resolve(&call.name)?;

        validate_args(&tool.parameters_schema(), &call.args).map_err(|reason| {
            AgentError::InvalidArguments {
                tool: call.name.clone(),
                reason,
            }
        })?;

        // 工具动作 panic 时只影响本次调用
        let action = AssertUnwindSafe(tool.execute(call.args.clone())).catch_unwind();
        match timeout(self.timeout, action).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(ToolError::InvalidArguments(reason)))) => Err(AgentError::InvalidArguments {
                tool: call.name.clone(),
                reason,
            }),
            Ok(Ok(Err(ToolError::Failed(reason)))) => Err(AgentError::ToolExecution {
                tool: call.name.clone(),
                reason,
            }),
            Ok(Err(panic)) => Err(AgentError::ToolExecution {
                tool: call.name.clone(),
                reason: format!("panicked: {}", panic_message(panic.as_ref())),
            }),
            Err(_) => Err(AgentError::ToolExecution {
                tool: call.name.clone(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn truncate(output: String, max_chars: usize) -> String {
    if output.chars().count() > max_chars {
        output.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        output
    }
}

//! Loop Controller：模型调用与工具分派交替的主循环
//!
//! AwaitingModel -> 模型回复无工具调用则追加并进入 Done；有工具调用则追加并进入 DispatchingTools。
//! DispatchingTools -> 分派本轮全部调用，按请求顺序追加 tool-result，回到 AwaitingModel。
//! 每次状态转换前检查取消；提前结束（取消或出错）时为未完成的调用补齐错误结果，transcript 保持配对完整。
//! 可选 event_tx：向 CLI 等前端推送 StepUpdate / ToolCall / Observation / MessageDone 等。

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, LoopState};
use crate::memory::{Message, Session, ToolCallRequest};
use crate::react::{ModelInvoker, ReactEvent};
use crate::tools::ToolExecutor;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单次查询的结果：最终回复与模型调用次数
#[derive(Debug, Clone, PartialEq)]
pub struct ReactResult {
    pub response: String,
    pub steps: usize,
}

/// 循环运行所需组件
pub struct ReactSession<'a> {
    pub invoker: &'a ModelInvoker,
    pub executor: &'a ToolExecutor,
    pub cancel_token: CancellationToken,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
    /// 可选：单次查询最多调用模型的次数
    pub max_steps: Option<usize>,
}

impl<'a> ReactSession<'a> {
    pub fn new(
        invoker: &'a ModelInvoker,
        executor: &'a ToolExecutor,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            executor,
            cancel_token,
            event_tx: None,
            max_steps: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn emit(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 对一条用户输入运行循环，直到模型给出不含工具调用的回复
///
/// 返回后 session.state()：成功为 Done，取消为 Cancelled，其它错误为 Failed。
pub async fn react_loop(
    rs: &ReactSession<'_>,
    session: &mut Session,
    user_input: &str,
) -> Result<ReactResult, AgentError> {
    let result = run(rs, session, user_input).await;
    if let Err(e) = &result {
        resolve_pending(session, e);
    }
    match &result {
        Ok(_) => session.set_state(LoopState::Done),
        Err(AgentError::Cancelled) => session.set_state(LoopState::Cancelled),
        Err(e) => {
            tracing::warn!(session = %session.id(), error = %e, "react loop failed");
            rs.emit(ReactEvent::Error { text: e.to_string() });
            session.set_state(LoopState::Failed);
        }
    }
    debug_assert!(session.state().is_terminal());
    result
}

async fn run(
    rs: &ReactSession<'_>,
    session: &mut Session,
    user_input: &str,
) -> Result<ReactResult, AgentError> {
    ensure_resolved(session)?;

    let specs = rs.executor.specs();
    let (init_prompt, init_completion, _) = rs.invoker.token_usage();

    session.append(Message::user(user_input));

    let mut state = LoopState::AwaitingModel;
    let mut pending: Vec<ToolCallRequest> = Vec::new();
    let mut steps = 0;
    let mut response = String::new();

    loop {
        session.set_state(state);

        if state == LoopState::Done {
            let (cur_prompt, cur_completion, cur_total) = rs.invoker.token_usage();
            let prompt_tokens = cur_prompt.saturating_sub(init_prompt);
            let completion_tokens = cur_completion.saturating_sub(init_completion);
            rs.emit(ReactEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                cumulative_total: cur_total,
            });
            rs.emit(ReactEvent::MessageDone);
            tracing::info!(session = %session.id(), steps, "react loop done");
            return Ok(ReactResult { response, steps });
        }

        if rs.cancel_token.is_cancelled() {
            rs.emit(ReactEvent::Cancelled);
            return Err(AgentError::Cancelled);
        }

        match state {
            LoopState::AwaitingModel => {
                if let Some(max) = rs.max_steps {
                    if steps >= max {
                        return Err(AgentError::StepLimit(max));
                    }
                }
                ensure_resolved(session)?;

                rs.emit(ReactEvent::StepUpdate {
                    step: steps + 1,
                    max_steps: rs.max_steps,
                });
                rs.emit(ReactEvent::Thinking);

                // 模型调用是唯一的挂起点；取消时 transcript 尚未追加任何内容
                let reply = tokio::select! {
                    biased;
                    _ = rs.cancel_token.cancelled() => {
                        rs.emit(ReactEvent::Cancelled);
                        return Err(AgentError::Cancelled);
                    }
                    r = rs.invoker.invoke(session.messages(), &specs) => r?,
                };
                steps += 1;

                if reply.has_tool_calls() {
                    if !reply.content.trim().is_empty() {
                        rs.emit(ReactEvent::AssistantText {
                            text: reply.content.clone(),
                        });
                    }
                    tracing::debug!(step = steps, calls = reply.tool_calls.len(), "model requested tools");
                    pending = reply.tool_calls.clone();
                    session.append(reply);
                    state = LoopState::DispatchingTools;
                } else {
                    response = reply.content.clone();
                    session.append(reply);
                    state = LoopState::Done;
                }
            }
            LoopState::DispatchingTools => {
                for call in &pending {
                    rs.emit(ReactEvent::ToolCall {
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        args: call.args.clone(),
                    });
                }

                let results = rs.executor.dispatch_all(&pending).await;
                check_results(&pending, &results)?;

                for (call, msg) in pending.iter().zip(results) {
                    if let Some(reason) = tool_failure(&msg.content) {
                        rs.emit(ReactEvent::ToolFailure {
                            tool: call.name.clone(),
                            reason,
                        });
                    }
                    rs.emit(ReactEvent::Observation {
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        preview: preview(&msg.content),
                    });
                    session.append(msg);
                }
                pending.clear();
                state = LoopState::AwaitingModel;
            }
            other => {
                return Err(AgentError::Invariant(format!(
                    "loop entered unexpected state {other:?}"
                )))
            }
        }
    }
}

/// 不允许在仍有未解决工具调用时继续向模型提问
fn ensure_resolved(session: &Session) -> Result<(), AgentError> {
    let unresolved = session.conversation().pending_tool_calls();
    if unresolved.is_empty() {
        Ok(())
    } else {
        let ids: Vec<&str> = unresolved.iter().map(|tc| tc.id.as_str()).collect();
        Err(AgentError::Invariant(format!(
            "unresolved tool calls before model call: {}",
            ids.join(", ")
        )))
    }
}

/// 分派结果必须与请求一一对应且顺序一致
fn check_results(pending: &[ToolCallRequest], results: &[Message]) -> Result<(), AgentError> {
    if pending.len() != results.len() {
        return Err(AgentError::Invariant(format!(
            "{} tool calls produced {} results",
            pending.len(),
            results.len()
        )));
    }
    for (call, msg) in pending.iter().zip(results) {
        if msg.tool_call_id.as_deref() != Some(call.id.as_str()) {
            return Err(AgentError::Invariant(format!(
                "tool result {:?} does not match request '{}'",
                msg.tool_call_id, call.id
            )));
        }
    }
    Ok(())
}

/// 提前结束时为尚未得到结果的调用补齐错误载荷，保证 transcript 配对完整、会话可继续使用
fn resolve_pending(session: &mut Session, err: &AgentError) {
    let unresolved: Vec<String> = session
        .conversation()
        .pending_tool_calls()
        .iter()
        .map(|tc| tc.id.clone())
        .collect();
    for id in unresolved {
        session.append(Message::tool_result(id, err.to_tool_payload()));
    }
}

/// 从 tool-result 内容中识别错误载荷
fn tool_failure(content: &str) -> Option<String> {
    let v: Value = serde_json::from_str(content).ok()?;
    let err = v.get("error")?;
    let kind = err.get("kind")?.as_str()?;
    let message = err.get("message").and_then(Value::as_str).unwrap_or_default();
    Some(format!("{kind}: {message}"))
}

fn preview(content: &str) -> String {
    let p: String = content.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if content.chars().count() > OBSERVATION_PREVIEW_CHARS {
        p + "..."
    } else {
        p
    }
}

//! 循环状态机
//!
//! AwaitingModel -> (有工具调用) DispatchingTools -> AwaitingModel -> ... -> (无工具调用) Done。
//! 取消时停在 Cancelled：非 Done 的惰性状态，会话可继续接受下一次查询。

use serde::Serialize;

/// Loop Controller 所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// 尚未运行任何查询
    #[default]
    Idle,
    AwaitingModel,
    DispatchingTools,
    Done,
    Cancelled,
    /// 因推理失败或不变量破坏而中止
    Failed,
}

impl LoopState {
    /// 本轮查询是否已结束（Done / Cancelled / Failed）
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Done | LoopState::Cancelled | LoopState::Failed)
    }
}

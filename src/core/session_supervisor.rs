//! 会话监管：中断管理
//!
//! 持有根 CancellationToken；每次查询领取一个子 token，用户 Ctrl+C 时只取消当前查询，
//! 关闭程序时取消根 token 连带所有子 token。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    root: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为单次查询创建子 token
    pub fn begin_query(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// 关闭会话：取消所有进行中的查询
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_token_is_independent() {
        let supervisor = SessionSupervisor::new();
        let first = supervisor.begin_query();
        first.cancel();
        let second = supervisor.begin_query();
        assert!(!second.is_cancelled());
        assert!(!supervisor.root.is_cancelled());
    }

    #[test]
    fn test_shutdown_cancels_queries() {
        let supervisor = SessionSupervisor::new();
        let token = supervisor.begin_query();
        supervisor.shutdown();
        assert!(token.is_cancelled());
    }
}

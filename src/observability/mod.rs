//! 可观测性：tracing 日志初始化
//!
//! 日志写 stderr，stdout 只留给回复文本；默认 info，可通过 RUST_LOG 覆盖。
//! 工具分派的审计记录使用 target `tool_audit`，可单独过滤（如 `RUST_LOG=tool_audit=info`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局 subscriber；`quiet` 时默认级别降为 warn
pub fn init(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

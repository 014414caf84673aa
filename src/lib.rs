//! MedLit - 基于 PubMed 工具的医学文献问答智能体
//!
//! 模块划分：
//! - **agent**: 运行时装配（LLM、system prompt、工具执行器）与单条消息处理
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、循环状态、会话取消监管
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）
//! - **memory**: 对话 transcript、会话与持久化
//! - **observability**: 日志初始化
//! - **react**: Model Invoker、Loop Controller、过程事件
//! - **tools**: 工具注册表、分派器与 PubMed E-utilities 工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

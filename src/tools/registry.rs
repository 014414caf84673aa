//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 注册表启动时构建一次，之后只读，可被多次、无序地并发查找。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::core::AgentError;
use crate::llm::ToolSpec;

/// 工具动作自身报告的失败
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolError {
    /// 参数虽通过 schema 校验，但语义不合法（如空 pmid 列表）
    #[error("{0}")]
    InvalidArguments(String),
    /// 外部协作方失败（HTTP 错误、响应畸形等）
    #[error("{0}")]
    Failed(String),
}

/// 工具 trait：名称、描述（供 LLM 选择）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（注册表内唯一）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    /// 默认返回空对象，表示无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

type ToolAction = dyn Fn(Value) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync;

/// 以闭包形式提供的工具（name, description, schema, action）
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    action: Box<ToolAction>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        action: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            action: Box::new(move |args| Box::pin(action(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        (self.action)(args).await
    }
}

/// 工具注册表：保留注册顺序（决定向模型声明工具的顺序），按名索引
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具已存在时返回 DuplicateTool
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// 以 (name, description, schema, action) 注册闭包工具
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        action: F,
    ) -> Result<(), AgentError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.register(FnTool::new(name, description, schema, action))
    }

    /// 按名查找；不存在时返回 UnknownTool
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].clone())
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 声明给模型的工具列表（不含执行体）
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_schema() -> Value {
        json!({"type": "object", "properties": {}})
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn("ping", "ping", noop_schema(), |_| async { Ok("pong".to_string()) })
            .unwrap();
        let err = registry
            .register_fn("ping", "again", noop_schema(), |_| async { Ok(String::new()) })
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "ping"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("fetch_fulltext").err().unwrap();
        assert!(matches!(err, AgentError::UnknownTool(_)));
    }

    #[test]
    fn test_specs_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["search_articles", "fetch_summary", "fetch_abstracts"] {
            registry
                .register_fn(name, format!("{name} tool"), noop_schema(), |_| async {
                    Ok(String::new())
                })
                .unwrap();
        }
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["search_articles", "fetch_summary", "fetch_abstracts"]);
    }

    #[tokio::test]
    async fn test_fn_tool_executes() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn("upper", "uppercase text", noop_schema(), |args: Value| async move {
                Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
            })
            .unwrap();
        let tool = registry.resolve("upper").unwrap();
        assert_eq!(tool.execute(json!({"text": "pmid"})).await.unwrap(), "PMID");
    }
}

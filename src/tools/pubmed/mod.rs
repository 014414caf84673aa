//! PubMed 工具集（NCBI E-utilities）
//!
//! search_articles / fetch_summary / fetch_abstracts 共享一个 EutilsClient；
//! 启用哪些工具由配置 [tools].enabled 决定。

pub mod abstracts;
pub mod client;
pub mod search;
pub mod summary;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::registry::ToolError;
use crate::tools::ToolRegistry;

pub use abstracts::FetchAbstractsTool;
pub use client::{EutilsClient, EutilsError, EUTILS_BASE_URL};
pub use search::SearchArticlesTool;
pub use summary::{ArticleSummary, FetchSummaryTool};

pub const SEARCH_ARTICLES: &str = "search_articles";
pub const FETCH_SUMMARY: &str = "fetch_summary";
pub const FETCH_ABSTRACTS: &str = "fetch_abstracts";

/// 默认启用的工具
pub fn default_tools() -> Vec<String> {
    vec![
        SEARCH_ARTICLES.to_string(),
        FETCH_SUMMARY.to_string(),
        FETCH_ABSTRACTS.to_string(),
    ]
}

/// 按名注册 PubMed 工具；出现未知名称或重复名称时报错
pub fn register_pubmed_tools(
    registry: &mut ToolRegistry,
    client: Arc<EutilsClient>,
    enabled: &[String],
) -> Result<(), AgentError> {
    for name in enabled {
        match name.as_str() {
            SEARCH_ARTICLES => registry.register(SearchArticlesTool::new(client.clone()))?,
            FETCH_SUMMARY => registry.register(FetchSummaryTool::new(client.clone()))?,
            FETCH_ABSTRACTS => registry.register(FetchAbstractsTool::new(client.clone()))?,
            other => {
                return Err(AgentError::ConfigError(format!(
                    "unknown tool '{other}' in [tools].enabled"
                )))
            }
        }
    }
    Ok(())
}

/// 将已通过 schema 校验的 JSON 参数反序列化为参数结构体
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

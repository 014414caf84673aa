//! fetch_summary：按 PMID 取文章摘要信息（标题、作者、日期、期刊）

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::pubmed::{parse_args, EutilsClient, FETCH_SUMMARY};
use crate::tools::registry::ToolError;
use crate::tools::schema::tool_parameters;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummaryArgs {
    /// PubMed ID (PMID) of the article
    pub pmid: String,
}

/// esummary 记录的结构化投影
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSummary {
    pub pmid: String,
    pub title: String,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
}

impl ArticleSummary {
    /// 从 esummary 的 result[pmid] 记录构建；缺少 title 视为响应畸形
    pub fn from_record(pmid: &str, record: &Value) -> Result<Self, ToolError> {
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let title = text("title").ok_or_else(|| {
            ToolError::Failed(format!("missing key 'title' in summary for {pmid}"))
        })?;
        let authors = record
            .get("authors")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            pmid: pmid.to_string(),
            title,
            abstract_text: text("abstract"),
            authors,
            pubdate: text("pubdate"),
            journal: text("fulljournalname").or_else(|| text("source")),
        })
    }
}

pub struct FetchSummaryTool {
    client: Arc<EutilsClient>,
}

impl FetchSummaryTool {
    pub fn new(client: Arc<EutilsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for FetchSummaryTool {
    fn name(&self) -> &str {
        FETCH_SUMMARY
    }

    fn description(&self) -> &str {
        "Fetch the summary of a PubMed article by PMID. Returns a JSON object with title, authors, pubdate, journal and abstract when available."
    }

    fn parameters_schema(&self) -> Value {
        tool_parameters::<SummaryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: SummaryArgs = parse_args(args)?;
        let pmid = args.pmid.trim();
        if pmid.is_empty() {
            return Err(ToolError::InvalidArguments("pmid must not be empty".to_string()));
        }
        let record = self
            .client
            .esummary(pmid)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        let summary = ArticleSummary::from_record(pmid, &record)?;
        serde_json::to_string(&summary).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

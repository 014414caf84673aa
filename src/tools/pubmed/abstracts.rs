//! fetch_abstracts：efetch 批量获取摘要原文

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::pubmed::{parse_args, EutilsClient, FETCH_ABSTRACTS};
use crate::tools::registry::ToolError;
use crate::tools::schema::tool_parameters;
use crate::tools::Tool;

const RETMODES: [&str; 2] = ["text", "xml"];
const RETTYPES: [&str; 3] = ["abstract", "medline", "full"];

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AbstractsArgs {
    /// PubMed IDs (PMIDs) to fetch
    pub pmids: Vec<String>,
    /// Output format: "text" (default) or "xml"
    pub retmode: Option<String>,
    /// Record type: "abstract" (default), "medline" or "full"
    pub rettype: Option<String>,
}

pub struct FetchAbstractsTool {
    client: Arc<EutilsClient>,
}

impl FetchAbstractsTool {
    pub fn new(client: Arc<EutilsClient>) -> Self {
        Self { client }
    }
}

fn pick<'a>(value: Option<&'a str>, allowed: &[&'a str], field: &str) -> Result<&'a str, ToolError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(allowed[0]),
        Some(v) if allowed.contains(&v) => Ok(v),
        Some(v) => Err(ToolError::InvalidArguments(format!(
            "{field} must be one of {}, got '{v}'",
            allowed.join(", ")
        ))),
    }
}

#[async_trait]
impl Tool for FetchAbstractsTool {
    fn name(&self) -> &str {
        FETCH_ABSTRACTS
    }

    fn description(&self) -> &str {
        "Fetch PubMed records (abstracts by default) for a list of PMIDs using EFetch. Returns the raw record text."
    }

    fn parameters_schema(&self) -> Value {
        tool_parameters::<AbstractsArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: AbstractsArgs = parse_args(args)?;
        let pmids: Vec<String> = args
            .pmids
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if pmids.is_empty() {
            return Err(ToolError::InvalidArguments("pmids must not be empty".to_string()));
        }
        let retmode = pick(args.retmode.as_deref(), &RETMODES, "retmode")?;
        let rettype = pick(args.rettype.as_deref(), &RETTYPES, "rettype")?;

        tracing::info!(count = pmids.len(), retmode, rettype, "pubmed efetch");
        self.client
            .efetch(&pmids, retmode, rettype)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_defaults_and_validates() {
        assert_eq!(pick(None, &RETMODES, "retmode").unwrap(), "text");
        assert_eq!(pick(Some(" "), &RETTYPES, "rettype").unwrap(), "abstract");
        assert_eq!(pick(Some("xml"), &RETMODES, "retmode").unwrap(), "xml");
        assert!(matches!(
            pick(Some("pdf"), &RETMODES, "retmode"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_pmids_rejected_before_request() {
        let client = Arc::new(EutilsClient::new("http://127.0.0.1:1", "pubmed", None, 3, 1));
        let tool = FetchAbstractsTool::new(client);
        let err = tool
            .execute(serde_json::json!({"pmids": ["", "  "]}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}

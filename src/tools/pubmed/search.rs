//! search_articles：按检索式返回前 N 个 PMID

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::pubmed::{parse_args, EutilsClient, SEARCH_ARTICLES};
use crate::tools::registry::ToolError;
use crate::tools::schema::tool_parameters;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// PubMed search query: keywords, MeSH terms, author names or any valid PubMed search syntax
    pub query: String,
}

pub struct SearchArticlesTool {
    client: Arc<EutilsClient>,
    description: String,
}

impl SearchArticlesTool {
    pub fn new(client: Arc<EutilsClient>) -> Self {
        let description = format!(
            "Search PubMed for articles matching a query. Returns a JSON array with the PubMed IDs (PMIDs) of the top {} matching articles.",
            client.retmax()
        );
        Self {
            client,
            description,
        }
    }
}

#[async_trait]
impl Tool for SearchArticlesTool {
    fn name(&self) -> &str {
        SEARCH_ARTICLES
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        tool_parameters::<SearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        tracing::info!(query = %query, "pubmed search");
        let ids = self
            .client
            .esearch(query)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        serde_json::to_string(&ids).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

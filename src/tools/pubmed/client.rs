//! NCBI E-utilities HTTP 客户端
//!
//! esearch / esummary / efetch 各为一次 GET，查询参数带 db、标识字段、retmode 与 api_key（未配置时省略）。
//! 非 2xx、JSON 畸形、缺少预期键都转为 EutilsError，由工具层转成 tool-result 错误载荷。

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::config::PubmedSection;

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

/// 错误体预览最大字符数
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum EutilsError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("missing key '{key}' in {endpoint} response")]
    MissingKey { endpoint: String, key: String },
}

/// E-utilities 客户端：base_url / db / api_key / retmax 来自配置
#[derive(Debug, Clone)]
pub struct EutilsClient {
    http: Client,
    base_url: String,
    db: String,
    api_key: Option<String>,
    retmax: u32,
}

impl EutilsClient {
    pub fn new(
        base_url: impl Into<String>,
        db: impl Into<String>,
        api_key: Option<String>,
        retmax: u32,
        timeout_secs: u64,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("medlit/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
            db: db.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            retmax,
        }
    }

    /// 从 [pubmed] 配置段构建；api_key 未配置时回退到环境变量 PUBMED_KEY
    pub fn from_config(cfg: &PubmedSection) -> Self {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("PUBMED_KEY").ok());
        Self::new(
            cfg.base_url.clone(),
            cfg.db.clone(),
            api_key,
            cfg.retmax,
            cfg.timeout_secs,
        )
    }

    pub fn retmax(&self) -> u32 {
        self.retmax
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, EutilsError> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
        query.push(("db", self.db.clone()));
        query.extend(params.iter().cloned());
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }

        tracing::debug!(endpoint = %endpoint, "eutils request");
        let resp = self
            .http
            .get(self.url(endpoint))
            .query(&query)
            .send()
            .await
            .map_err(|source| EutilsError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EutilsError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
            });
        }

        resp.text().await.map_err(|source| EutilsError::Request {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    /// esearch：返回前 retmax 个 PMID
    pub async fn esearch(&self, term: &str) -> Result<Vec<String>, EutilsError> {
        let endpoint = "esearch.fcgi";
        let body = self
            .get(
                endpoint,
                &[
                    ("term", term.to_string()),
                    ("retmode", "json".to_string()),
                    ("retmax", self.retmax.to_string()),
                ],
            )
            .await?;
        parse_esearch(&parse_json(endpoint, &body)?)
    }

    /// esummary：返回 result[pmid] 记录
    pub async fn esummary(&self, pmid: &str) -> Result<Value, EutilsError> {
        let endpoint = "esummary.fcgi";
        let body = self
            .get(
                endpoint,
                &[("id", pmid.to_string()), ("retmode", "json".to_string())],
            )
            .await?;
        parse_esummary(&parse_json(endpoint, &body)?, pmid)
    }

    /// efetch：返回原始文本（多个 id 以逗号拼接）
    pub async fn efetch(
        &self,
        pmids: &[String],
        retmode: &str,
        rettype: &str,
    ) -> Result<String, EutilsError> {
        self.get(
            "efetch.fcgi",
            &[
                ("id", pmids.join(",")),
                ("retmode", retmode.to_string()),
                ("rettype", rettype.to_string()),
            ],
        )
        .await
    }
}

fn parse_json(endpoint: &str, body: &str) -> Result<Value, EutilsError> {
    serde_json::from_str(body).map_err(|e| EutilsError::Malformed {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

/// 从 esearch 响应提取 esearchresult.idlist
pub fn parse_esearch(v: &Value) -> Result<Vec<String>, EutilsError> {
    let endpoint = "esearch.fcgi";
    let result = v.get("esearchresult").ok_or_else(|| EutilsError::MissingKey {
        endpoint: endpoint.to_string(),
        key: "esearchresult".to_string(),
    })?;
    if let Some(err) = result.get("ERROR").and_then(Value::as_str) {
        return Err(EutilsError::Malformed {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        });
    }
    let ids = result
        .get("idlist")
        .and_then(Value::as_array)
        .ok_or_else(|| EutilsError::MissingKey {
            endpoint: endpoint.to_string(),
            key: "esearchresult.idlist".to_string(),
        })?;
    Ok(ids
        .iter()
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect())
}

/// 从 esummary 响应提取 result[pmid]；记录自带 error 字段（如无效 PMID）时视为失败
pub fn parse_esummary(v: &Value, pmid: &str) -> Result<Value, EutilsError> {
    let endpoint = "esummary.fcgi";
    let record = v
        .get("result")
        .and_then(|r| r.get(pmid))
        .ok_or_else(|| EutilsError::MissingKey {
            endpoint: endpoint.to_string(),
            key: format!("result.{pmid}"),
        })?;
    if let Some(err) = record.get("error").and_then(Value::as_str) {
        return Err(EutilsError::Malformed {
            endpoint: endpoint.to_string(),
            reason: format!("{pmid}: {err}"),
        });
    }
    Ok(record.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_esearch() {
        let v = json!({
            "header": {"type": "esearch", "version": "0.3"},
            "esearchresult": {
                "count": "15234",
                "retmax": "3",
                "idlist": ["34345882", "34596608", "35148837"]
            }
        });
        assert_eq!(
            parse_esearch(&v).unwrap(),
            vec!["34345882", "34596608", "35148837"]
        );
    }

    #[test]
    fn test_parse_esearch_missing_idlist() {
        let err = parse_esearch(&json!({"esearchresult": {"count": "0"}})).unwrap_err();
        assert!(matches!(err, EutilsError::MissingKey { ref key, .. } if key == "esearchresult.idlist"));
        assert!(parse_esearch(&json!({})).is_err());
    }

    #[test]
    fn test_parse_esearch_reports_service_error() {
        let v = json!({"esearchresult": {"ERROR": "Invalid query"}});
        assert!(matches!(parse_esearch(&v), Err(EutilsError::Malformed { .. })));
    }

    #[test]
    fn test_parse_esummary() {
        let v = json!({
            "result": {
                "uids": ["34345882"],
                "34345882": {"uid": "34345882", "title": "Effectiveness"}
            }
        });
        assert_eq!(parse_esummary(&v, "34345882").unwrap()["title"], "Effectiveness");
        assert!(parse_esummary(&v, "1").is_err());
    }

    #[test]
    fn test_parse_esummary_record_error() {
        let v = json!({"result": {"uids": [], "999": {"uid": "999", "error": "cannot get document summary"}}});
        assert!(matches!(parse_esummary(&v, "999"), Err(EutilsError::Malformed { .. })));
    }

    #[test]
    fn test_url_joins_base_and_endpoint() {
        let with_slash = EutilsClient::new(EUTILS_BASE_URL, "pubmed", None, 3, 5);
        let without = EutilsClient::new("http://localhost:9/eutils", "pubmed", Some(" ".into()), 3, 5);
        assert_eq!(
            with_slash.url("esearch.fcgi"),
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"
        );
        assert_eq!(without.url("efetch.fcgi"), "http://localhost:9/eutils/efetch.fcgi");
        assert!(without.api_key.is_none());
    }
}

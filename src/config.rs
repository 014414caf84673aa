//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MEDLIT__*` 覆盖（双下划线表示嵌套，如 `MEDLIT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::tools::pubmed::{default_tools, EUTILS_BASE_URL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub pubmed: PubmedSection,
}

impl AppConfig {
    /// 启动前的配置检查；错误在装配阶段报出，而不是第一次查询时
    pub fn validate(&self) -> Result<(), AgentError> {
        let provider = self.llm.provider.to_lowercase();
        if !["gemini", "openai", "mock"].contains(&provider.as_str()) {
            return Err(AgentError::ConfigError(format!(
                "unknown llm provider '{}'",
                self.llm.provider
            )));
        }
        if self.app.max_steps == Some(0) {
            return Err(AgentError::ConfigError("app.max_steps must be at least 1".into()));
        }
        if self.llm.timeouts.request == 0 {
            return Err(AgentError::ConfigError("llm.timeouts.request must be positive".into()));
        }
        if self.pubmed.timeout_secs == 0 {
            return Err(AgentError::ConfigError("pubmed.timeout_secs must be positive".into()));
        }
        if self.tools.tool_timeout_secs == 0 {
            return Err(AgentError::ConfigError("tools.tool_timeout_secs must be positive".into()));
        }
        if self.tools.max_result_chars == 0 {
            return Err(AgentError::ConfigError("tools.max_result_chars must be positive".into()));
        }
        if self.pubmed.retmax == 0 {
            return Err(AgentError::ConfigError("pubmed.retmax must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.tools.enabled {
            if !seen.insert(name.as_str()) {
                return Err(AgentError::ConfigError(format!(
                    "tool '{name}' listed twice in tools.enabled"
                )));
            }
        }
        Ok(())
    }
}

/// [app] 段：应用名、会话保存目录、单次查询的模型调用上限
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 设置后每轮结束把会话写入 {session_dir}/{id}.json，启动时按 id 恢复
    pub session_dir: Option<PathBuf>,
    /// 单次查询最多调用模型的次数；未设置时不限
    pub max_steps: Option<usize>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：gemini / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 未设置时按后端取默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    /// 覆盖内置 system prompt
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            system_prompt: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.0)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [tools] 段：启用的工具、工具超时、输出截断、是否并发分派
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tools")]
    pub enabled: Vec<String>,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            enabled: default_tools(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_result_chars: default_max_result_chars(),
            parallel: default_parallel(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_result_chars() -> usize {
    8000
}

fn default_parallel() -> bool {
    true
}

/// [pubmed] 段：E-utilities 端点与检索参数
#[derive(Debug, Clone, Deserialize)]
pub struct PubmedSection {
    #[serde(default = "default_eutils_base_url")]
    pub base_url: String,
    #[serde(default = "default_db")]
    pub db: String,
    /// esearch 返回的 PMID 个数
    #[serde(default = "default_retmax")]
    pub retmax: u32,
    #[serde(default = "default_pubmed_timeout_secs")]
    pub timeout_secs: u64,
    /// 未设置时读取环境变量 PUBMED_KEY
    pub api_key: Option<String>,
}

impl Default for PubmedSection {
    fn default() -> Self {
        Self {
            base_url: default_eutils_base_url(),
            db: default_db(),
            retmax: default_retmax(),
            timeout_secs: default_pubmed_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_eutils_base_url() -> String {
    EUTILS_BASE_URL.to_string()
}

fn default_db() -> String {
    "pubmed".to_string()
}

fn default_retmax() -> u32 {
    3
}

fn default_pubmed_timeout_secs() -> u64 {
    15
}

/// 从 config 目录加载配置，环境变量 MEDLIT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MEDLIT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignored");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MEDLIT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("tools.enabled")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.pubmed.retmax, 3);
        assert_eq!(cfg.pubmed.db, "pubmed");
        assert_eq!(cfg.tools.enabled, default_tools());
        assert!(cfg.app.max_steps.is_none());
    }

    #[test]
    fn test_validate() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.app.max_steps = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.tools.enabled.push("search_articles".to_string());
        assert!(matches!(cfg.validate(), Err(AgentError::ConfigError(_))));

        let mut cfg = AppConfig::default();
        cfg.llm.timeouts.request = 0;
        assert!(matches!(cfg.validate(), Err(AgentError::ConfigError(_))));

        let mut cfg = AppConfig::default();
        cfg.pubmed.timeout_secs = 0;
        assert!(matches!(cfg.validate(), Err(AgentError::ConfigError(_))));

        let mut cfg = AppConfig::default();
        cfg.tools.tool_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.llm.provider = "OpenAI".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medlit.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "mock"

[tools]
enabled = ["search_articles"]

[pubmed]
retmax = 5
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.tools.enabled, vec!["search_articles"]);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.pubmed.retmax, 5);
        assert_eq!(cfg.pubmed.base_url, EUTILS_BASE_URL);
    }
}

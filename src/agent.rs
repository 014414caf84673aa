//! Agent 运行时装配
//!
//! create_agent_components 按配置构建 ModelInvoker（LLM + system prompt）与 ToolExecutor（PubMed 工具），
//! process_message 对单条用户输入跑一次循环并返回最终回复。CLI 与集成测试共用这里的装配逻辑。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{gemini, LlmClient, MockLlmClient, OpenAiClient, GEMINI_FLASH};
use crate::memory::Session;
use crate::react::{react_loop, ModelInvoker, ReactEvent, ReactResult, ReactSession, DEFAULT_SYSTEM_PROMPT};
use crate::tools::{register_pubmed_tools, EutilsClient, ToolExecutor, ToolRegistry};

/// 预构建的 Agent 组件，可被多个会话共享
pub struct AgentComponents {
    pub invoker: ModelInvoker,
    pub executor: ToolExecutor,
    /// 单次查询最多调用模型的次数；None 表示不限
    pub max_steps: Option<usize>,
}

/// 按 [llm].provider 创建 LLM 客户端
///
/// - gemini：需要 GEMINI_API_KEY 或 GOOGLE_API_KEY
/// - openai：读取 OPENAI_API_KEY，可配合 base_url 指向任意兼容端点
/// - mock：离线确定性客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;

    match provider.as_str() {
        "gemini" => {
            let model = cfg.llm.model.as_deref().unwrap_or(GEMINI_FLASH);
            let client = match cfg.llm.base_url.as_deref() {
                Some(base) => gemini::gemini_api_key()
                    .map(|key| OpenAiClient::new(Some(base), model, Some(key.as_str()))),
                None => gemini::create_gemini_client(Some(model)),
            }
            .ok_or_else(|| {
                AgentError::ConfigError(
                    "provider 'gemini' requires GEMINI_API_KEY or GOOGLE_API_KEY".to_string(),
                )
            })?;
            tracing::info!("Using Gemini LLM ({})", model);
            Ok(Arc::new(
                client
                    .with_temperature(cfg.llm.temperature)
                    .with_request_timeout(timeout),
            ))
        }
        "openai" => {
            let model = cfg.llm.model.as_deref().unwrap_or("gpt-4o-mini");
            let key = std::env::var("OPENAI_API_KEY").ok();
            if key.is_none() {
                tracing::warn!("OPENAI_API_KEY not set, requests may be rejected");
            }
            tracing::info!("Using OpenAI LLM ({})", model);
            Ok(Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), model, key.as_deref())
                    .with_temperature(cfg.llm.temperature)
                    .with_request_timeout(timeout),
            ))
        }
        "mock" => {
            tracing::info!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider '{other}' (expected gemini, openai or mock)"
        ))),
    }
}

/// system prompt：配置覆盖 > config/prompts/system.txt > 内置默认
pub fn load_system_prompt(cfg: &AppConfig) -> String {
    if let Some(p) = cfg.llm.system_prompt.as_ref().filter(|p| !p.trim().is_empty()) {
        return p.clone();
    }
    ["config/prompts/system.txt", "../config/prompts/system.txt"]
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 按配置构建工具注册表与执行器
pub fn create_executor(cfg: &AppConfig) -> Result<ToolExecutor, AgentError> {
    let client = Arc::new(EutilsClient::from_config(&cfg.pubmed));
    let mut registry = ToolRegistry::new();
    register_pubmed_tools(&mut registry, client, &cfg.tools.enabled)?;
    Ok(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs)
        .with_max_result_chars(cfg.tools.max_result_chars)
        .with_parallel(cfg.tools.parallel))
}

/// 创建 Agent 组件
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    cfg.validate()?;
    let llm = create_llm_from_config(cfg)?;
    let executor = create_executor(cfg)?;
    tracing::info!(tools = ?executor.tool_names(), "tools registered");
    Ok(AgentComponents {
        invoker: ModelInvoker::new(llm, load_system_prompt(cfg)),
        executor,
        max_steps: cfg.app.max_steps,
    })
}

/// 处理单条用户消息：跑一次循环，返回最终回复与模型调用次数
pub async fn process_message(
    components: &AgentComponents,
    session: &mut Session,
    user_input: &str,
    cancel_token: CancellationToken,
    event_tx: Option<&mpsc::UnboundedSender<ReactEvent>>,
) -> Result<ReactResult, AgentError> {
    let mut rs = ReactSession::new(&components.invoker, &components.executor, cancel_token)
        .with_max_steps(components.max_steps);
    if let Some(tx) = event_tx {
        rs = rs.with_event_tx(tx);
    }
    react_loop(&rs, session, user_input).await
}

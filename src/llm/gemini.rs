//! Gemini 客户端（经 Google 提供的 OpenAI 兼容端点）
//!
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai/
//! - 默认模型: gemini-2.0-flash

use crate::llm::OpenAiClient;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const GEMINI_FLASH: &str = "gemini-2.0-flash";

/// 读取 Gemini API Key：GEMINI_API_KEY 优先，其次 GOOGLE_API_KEY
pub fn gemini_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
}

/// 创建 Gemini 客户端
///
/// - 模型可通过 `model` 参数或 `GEMINI_MODEL` 环境变量指定，默认 gemini-2.0-flash
/// - 未找到 API Key 时返回 None，由调用方决定报错或回退
pub fn create_gemini_client(model: Option<&str>) -> Option<OpenAiClient> {
    let api_key = gemini_api_key()?;

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("GEMINI_MODEL").ok())
        .unwrap_or_else(|| GEMINI_FLASH.to_string());

    Some(OpenAiClient::new(
        Some(GEMINI_BASE_URL),
        &model,
        Some(api_key.as_str()),
    ))
}

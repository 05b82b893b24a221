//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! DeepSeek 提供与 OpenAI 完全兼容的 API 接口。
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use std::time::Duration;

use crate::llm::OpenAiGenerationClient;

/// DeepSeek API 常量
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端
///
/// 优先使用环境变量 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`；都没有时首次调用报 MissingCredential。
pub fn create_deepseek_client(base_url: Option<&str>, request_timeout: Duration) -> OpenAiGenerationClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    OpenAiGenerationClient::new(
        Some(base_url.unwrap_or(DEEPSEEK_BASE_URL)),
        api_key,
        "DEEPSEEK_API_KEY",
        request_timeout,
    )
}

//! OpenAI 兼容 API 生成客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! API Key 缺失时不回退到占位 Key，而是在第一次调用时返回 MissingCredential。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat as ChatResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{GenerationClient, GenerationRequest, LlmError, ResponseFormat};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：模型由每次请求指定
pub struct OpenAiGenerationClient {
    client: Option<Client<OpenAIConfig>>,
    /// 缺失时报告的环境变量名
    credential_name: String,
    request_timeout: Duration,
    pub usage: TokenUsage,
}

impl OpenAiGenerationClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        credential_name: &str,
        request_timeout: Duration,
    ) -> Self {
        let client = api_key.filter(|k| !k.trim().is_empty()).map(|key| {
            let config = match base_url {
                Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(key),
                None => OpenAIConfig::new().with_api_key(key),
            };
            Client::with_config(config)
        });
        if client.is_none() {
            tracing::warn!("{} is not set; model calls will fail", credential_name);
        }
        Self {
            client,
            credential_name: credential_name.to_string(),
            request_timeout,
            usage: TokenUsage::new(),
        }
    }

    /// 从环境变量 OPENAI_API_KEY 读取 Key
    pub fn from_env(base_url: Option<&str>, request_timeout: Duration) -> Self {
        Self::new(
            base_url,
            std::env::var("OPENAI_API_KEY").ok(),
            "OPENAI_API_KEY",
            request_timeout,
        )
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

/// SDK 错误 → LlmError：优先看 API 错误的 code/type 与传输层状态，最后才看文本
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::ApiError(api) => map_api_error(api),
        OpenAIError::Reqwest(e) => {
            let message = e.to_string();
            if e.is_timeout() {
                LlmError::Timeout(message)
            } else if let Some(status) = e.status() {
                LlmError::from_status(status.as_u16(), message)
            } else {
                LlmError::Service(message)
            }
        }
        OpenAIError::InvalidArgument(message) => LlmError::InvalidRequest(message),
        other => LlmError::Service(other.to_string()),
    }
}

fn map_api_error(api: ApiError) -> LlmError {
    let kind = format!(
        "{} {}",
        api.code.as_deref().unwrap_or_default(),
        api.r#type.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    let message = api.to_string();

    // OpenAI 的 invalid_api_key 以 invalid_request_error 类型返回，先判 code
    if kind.contains("rate_limit") {
        LlmError::RateLimited(message)
    } else if kind.contains("invalid_api_key")
        || kind.contains("authentication")
        || kind.contains("permission")
        || kind.contains("insufficient_quota")
    {
        LlmError::Unauthorized(message)
    } else if kind.contains("invalid_request") || kind.contains("not_found") {
        LlmError::InvalidRequest(message)
    } else if kind.contains("timeout") {
        LlmError::Timeout(message)
    } else if kind.trim().is_empty() {
        // 5xx 响应体不保证是 JSON，SDK 只给出原文
        LlmError::classify(message)
    } else {
        LlmError::Service(message)
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| LlmError::MissingCredential(self.credential_name.clone()))?;

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt)
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(vec![ChatCompletionRequestMessage::User(message)])
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature);
        if request.response_format == ResponseFormat::Json {
            args.response_format(ChatResponseFormat::JsonObject);
        }
        let chat_request = args
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, client.chat().create(chat_request))
            .await
            .map_err(|_| LlmError::Timeout(format!("no response within {:?}", self.request_timeout)))?
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
            let (_, _, total) = self.usage.get();
            tracing::debug!(model = %request.model, total_tokens = total, "Token usage updated");
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::retry::Retryable;
    use crate::llm::TaskCategory;

    #[tokio::test]
    async fn test_missing_key_fails_at_first_call() {
        let client = OpenAiGenerationClient::new(None, None, "TEST_KEY", Duration::from_secs(1));
        let request = GenerationRequest {
            task: TaskCategory::Planning,
            model: "m".into(),
            prompt: "p".into(),
            max_tokens: 10,
            temperature: 0.1,
            response_format: ResponseFormat::Json,
        };
        let err = client.generate(request).await.unwrap_err();
        assert_eq!(err, LlmError::MissingCredential("TEST_KEY".into()));
    }

    fn api_error(message: &str, r#type: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.into(),
            r#type: r#type.map(String::from),
            param: None,
            code: code.map(String::from),
        })
    }

    #[test]
    fn test_api_errors_classified_by_code_and_type() {
        let err = map_openai_error(api_error(
            "Incorrect API key provided",
            Some("invalid_request_error"),
            Some("invalid_api_key"),
        ));
        assert!(matches!(err, LlmError::Unauthorized(_)));

        let err = map_openai_error(api_error("slow down", Some("requests"), Some("rate_limit_exceeded")));
        assert!(matches!(err, LlmError::RateLimited(_)));

        let err = map_openai_error(api_error("bad param", Some("invalid_request_error"), None));
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn test_server_error_body_with_400_in_it_stays_retryable() {
        let err = map_openai_error(api_error(
            "upstream connect error; request id 7f400c1e, retried after 4000ms",
            None,
            None,
        ));
        assert!(matches!(err, LlmError::Service(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 1);
        assert_eq!(usage.get(), (11, 6, 17));
    }
}

//! 生成调用抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 GenerationClient::generate：
//! 一次请求对应一次可能失败的异步调用，编排层只把它当黑盒。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::llm::retry::Retryable;
use crate::llm::TaskCategory;

/// 期望的输出格式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// 要求输出 JSON 对象（schema 已写入 prompt）
    Json,
}

/// 一次生成请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 请求用途（日志与 Mock 路由用）
    pub task: TaskCategory,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

/// 生成调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Missing credential: {0} is not set")]
    MissingCredential(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Empty response from model")]
    EmptyResponse,
}

impl LlmError {
    /// 配置类错误：重试无意义
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LlmError::MissingCredential(_) | LlmError::Unauthorized(_) | LlmError::InvalidRequest(_)
        )
    }

    /// 按 HTTP 状态码归类
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => LlmError::RateLimited(message),
            401 | 403 => LlmError::Unauthorized(message),
            408 | 504 => LlmError::Timeout(message),
            400 | 404 | 422 => LlmError::InvalidRequest(message),
            _ => LlmError::Service(message),
        }
    }

    /// 只有描述文本时的兜底归类：状态码必须以 `HTTP 400` / `status: 400` 形式出现，
    /// 裸数字（请求 id、字节数、耗时）不参与判断
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if let Some(status) = status_token(&message) {
            return Self::from_status(status, message);
        }
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("rate_limit") {
            LlmError::RateLimited(message)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            LlmError::Timeout(message)
        } else if lower.contains("api key") || lower.contains("unauthorized") {
            LlmError::Unauthorized(message)
        } else if lower.contains("invalid_request") {
            LlmError::InvalidRequest(message)
        } else {
            LlmError::Service(message)
        }
    }
}

fn status_token(message: &str) -> Option<u16> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:http(?:/[\d.]+)?|status(?:\s+code)?)[\s:=]*([1-5]\d\d)\b").expect("valid regex")
    });
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        !self.is_configuration()
    }
}

/// 外部生成调用
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient_errors() {
        assert!(matches!(
            LlmError::classify("HTTP 429 Too Many Requests"),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::classify("operation timed out"),
            LlmError::Timeout(_)
        ));
        assert!(matches!(
            LlmError::classify("status: 502 Bad Gateway"),
            LlmError::Service(_)
        ));
    }

    #[test]
    fn test_classify_configuration_errors() {
        let err = LlmError::classify("Incorrect API key provided");
        assert!(matches!(err, LlmError::Unauthorized(_)));
        assert!(!err.is_retryable());
        assert!(matches!(
            LlmError::classify("HTTP/1.1 400 Bad Request"),
            LlmError::InvalidRequest(_)
        ));
        assert!(!LlmError::MissingCredential("OPENAI_API_KEY".into()).is_retryable());
        assert!(LlmError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_bare_numbers_do_not_decide_the_class() {
        let err = LlmError::classify("upstream overloaded (request id req_400a9, 4000ms, 400 bytes)");
        assert!(matches!(err, LlmError::Service(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(LlmError::from_status(401, "x"), LlmError::Unauthorized(_)));
        assert!(matches!(LlmError::from_status(504, "x"), LlmError::Timeout(_)));
        assert!(matches!(LlmError::from_status(500, "x"), LlmError::Service(_)));
        assert!(matches!(LlmError::from_status(422, "x"), LlmError::InvalidRequest(_)));
    }
}

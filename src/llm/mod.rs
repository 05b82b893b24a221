//! LLM 层：生成调用抽象与实现（OpenAI 兼容 / DeepSeek / Mock），
//! 以及围绕它的策略表、性能监控、模型选择、TTL 缓存与重试执行器

pub mod cache;
pub mod deepseek;
pub mod mock;
pub mod monitor;
pub mod openai;
pub mod retry;
pub mod selector;
pub mod strategy;
pub mod traits;

pub use cache::{CacheStats, ResponseCache, DEFAULT_CACHE_TTL, DEFAULT_SWEEP_INTERVAL};
pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockGenerationClient, ScriptedGenerationClient};
pub use monitor::{ModelStats, PerformanceMonitor, StatsView};
pub use openai::{OpenAiGenerationClient, TokenUsage};
pub use retry::{RecordingSleeper, RetryExecutor, Retryable, Sleeper, TokioSleeper};
pub use selector::ModelSelector;
pub use strategy::{StrategyEntry, StrategyTable, TaskCategory};
pub use traits::{GenerationClient, GenerationRequest, LlmError, ResponseFormat};

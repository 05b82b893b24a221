//! deepdive - 研究编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态机、错误与恢复、会话监管、可见性、工作流编排与主控循环
//! - **llm**: 生成调用抽象与实现（OpenAI 兼容 / DeepSeek / Mock），策略表、性能监控、模型选择、缓存、重试
//! - **observability**: 日志初始化
//! - **research**: 研究数据类型、Prompt、输出解析、合成过滤与 ResearchService
//! - **session**: 会话模型、键值存储后端与会话持久化

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod research;
pub mod session;

pub use crate::core::{spawn_workflow, Command, ResearchWorkflow, WorkflowSnapshot};
pub use crate::research::ResearchService;

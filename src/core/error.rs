//! 研究流程错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 ResearchError 决定稍后重试 / 降级继续 / 终止（进入 ERROR）。

use thiserror::Error;

use crate::core::ResearchState;
use crate::llm::LlmError;
use crate::research::SubtopicStatus;
use crate::session::StorageError;

/// 研究编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(String),

    /// 模型返回的计划解析后为空
    #[error("Model returned an empty plan")]
    EmptyPlan,

    #[error("Invalid transition: {event} is not allowed in state {from}")]
    InvalidTransition { from: ResearchState, event: String },

    /// 子主题状态只能前进（pending → loading → complete）
    #[error("Subtopic {index} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        index: usize,
        from: SubtopicStatus,
        to: SubtopicStatus,
    },

    /// 会话已被 reset，本次结果不再写回
    #[error("Session was reset; result discarded")]
    Discarded,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ResearchError {
    /// 凭证缺失 / 无权限 / 配置错误：首次调用即致命
    pub fn is_configuration(&self) -> bool {
        match self {
            ResearchError::Config(_) => true,
            ResearchError::Llm(e) => e.is_configuration(),
            _ => false,
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作（携带面向用户的说明）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 暂时性故障（超时、限流、服务端错误），重试已耗尽，稍后整体重试
    RetryLater(String),
    /// 可降级继续（不改变状态机走向，只作为行内提示）
    Degrade(String),
    /// 终止当前流程，进入 ERROR，仅提供 reset
    Abort(String),
}

impl RecoveryAction {
    pub fn message(&self) -> &str {
        match self {
            RecoveryAction::RetryLater(m) | RecoveryAction::Degrade(m) | RecoveryAction::Abort(m) => m,
        }
    }
}

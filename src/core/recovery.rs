//! 错误恢复引擎
//!
//! 根据 ResearchError 类型返回 RecoveryAction，供工作流决定是提示重试、降级继续还是终止。

use crate::core::{RecoveryAction, ResearchError};
use crate::llm::LlmError;

/// 语义化错误恢复：将错误映射为可执行动作及用户可读说明
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ResearchError) -> RecoveryAction {
        match err {
            e if e.is_configuration() => RecoveryAction::Abort(format!(
                "The model backend is not configured correctly ({e}). Check the API key and provider settings, then reset."
            )),
            ResearchError::Llm(LlmError::Timeout(_)) | ResearchError::Llm(LlmError::RateLimited(_)) => {
                RecoveryAction::RetryLater(format!(
                    "The model service is busy or slow ({err}). Please try again in a moment."
                ))
            }
            ResearchError::Llm(LlmError::Service(_)) | ResearchError::Llm(LlmError::EmptyResponse) => {
                RecoveryAction::RetryLater(format!("The model service failed repeatedly: {err}"))
            }
            ResearchError::EmptyPlan => RecoveryAction::RetryLater(
                "The model did not return a usable plan. Try rephrasing the topic.".to_string(),
            ),
            ResearchError::Discarded => {
                RecoveryAction::Degrade("Result discarded because the session was reset.".to_string())
            }
            ResearchError::InvalidTransition { .. } | ResearchError::InvalidStatusTransition { .. } => {
                RecoveryAction::Degrade(format!("Ignored: {err}"))
            }
            ResearchError::Storage(_) => RecoveryAction::Degrade(format!(
                "Progress could not be saved ({err}); research continues in memory."
            )),
            _ => RecoveryAction::Abort(format!("Unexpected failure: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResearchState;
    use crate::session::StorageError;

    #[test]
    fn test_recovery_missing_credential_aborts() {
        let engine = RecoveryEngine::new();
        let err = ResearchError::Llm(LlmError::MissingCredential("DEEPSEEK_API_KEY".into()));
        let action = engine.handle(&err);
        match action {
            RecoveryAction::Abort(msg) => assert!(msg.contains("API key")),
            _ => panic!("Expected Abort"),
        }
    }

    #[test]
    fn test_recovery_rate_limited_retry_later() {
        let engine = RecoveryEngine::new();
        let err = ResearchError::Llm(LlmError::RateLimited("429".into()));
        assert!(matches!(engine.handle(&err), RecoveryAction::RetryLater(_)));
    }

    #[test]
    fn test_recovery_storage_degrades() {
        let engine = RecoveryEngine::new();
        let err = ResearchError::Storage(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )));
        assert!(matches!(engine.handle(&err), RecoveryAction::Degrade(_)));
    }

    #[test]
    fn test_recovery_invalid_transition_degrades() {
        let engine = RecoveryEngine::new();
        let err = ResearchError::InvalidTransition {
            from: ResearchState::Done,
            event: "Approve".into(),
        };
        assert!(matches!(engine.handle(&err), RecoveryAction::Degrade(_)));
    }

    #[test]
    fn test_recovery_unexpected_aborts() {
        let engine = RecoveryEngine::new();
        let err = ResearchError::Unexpected("boom".into());
        let action = engine.handle(&err);
        assert!(matches!(action, RecoveryAction::Abort(_)));
        assert!(action.message().contains("boom"));
    }
}

//! 会话监管：结果写回的「关注令牌」
//!
//! 每个研究会话持有一个 CancellationToken。reset 只取消令牌，不会中断正在进行的模型调用；
//! 调用返回后检查令牌，已取消则丢弃结果，不写回已被清空的会话。

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// 会话级关注令牌管理
#[derive(Debug)]
pub struct SessionSupervisor {
    current: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开始新会话：放弃旧会话的关注，返回新令牌
    pub fn begin_session(&self) -> CancellationToken {
        let mut current = self.lock();
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    /// 当前会话的令牌（长操作开始时获取，结束时检查）
    pub fn interest(&self) -> CancellationToken {
        self.lock().clone()
    }

    /// 放弃当前会话（用户 reset）
    pub fn discard(&self) {
        self.lock().cancel();
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_session_cancels_previous() {
        let supervisor = SessionSupervisor::new();
        let first = supervisor.begin_session();
        let second = supervisor.begin_session();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_discard_cancels_outstanding_interest() {
        let supervisor = SessionSupervisor::new();
        supervisor.begin_session();
        let held = supervisor.interest();
        supervisor.discard();
        assert!(held.is_cancelled());
    }
}

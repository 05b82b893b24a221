//! 可见性监控
//!
//! 视图进入后台（CLI 中为研究进行时的第一次 Ctrl+C）且有进行中的研究时，广播一条提示：
//! 进度已保存，但只有下一步能在返回后继续。只做提示，不暂停也不取消任何操作。

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::session::SessionPersistence;

/// 视图可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Foreground,
    Background,
}

/// 离开提示
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityAdvisory {
    pub topic: String,
    pub progress: u8,
    pub message: String,
}

impl VisibilityAdvisory {
    fn new(topic: &str, progress: u8) -> Self {
        Self {
            topic: topic.to_string(),
            progress,
            message: format!(
                "Research on \"{topic}\" is {progress}% complete. Progress is saved; \
                 when you come back, research resumes from the next step."
            ),
        }
    }
}

/// 可见性监控器
#[derive(Clone)]
pub struct VisibilityMonitor {
    current: Arc<Mutex<Visibility>>,
    advisory_tx: broadcast::Sender<VisibilityAdvisory>,
}

impl VisibilityMonitor {
    pub fn new() -> Self {
        let (advisory_tx, _) = broadcast::channel(8);
        Self {
            current: Arc::new(Mutex::new(Visibility::Foreground)),
            advisory_tx,
        }
    }

    pub fn visibility(&self) -> Visibility {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 订阅离开提示
    pub fn subscribe(&self) -> broadcast::Receiver<VisibilityAdvisory> {
        self.advisory_tx.subscribe()
    }

    /// 记录可见性变化；前台 → 后台且有进行中的研究时返回并广播提示
    pub fn set_visibility(
        &self,
        visibility: Visibility,
        persistence: &SessionPersistence,
    ) -> Option<VisibilityAdvisory> {
        let previous = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, visibility)
        };
        if previous == visibility || visibility == Visibility::Foreground {
            return None;
        }
        if !persistence.has_active_research() {
            return None;
        }

        let session = persistence.current()?;
        let advisory = VisibilityAdvisory::new(&session.topic, persistence.get_progress());
        tracing::info!(topic = %advisory.topic, progress = advisory.progress, "View left during active research");
        // 没有订阅者时发送失败，可以忽略
        let _ = self.advisory_tx.send(advisory.clone());
        Some(advisory)
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

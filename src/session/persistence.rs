//! 研究会话持久化
//!
//! 同一时间只保存一个会话，整份快照以 JSON 写在固定键下；每次修改都重写整份快照并刷新 lastActivity。
//! 进程启动时 restore()：超过过期时间（默认 30 分钟）未活动的会话直接丢弃，不提供恢复。

use std::sync::Arc;
use std::time::Duration;

use crate::core::{Clock, ResearchError, ResearchState, SystemClock};
use crate::research::{Source, Subtopic, SubtopicStatus};
use crate::session::{ChatMessage, KeyValueStore, ResearchSession, Role, StorageError};

/// 存储键
pub const SESSION_KEY: &str = "deepdive.research_session";

/// 默认会话过期时间
pub const DEFAULT_SESSION_EXPIRY: Duration = Duration::from_secs(30 * 60);

/// 单个子主题的更新内容
#[derive(Debug, Clone, PartialEq)]
pub struct SubtopicUpdate {
    pub status: SubtopicStatus,
    pub content: Option<String>,
    pub sources: Option<Vec<Source>>,
    pub error: Option<String>,
}

impl SubtopicUpdate {
    pub fn status(status: SubtopicStatus) -> Self {
        Self {
            status,
            content: None,
            sources: None,
            error: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// 会话持久化存储
pub struct SessionPersistence {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    expiry: Duration,
    current: Option<ResearchSession>,
}

impl SessionPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            expiry: DEFAULT_SESSION_EXPIRY,
            current: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn current(&self) -> Option<&ResearchSession> {
        self.current.as_ref()
    }

    fn expiry_ms(&self) -> i64 {
        i64::try_from(self.expiry.as_millis()).unwrap_or(i64::MAX)
    }

    fn expired_at(&self, session: &ResearchSession, now_ms: i64) -> bool {
        now_ms - session.last_activity > self.expiry_ms()
    }

    /// 读取存储中的会话：不存在 / 损坏 / 已过期时返回 None（后两者同时从存储删除）
    pub fn restore(&mut self) -> Result<Option<ResearchSession>, StorageError> {
        self.current = None;
        let Some(raw) = self.store.get(SESSION_KEY)? else {
            return Ok(None);
        };

        let session: ResearchSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Stored research session is corrupt; discarding");
                self.store.remove(SESSION_KEY)?;
                return Ok(None);
            }
        };

        let now = self.clock.now_ms();
        if self.expired_at(&session, now) {
            tracing::info!(
                topic = %session.topic,
                idle_secs = (now - session.last_activity) / 1000,
                "Stored research session expired; discarding"
            );
            self.store.remove(SESSION_KEY)?;
            return Ok(None);
        }

        tracing::info!(topic = %session.topic, state = %session.research_state, "Restored research session");
        self.current = Some(session.clone());
        Ok(Some(session))
    }

    fn save(&mut self) -> Result<(), StorageError> {
        let now = self.clock.now_ms();
        if let Some(session) = self.current.as_mut() {
            session.last_activity = now;
            let json = serde_json::to_string(session)?;
            self.store.set(SESSION_KEY, &json)?;
        }
        Ok(())
    }

    /// 新会话（替换任何已有会话），初始状态 PLAN_REVIEW、子主题全部 pending
    pub fn create_session(&mut self, topic: &str, titles: &[String]) -> Result<(), StorageError> {
        let session = ResearchSession::new(topic, titles, self.clock.now_ms());
        tracing::debug!(id = %session.id, topic, "Creating research session");
        self.current = Some(session);
        self.save()
    }

    /// 精炼后的计划：子主题整体替换为新的 pending 列表
    pub fn replace_plan(&mut self, titles: &[String]) -> Result<(), StorageError> {
        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        session.subtopics = Subtopic::from_titles(titles);
        self.save()
    }

    pub fn update_research_state(&mut self, state: ResearchState) -> Result<(), StorageError> {
        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        session.research_state = state;
        session.is_active = !state.is_terminal();
        self.save()
    }

    fn apply_subtopic(
        session: &mut ResearchSession,
        index: usize,
        update: SubtopicUpdate,
    ) -> Result<(), ResearchError> {
        let Some(subtopic) = session.subtopics.get_mut(index) else {
            return Err(ResearchError::Unexpected(format!(
                "subtopic index {index} out of range ({} subtopics)",
                session.subtopics.len()
            )));
        };
        if !subtopic.status.can_advance_to(update.status) {
            return Err(ResearchError::InvalidStatusTransition {
                index,
                from: subtopic.status,
                to: update.status,
            });
        }
        subtopic.status = update.status;
        if update.content.is_some() {
            subtopic.content = update.content;
        }
        if update.sources.is_some() {
            subtopic.sources = update.sources;
        }
        subtopic.error = update.error;
        Ok(())
    }

    /// 更新单个子主题；状态不能后退
    pub fn update_subtopic_status(&mut self, index: usize, update: SubtopicUpdate) -> Result<(), ResearchError> {
        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        Self::apply_subtopic(session, index, update)?;
        Ok(self.save()?)
    }

    /// 子主题更新与状态迁移在同一次写入中完成（最后一个子主题 settle 时使用）
    pub fn update_subtopic_and_state(
        &mut self,
        index: usize,
        update: SubtopicUpdate,
        state: ResearchState,
    ) -> Result<(), ResearchError> {
        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        Self::apply_subtopic(session, index, update)?;
        session.research_state = state;
        session.is_active = !state.is_terminal();
        Ok(self.save()?)
    }

    pub fn add_chat_message(&mut self, role: Role, content: impl Into<String>) -> Result<(), StorageError> {
        let Some(session) = self.current.as_mut() else {
            return Ok(());
        };
        session.chat_history.push(ChatMessage {
            role,
            content: content.into(),
        });
        self.save()
    }

    pub fn clear_session(&mut self) -> Result<(), StorageError> {
        self.current = None;
        self.store.remove(SESSION_KEY)
    }

    /// 有未结束的研究（离开时需要提示）
    pub fn has_active_research(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.is_active && s.research_state.is_in_flight())
    }

    pub fn get_progress(&self) -> u8 {
        self.current.as_ref().map(ResearchSession::progress).unwrap_or(0)
    }

    pub fn is_expired(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| self.expired_at(s, self.clock.now_ms()))
    }
}

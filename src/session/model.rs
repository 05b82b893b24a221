//! 持久化会话模型
//!
//! JSON 字段使用 camelCase，与存储中的快照布局一致。

use serde::{Deserialize, Serialize};

use crate::core::ResearchState;
use crate::research::{progress_percent, Subtopic};

/// 聊天消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 计划审阅阶段的聊天记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 进行中的研究会话（存储中同时只有一个）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchSession {
    pub id: String,
    pub topic: String,
    pub subtopics: Vec<Subtopic>,
    pub research_state: ResearchState,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// 毫秒时间戳
    pub start_time: i64,
    pub last_activity: i64,
    pub is_active: bool,
}

impl ResearchSession {
    pub fn new(topic: impl Into<String>, titles: &[String], now_ms: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            subtopics: Subtopic::from_titles(titles),
            research_state: ResearchState::PlanReview,
            chat_history: Vec::new(),
            start_time: now_ms,
            last_activity: now_ms,
            is_active: true,
        }
    }

    /// 已完成子主题占比（0..=100）
    pub fn progress(&self) -> u8 {
        progress_percent(&self.subtopics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::SubtopicStatus;

    #[test]
    fn test_session_json_is_camel_case() {
        let session = ResearchSession::new("Group Theory", &["A".into()], 1_000);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["researchState"], "PLAN_REVIEW");
        assert_eq!(json["startTime"], 1_000);
        assert_eq!(json["isActive"], true);
        assert_eq!(json["subtopics"][0]["status"], "pending");
        assert!(json["chatHistory"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_progress_percent() {
        let mut session = ResearchSession::new("T", &["a".into(), "b".into(), "c".into()], 0);
        assert_eq!(session.progress(), 0);
        session.subtopics[0].status = SubtopicStatus::Complete;
        assert_eq!(session.progress(), 33);
        session.subtopics[1].status = SubtopicStatus::Complete;
        session.subtopics[2].status = SubtopicStatus::Complete;
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn test_chat_role_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}

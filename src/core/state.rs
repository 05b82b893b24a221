//! 研究状态机与 UI 投影
//!
//! ResearchState 是持久化快照中的 researchState；所有合法迁移集中在 ResearchState::next，
//! 其余 (状态, 事件) 组合一律拒绝。WorkflowSnapshot 是发给视图层的轻量投影。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::ResearchError;
use crate::research::{FinalReport, Source, Subtopic, SubtopicStatus};
use crate::session::ChatMessage;

/// 研究流程阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResearchState {
    Idle,
    Planning,
    PlanReview,
    RefiningPlan,
    Researching,
    Synthesizing,
    Done,
    Error,
}

/// 驱动状态机的事件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResearchEvent {
    SubmitTopic,
    PlanReady,
    UserFeedback,
    Refined,
    Approve,
    /// 所有子主题都已 settle（成功或失败占位）
    AllSubtopicsSettled,
    ReportReady,
    /// 无可用内容，已生成本地诊断报告
    NoUsableContent,
    Failure,
    Reset,
}

impl ResearchState {
    /// 计算迁移目标；非法组合返回 InvalidTransition
    pub fn next(self, event: ResearchEvent) -> Result<ResearchState, ResearchError> {
        use ResearchEvent as E;
        use ResearchState as S;

        let to = match (self, event) {
            (_, E::Reset) => S::Idle,
            (S::Idle, E::SubmitTopic) => S::Planning,
            (S::Planning, E::PlanReady) => S::PlanReview,
            (S::Planning, E::Failure) => S::Error,
            (S::PlanReview, E::UserFeedback) => S::RefiningPlan,
            (S::RefiningPlan, E::Refined) => S::PlanReview,
            // 精炼失败可恢复：回到审阅，错误作为聊天消息展示
            (S::RefiningPlan, E::Failure) => S::PlanReview,
            (S::PlanReview, E::Approve) => S::Researching,
            (S::Researching, E::AllSubtopicsSettled) => S::Synthesizing,
            (S::Synthesizing, E::ReportReady) => S::Done,
            (S::Synthesizing, E::NoUsableContent) => S::Done,
            (S::Synthesizing, E::Failure) => S::Error,
            (from, event) => {
                return Err(ResearchError::InvalidTransition {
                    from,
                    event: format!("{event:?}"),
                })
            }
        };
        Ok(to)
    }

    /// DONE / ERROR 只能通过 reset 离开
    pub fn is_terminal(self) -> bool {
        matches!(self, ResearchState::Done | ResearchState::Error)
    }

    /// 会话仍在进行中（离开页面需要提示）
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ResearchState::Planning
                | ResearchState::PlanReview
                | ResearchState::RefiningPlan
                | ResearchState::Researching
                | ResearchState::Synthesizing
        )
    }

    /// 状态与子主题聚合状态是否一致
    pub fn agrees_with(self, subtopics: &[Subtopic]) -> bool {
        let all_pending = subtopics.iter().all(|s| s.status == SubtopicStatus::Pending);
        let all_complete = subtopics.iter().all(|s| s.status == SubtopicStatus::Complete);
        match self {
            ResearchState::PlanReview | ResearchState::RefiningPlan => all_pending,
            ResearchState::Researching => !all_complete,
            ResearchState::Synthesizing | ResearchState::Done => all_complete,
            ResearchState::Idle | ResearchState::Planning | ResearchState::Error => true,
        }
    }
}

impl fmt::Display for ResearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResearchState::Idle => "IDLE",
            ResearchState::Planning => "PLANNING",
            ResearchState::PlanReview => "PLAN_REVIEW",
            ResearchState::RefiningPlan => "REFINING_PLAN",
            ResearchState::Researching => "RESEARCHING",
            ResearchState::Synthesizing => "SYNTHESIZING",
            ResearchState::Done => "DONE",
            ResearchState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// 视图层看到的投影状态
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowSnapshot {
    pub state: ResearchState,
    pub topic: Option<String>,
    pub subtopics: Vec<Subtopic>,
    pub sources: Vec<Source>,
    pub chat_history: Vec<ChatMessage>,
    pub report: Option<FinalReport>,
    pub error_message: Option<String>,
    /// 0..=100
    pub progress: u8,
}

impl Default for WorkflowSnapshot {
    fn default() -> Self {
        Self {
            state: ResearchState::Idle,
            topic: None,
            subtopics: Vec::new(),
            sources: Vec::new(),
            chat_history: Vec::new(),
            report: None,
            error_message: None,
            progress: 0,
        }
    }
}

impl WorkflowSnapshot {
    /// 当前计划标题（按计划顺序）
    pub fn plan(&self) -> Vec<String> {
        self.subtopics.iter().map(|s| s.title.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtopics(statuses: &[SubtopicStatus]) -> Vec<Subtopic> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut s = Subtopic::new(format!("t{i}"));
                s.status = *status;
                s
            })
            .collect()
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = ResearchState::Idle;
        for event in [
            ResearchEvent::SubmitTopic,
            ResearchEvent::PlanReady,
            ResearchEvent::UserFeedback,
            ResearchEvent::Refined,
            ResearchEvent::Approve,
            ResearchEvent::AllSubtopicsSettled,
            ResearchEvent::ReportReady,
        ] {
            state = state.next(event).unwrap();
        }
        assert_eq!(state, ResearchState::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_refinement_failure_returns_to_review() {
        let state = ResearchState::RefiningPlan.next(ResearchEvent::Failure).unwrap();
        assert_eq!(state, ResearchState::PlanReview);
    }

    #[test]
    fn test_failures_reach_error() {
        assert_eq!(
            ResearchState::Planning.next(ResearchEvent::Failure).unwrap(),
            ResearchState::Error
        );
        assert_eq!(
            ResearchState::Synthesizing.next(ResearchEvent::Failure).unwrap(),
            ResearchState::Error
        );
        assert_eq!(
            ResearchState::Synthesizing.next(ResearchEvent::NoUsableContent).unwrap(),
            ResearchState::Done
        );
    }

    #[test]
    fn test_terminal_states_only_exit_via_reset() {
        for terminal in [ResearchState::Done, ResearchState::Error] {
            assert!(terminal.next(ResearchEvent::SubmitTopic).is_err());
            assert!(terminal.next(ResearchEvent::Approve).is_err());
            assert_eq!(terminal.next(ResearchEvent::Reset).unwrap(), ResearchState::Idle);
        }
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert!(ResearchState::Idle.next(ResearchEvent::Approve).is_err());
        assert!(ResearchState::Researching.next(ResearchEvent::Failure).is_err());
        assert!(ResearchState::PlanReview.next(ResearchEvent::AllSubtopicsSettled).is_err());
        let err = ResearchState::Planning.next(ResearchEvent::Approve).unwrap_err();
        assert!(err.to_string().contains("PLANNING"));
    }

    #[test]
    fn test_state_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&ResearchState::PlanReview).unwrap();
        assert_eq!(json, "\"PLAN_REVIEW\"");
        assert_eq!(ResearchState::RefiningPlan.to_string(), "REFINING_PLAN");
    }

    #[test]
    fn test_agrees_with_subtopic_progress() {
        use SubtopicStatus::*;
        assert!(ResearchState::PlanReview.agrees_with(&subtopics(&[Pending, Pending])));
        assert!(!ResearchState::PlanReview.agrees_with(&subtopics(&[Complete, Pending])));
        assert!(ResearchState::Researching.agrees_with(&subtopics(&[Complete, Loading])));
        assert!(!ResearchState::Researching.agrees_with(&subtopics(&[Complete, Complete])));
        assert!(ResearchState::Done.agrees_with(&subtopics(&[Complete, Complete])));
        assert!(!ResearchState::Synthesizing.agrees_with(&subtopics(&[Complete, Pending])));
    }
}

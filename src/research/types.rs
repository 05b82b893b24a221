//! 研究数据类型：子主题、来源、最终报告

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 子主题状态：只能 pending → loading → complete
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtopicStatus {
    Pending,
    Loading,
    Complete,
}

impl SubtopicStatus {
    /// 是否允许迁移到 next（同状态视为允许，便于恢复后重新研究 loading 项）
    pub fn can_advance_to(self, next: SubtopicStatus) -> bool {
        next >= self
    }
}

impl fmt::Display for SubtopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubtopicStatus::Pending => "pending",
            SubtopicStatus::Loading => "loading",
            SubtopicStatus::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// 引用来源；按 uri 去重
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// 子主题记录（计划批准后创建，之后只原地更新）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtopic {
    pub title: String,
    pub status: SubtopicStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// 研究失败原因；content 此时为占位文本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Subtopic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: SubtopicStatus::Pending,
            content: None,
            sources: None,
            error: None,
        }
    }

    pub fn from_titles(titles: &[String]) -> Vec<Subtopic> {
        titles.iter().map(Subtopic::new).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.status == SubtopicStatus::Complete
    }

    /// 去掉首尾空白后的内容长度（字符数）
    pub fn content_len(&self) -> usize {
        self.content.as_deref().map(|c| c.trim().chars().count()).unwrap_or(0)
    }
}

/// 已完成子主题占比（0..=100）
pub fn progress_percent(subtopics: &[Subtopic]) -> u8 {
    if subtopics.is_empty() {
        return 0;
    }
    let done = subtopics.iter().filter(|s| s.is_complete()).count();
    ((done * 100) / subtopics.len()) as u8
}

/// 单个子主题的研究结果
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtopicFindings {
    /// Markdown 正文
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// 最终报告：4~6 条摘要 + Markdown 正文
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinalReport {
    pub summary: Vec<String>,
    pub report: String,
}

/// 把新来源按 uri 合并进全局集合；返回新增数量。重复合并是幂等的
pub fn merge_sources(into: &mut Vec<Source>, new: &[Source]) -> usize {
    let mut added = 0;
    for source in new {
        if source.uri.trim().is_empty() || into.iter().any(|s| s.uri == source.uri) {
            continue;
        }
        into.push(source.clone());
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(uri: &str) -> Source {
        Source {
            uri: uri.into(),
            title: format!("title of {uri}"),
        }
    }

    #[test]
    fn test_merge_sources_dedupes_by_uri() {
        let mut all = vec![src("a")];
        let added = merge_sources(&mut all, &[src("a"), src("b"), src("b"), src("")]);
        assert_eq!(added, 1);
        assert_eq!(all, vec![src("a"), src("b")]);

        // 幂等
        assert_eq!(merge_sources(&mut all, &[src("a"), src("b")]), 0);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_status_only_moves_forward() {
        use SubtopicStatus::*;
        assert!(Pending.can_advance_to(Loading));
        assert!(Loading.can_advance_to(Complete));
        assert!(Loading.can_advance_to(Loading));
        assert!(!Complete.can_advance_to(Pending));
        assert!(!Loading.can_advance_to(Pending));
    }

    #[test]
    fn test_subtopic_serializes_without_empty_fields() {
        let json = serde_json::to_value(Subtopic::new("Intro")).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "Intro", "status": "pending" }));
    }

    #[test]
    fn test_progress_percent_counts_complete_only() {
        assert_eq!(progress_percent(&[]), 0);
        let mut subtopics = Subtopic::from_titles(&["A".into(), "B".into(), "C".into()]);
        subtopics[0].status = SubtopicStatus::Complete;
        subtopics[1].status = SubtopicStatus::Loading;
        assert_eq!(progress_percent(&subtopics), 33);
    }
}

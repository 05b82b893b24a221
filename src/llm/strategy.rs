//! 模型策略表
//!
//! 每个任务类别对应一个主模型 / 备用模型及调用参数；启动时确定，之后不再修改。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::deepseek::{DEEPSEEK_CHAT, DEEPSEEK_REASONER};

/// 任务类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskCategory {
    /// 生成研究计划
    Planning,
    /// 单个子主题研究
    Research,
    /// 最终报告合成
    Synthesis,
    /// 按用户反馈精炼计划
    Refinement,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 4] = [
        TaskCategory::Planning,
        TaskCategory::Research,
        TaskCategory::Synthesis,
        TaskCategory::Refinement,
    ];

    /// 缓存策略：合成每次重算；精炼的反馈几乎不重复，同样不缓存
    pub fn is_cacheable(self) -> bool {
        matches!(self, TaskCategory::Planning | TaskCategory::Research)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Planning => "planning",
            TaskCategory::Research => "research",
            TaskCategory::Synthesis => "synthesis",
            TaskCategory::Refinement => "refinement",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个类别的策略
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyEntry {
    pub primary_model: String,
    pub fallback_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub rationale: String,
}

impl StrategyEntry {
    pub fn new(primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            primary_model: primary.into(),
            fallback_model: fallback.into(),
            max_tokens: 2048,
            temperature: 0.5,
            rationale: String::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// 候选顺序：主模型在前
    pub fn candidates(&self) -> [&str; 2] {
        [&self.primary_model, &self.fallback_model]
    }
}

/// 类别 -> 策略 的静态映射
#[derive(Debug, Clone)]
pub struct StrategyTable {
    entries: HashMap<TaskCategory, StrategyEntry>,
}

impl StrategyTable {
    /// 用完整映射构建；缺少任一类别时用默认值补齐
    pub fn new(overrides: HashMap<TaskCategory, StrategyEntry>) -> Self {
        let mut table = Self::default();
        table.entries.extend(overrides);
        table
    }

    pub fn entry(&self, task: TaskCategory) -> &StrategyEntry {
        // 构造时保证四个类别齐全
        &self.entries[&task]
    }

    pub fn primary(&self, task: TaskCategory) -> &str {
        &self.entry(task).primary_model
    }

    pub fn fallback(&self, task: TaskCategory) -> &str {
        &self.entry(task).fallback_model
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        let entries = HashMap::from([
            (
                TaskCategory::Planning,
                StrategyEntry::new(DEEPSEEK_CHAT, DEEPSEEK_REASONER)
                    .with_max_tokens(1024)
                    .with_temperature(0.7)
                    .with_rationale("Short structured list; speed matters more than depth"),
            ),
            (
                TaskCategory::Research,
                StrategyEntry::new(DEEPSEEK_CHAT, DEEPSEEK_REASONER)
                    .with_max_tokens(4096)
                    .with_temperature(0.3)
                    .with_rationale("Factual long-form content, called once per subtopic"),
            ),
            (
                TaskCategory::Synthesis,
                StrategyEntry::new(DEEPSEEK_REASONER, DEEPSEEK_CHAT)
                    .with_max_tokens(8192)
                    .with_temperature(0.4)
                    .with_rationale("Most context-sensitive step; prefer the reasoning model"),
            ),
            (
                TaskCategory::Refinement,
                StrategyEntry::new(DEEPSEEK_CHAT, DEEPSEEK_REASONER)
                    .with_max_tokens(1024)
                    .with_temperature(0.5)
                    .with_rationale("Interactive edit of an existing plan"),
            ),
        ]);
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_all_categories() {
        let table = StrategyTable::default();
        for task in TaskCategory::ALL {
            let entry = table.entry(task);
            assert!(!entry.primary_model.is_empty());
            assert!(!entry.fallback_model.is_empty());
            assert!(entry.max_tokens > 0);
        }
    }

    #[test]
    fn test_overrides_replace_single_category() {
        let table = StrategyTable::new(HashMap::from([(
            TaskCategory::Research,
            StrategyEntry::new("fast", "slow").with_max_tokens(100),
        )]));
        assert_eq!(table.primary(TaskCategory::Research), "fast");
        assert_eq!(table.fallback(TaskCategory::Research), "slow");
        assert_eq!(table.primary(TaskCategory::Synthesis), DEEPSEEK_REASONER);
    }

    #[test]
    fn test_cache_policy() {
        assert!(TaskCategory::Planning.is_cacheable());
        assert!(TaskCategory::Research.is_cacheable());
        assert!(!TaskCategory::Synthesis.is_cacheable());
        assert!(!TaskCategory::Refinement.is_cacheable());
    }
}

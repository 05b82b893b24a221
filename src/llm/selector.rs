//! 模型选择器
//!
//! 在任务类别的主 / 备用模型之间按历史表现选择：
//! score = 成功率 / max(平均响应毫秒, 1)。比较以主模型为初值，只有严格更高的分数才替换，
//! 因此平分（包括两者都没有记录的冷启动）时总是返回主模型。

use crate::llm::{PerformanceMonitor, StrategyTable, TaskCategory};

/// 按任务选择模型；不调用外部服务
#[derive(Clone)]
pub struct ModelSelector {
    table: StrategyTable,
    monitor: PerformanceMonitor,
}

impl ModelSelector {
    pub fn new(table: StrategyTable, monitor: PerformanceMonitor) -> Self {
        Self { table, monitor }
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// 返回值必为该任务配置的主模型或备用模型之一
    pub async fn select_model(&self, task: TaskCategory) -> String {
        let entry = self.table.entry(task);
        let mut best = entry.primary_model.as_str();
        let mut best_score = self.score(best).await;

        let fallback = entry.fallback_model.as_str();
        let fallback_score = self.score(fallback).await;
        if fallback_score > best_score {
            best = fallback;
            best_score = fallback_score;
        }

        tracing::debug!(task = %task, model = best, score = best_score, "Selected model");
        best.to_string()
    }

    async fn score(&self, model: &str) -> f64 {
        match self.monitor.stats_for(model).await {
            Some(stats) => stats.success_rate() / stats.avg_response_time_ms.max(1.0),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::llm::StrategyEntry;

    fn selector() -> ModelSelector {
        let table = StrategyTable::new(HashMap::from([(
            TaskCategory::Research,
            StrategyEntry::new("primary", "fallback"),
        )]));
        ModelSelector::new(table, PerformanceMonitor::new())
    }

    #[tokio::test]
    async fn test_cold_start_returns_primary() {
        let selector = ModelSelector::new(StrategyTable::default(), PerformanceMonitor::new());
        for task in TaskCategory::ALL {
            assert_eq!(selector.select_model(task).await, selector.table().primary(task));
        }
    }

    #[tokio::test]
    async fn test_faster_fallback_wins() {
        let selector = selector();
        selector.monitor().record_request("primary", true, 5000).await;
        selector.monitor().record_request("fallback", true, 500).await;
        assert_eq!(selector.select_model(TaskCategory::Research).await, "fallback");
    }

    #[tokio::test]
    async fn test_failing_primary_loses_to_unused_fallback_only_if_strictly_better() {
        let selector = selector();
        // 主模型全部失败，分数为 0；备用模型无记录，分数也为 0 -> 平分，仍选主模型
        selector.monitor().record_request("primary", false, 100).await;
        assert_eq!(selector.select_model(TaskCategory::Research).await, "primary");

        selector.monitor().record_request("fallback", true, 100).await;
        assert_eq!(selector.select_model(TaskCategory::Research).await, "fallback");
    }

    #[tokio::test]
    async fn test_equal_scores_tie_break_to_primary() {
        let selector = selector();
        selector.monitor().record_request("primary", true, 300).await;
        selector.monitor().record_request("fallback", true, 300).await;
        assert_eq!(selector.select_model(TaskCategory::Research).await, "primary");
    }

    #[tokio::test]
    async fn test_selection_always_within_configured_pair() {
        let selector = selector();
        let samples = [(true, 0u64), (false, 10), (true, 10_000), (true, 1), (false, 0)];
        for (i, (ok_a, ms_a)) in samples.iter().enumerate() {
            for (ok_b, ms_b) in samples.iter().skip(i) {
                selector.monitor().record_request("primary", *ok_a, *ms_a).await;
                selector.monitor().record_request("fallback", *ok_b, *ms_b).await;
                selector.monitor().record_request("unrelated", true, 1).await;
                let chosen = selector.select_model(TaskCategory::Research).await;
                assert!(chosen == "primary" || chosen == "fallback", "got {chosen}");
            }
        }
    }
}

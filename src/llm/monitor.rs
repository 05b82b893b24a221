//! 模型性能监控
//!
//! 按模型记录成功/失败次数与响应时间（指数移动平均，新样本权重 0.1），供 ModelSelector 评分。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::{Clock, SystemClock};

/// 新样本在移动平均中的权重
const EMA_SAMPLE_WEIGHT: f64 = 0.1;

/// 单个模型的统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub success_count: u64,
    pub error_count: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    /// 毫秒时间戳
    pub last_used_at: Option<i64>,
}

impl ModelStats {
    /// 成功率；无请求时为 0
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_requests as f64
        }
    }
}

/// 诊断面板用视图：附带格式化好的成功率
#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    #[serde(flatten)]
    pub stats: ModelStats,
    pub success_rate: String,
}

/// 性能监控（可克隆的共享句柄）
#[derive(Clone)]
pub struct PerformanceMonitor {
    stats: Arc<RwLock<HashMap<String, ModelStats>>>,
    clock: Arc<dyn Clock>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            stats: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// 记录一次调用（每次重试尝试都单独记录）
    pub async fn record_request(&self, model: &str, success: bool, elapsed_ms: u64) {
        let now = self.clock.now_ms();
        let mut stats = self.stats.write().await;
        let entry = stats.entry(model.to_string()).or_default();
        entry.total_requests += 1;
        if success {
            entry.success_count += 1;
        } else {
            entry.error_count += 1;
        }
        entry.avg_response_time_ms = entry.avg_response_time_ms * (1.0 - EMA_SAMPLE_WEIGHT)
            + elapsed_ms as f64 * EMA_SAMPLE_WEIGHT;
        entry.last_used_at = Some(now);
        tracing::debug!(
            model,
            success,
            elapsed_ms,
            avg_ms = entry.avg_response_time_ms,
            "Recorded model request"
        );
    }

    pub async fn stats_for(&self, model: &str) -> Option<ModelStats> {
        self.stats.read().await.get(model).cloned()
    }

    pub async fn all_stats(&self) -> BTreeMap<String, StatsView> {
        self.stats
            .read()
            .await
            .iter()
            .map(|(model, stats)| {
                let view = StatsView {
                    stats: stats.clone(),
                    success_rate: format!("{:.1}%", stats.success_rate() * 100.0),
                };
                (model.clone(), view)
            })
            .collect()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

//! 响应缓存（TTL）
//!
//! key 由任务类别、所选模型、调用参数与操作参数拼成。get 在读取时检查年龄，
//! 所以即使后台清扫从未运行，过期条目也不会被返回。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{Clock, SystemClock};
use crate::llm::{StrategyEntry, TaskCategory};

/// 默认 TTL：30 分钟
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
/// 默认清扫间隔：5 分钟
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    cached_at: i64,
    model: String,
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

/// TTL 缓存（可克隆的共享句柄）
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            clock,
        }
    }

    /// 组合 key：任务 + 模型 + 调用参数 + 操作参数。
    /// 自由文本部分带长度前缀，内容里的分隔符不会造成两组参数拼出同一个 key
    pub fn key(task: TaskCategory, model: &str, entry: &StrategyEntry, params: &[&str]) -> String {
        let mut key = format!(
            "{task}|{}:{model}|{}|{}",
            model.len(),
            entry.max_tokens,
            entry.temperature
        );
        for param in params {
            key.push_str(&format!("|{}:{param}", param.len()));
        }
        key
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        now - entry.cached_at > self.ttl_ms
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !self.is_expired(entry, now) => {
                tracing::debug!(key, model = %entry.model, "Cache hit");
                Some(entry.response.clone())
            }
            Some(_) => {
                tracing::debug!(key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// 覆盖同 key 的旧条目
    pub async fn set(&self, key: impl Into<String>, response: impl Into<String>, model: &str) {
        let entry = CacheEntry {
            response: response.into(),
            cached_at: self.clock.now_ms(),
            model: model.to_string(),
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    /// 移除过期条目，返回移除数量
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.cached_at <= self.ttl_ms);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Swept expired cache entries");
        }
        evicted
    }

    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        let expired = entries.values().filter(|e| self.is_expired(e, now)).count();
        CacheStats {
            total: entries.len(),
            valid: entries.len() - expired,
            expired,
        }
    }

    /// 后台定期清扫，直到 shutdown 被取消
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.sweep_expired().await;
                    }
                }
            }
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;

    const TTL_MS: i64 = 30 * 60 * 1000;

    fn cache_at(start: i64) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (ResponseCache::with_clock(DEFAULT_CACHE_TTL, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_ttl_round_trip_without_sweep() {
        let (cache, clock) = cache_at(1_000_000);
        cache.set("k", "v", "m").await;

        clock.set(1_000_000 + TTL_MS - 1);
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        clock.set(1_000_000 + TTL_MS + 1);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_ttl_round_trip_with_sweep() {
        let (cache, clock) = cache_at(0);
        cache.set("k", "v", "m").await;

        clock.set(TTL_MS - 1);
        assert_eq!(cache.sweep_expired().await, 0);
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        clock.set(TTL_MS + 1);
        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_refreshes() {
        let (cache, clock) = cache_at(0);
        cache.set("k", "old", "m").await;
        clock.advance(TTL_MS);
        cache.set("k", "new", "m").await;
        clock.advance(TTL_MS);
        assert_eq!(cache.get("k").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_stats_counts_expired_before_sweep() {
        let (cache, clock) = cache_at(0);
        cache.set("a", "1", "m").await;
        clock.advance(TTL_MS + 5);
        cache.set("b", "2", "m").await;

        let stats = cache.stats().await;
        assert_eq!(stats, CacheStats { total: 2, valid: 1, expired: 1 });
    }

    #[test]
    fn test_key_includes_task_model_and_params() {
        let entry = StrategyEntry::new("p", "f").with_max_tokens(10);
        let a = ResponseCache::key(TaskCategory::Research, "p", &entry, &["Sub", "Main"]);
        let b = ResponseCache::key(TaskCategory::Research, "f", &entry, &["Sub", "Main"]);
        let c = ResponseCache::key(TaskCategory::Planning, "p", &entry, &["Sub", "Main"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with("|3:Sub|4:Main"));
    }

    #[test]
    fn test_key_params_with_separator_do_not_collide() {
        let entry = StrategyEntry::new("p", "f");
        let a = ResponseCache::key(TaskCategory::Research, "p", &entry, &["a|b", "c"]);
        let b = ResponseCache::key(TaskCategory::Research, "p", &entry, &["a", "b|c"]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let cache = ResponseCache::default();
        let shutdown = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(5), shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();
    }
}

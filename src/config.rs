//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DEEPDIVE__*` 覆盖（双下划线表示嵌套，如 `DEEPDIVE__LLM__PROVIDER=mock`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::ResearchError;
use crate::llm::{StrategyTable, TaskCategory};
use crate::research::ContentThresholds;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    /// [strategy.<category>] 段：按任务类别覆盖默认策略
    pub strategy: HashMap<String, StrategyOverride>,
    pub cache: CacheSection,
    pub retry: RetrySection,
    pub research: ResearchSection,
    pub session: SessionSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 会话文件 / 数据库所在目录
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / mock
    pub provider: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 HTTP 请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [strategy.<category>] 段：只覆盖给出的字段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StrategyOverride {
    pub primary_model: Option<String>,
    pub fallback_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub rationale: Option<String>,
}

/// [cache] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            sweep_interval_secs: 300,
        }
    }
}

/// [retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

/// [research] 段：合成输入过滤阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    pub min_content_chars: usize,
    pub relaxed_min_content_chars: usize,
}

impl Default for ResearchSection {
    fn default() -> Self {
        let thresholds = ContentThresholds::default();
        Self {
            min_content_chars: thresholds.min_content_chars,
            relaxed_min_content_chars: thresholds.relaxed_min_content_chars,
        }
    }
}

/// 会话存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub backend: SessionBackend,
    /// 未设置时：file 用 <data_dir>/sessions，sqlite 用 <data_dir>/sessions.db
    pub path: Option<PathBuf>,
    pub expiry_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            backend: SessionBackend::File,
            path: None,
            expiry_secs: 1800,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeouts.request)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs.max(1))
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms)
    }

    pub fn session_expiry(&self) -> Duration {
        Duration::from_secs(self.session.expiry_secs)
    }

    pub fn thresholds(&self) -> ContentThresholds {
        ContentThresholds {
            min_content_chars: self.research.min_content_chars,
            relaxed_min_content_chars: self.research.relaxed_min_content_chars,
        }
    }

    pub fn session_path(&self) -> PathBuf {
        match (&self.session.path, self.session.backend) {
            (Some(path), _) => path.clone(),
            (None, SessionBackend::Sqlite) => self.app.data_dir.join("sessions.db"),
            (None, _) => self.app.data_dir.join("sessions"),
        }
    }

    /// 默认策略表叠加 [strategy.*] 覆盖；未知类别名视为配置错误
    pub fn strategy_table(&self) -> Result<StrategyTable, ResearchError> {
        let defaults = StrategyTable::default();
        let mut entries = HashMap::new();
        for (name, o) in &self.strategy {
            let task = TaskCategory::ALL
                .into_iter()
                .find(|t| t.as_str().eq_ignore_ascii_case(name))
                .ok_or_else(|| ResearchError::Config(format!("unknown strategy category: {name}")))?;

            let mut entry = defaults.entry(task).clone();
            if let Some(m) = &o.primary_model {
                entry.primary_model = m.clone();
            }
            if let Some(m) = &o.fallback_model {
                entry.fallback_model = m.clone();
            }
            if let Some(t) = o.max_tokens {
                entry.max_tokens = t;
            }
            if let Some(t) = o.temperature {
                entry.temperature = t;
            }
            if let Some(r) = &o.rationale {
                entry.rationale = r.clone();
            }
            entries.insert(task, entry);
        }
        Ok(StrategyTable::new(entries))
    }
}

/// 从 config 目录加载配置，环境变量 DEEPDIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DEEPDIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    match default_names
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{name}.toml")).exists())
    {
        Some(name) => {
            builder = builder.add_source(config::File::with_name(name).required(false));
        }
        None => tracing::warn!("config/default.toml not found; using built-in defaults"),
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file does not exist; ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DEEPDIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

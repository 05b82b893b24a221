//! 研究编排：数据类型、Prompt 构造、输出解析、合成过滤与 ResearchService

pub mod parse;
pub mod prompts;
pub mod report;
pub mod service;
pub mod types;

pub use report::{diagnostic_report, fallback_report, select_usable, ContentThresholds};
pub use service::{NoProgress, RefinedPlan, ResearchProgress, ResearchService, SynthesisOutcome};
pub use types::{merge_sources, progress_percent, FinalReport, Source, Subtopic, SubtopicFindings, SubtopicStatus};

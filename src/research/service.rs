//! 研究编排服务
//!
//! 显式持有 ModelSelector（含 PerformanceMonitor）、ResponseCache 与 RetryExecutor 的服务对象。
//! 四个操作共用同一模板：选模型 → 查缓存（可缓存时）→ 带重试调用 → 逐次记录性能 → 写缓存 → 解析。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::ResearchError;
use crate::llm::{
    CacheStats, GenerationClient, GenerationRequest, ModelSelector, PerformanceMonitor,
    ResponseCache, ResponseFormat, RetryExecutor, StatsView, StrategyTable, TaskCategory,
};
use crate::research::parse::{parse_findings, parse_plan, parse_report, MIN_PLAN_LEN};
use crate::research::report::{diagnostic_report, fallback_report, select_usable, ContentThresholds};
use crate::research::{
    merge_sources, prompts, FinalReport, Source, Subtopic, SubtopicFindings, SubtopicStatus,
};

/// 精炼结果；degraded 为 Some 时表示调用失败、计划只追加了占位条目
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedPlan {
    pub titles: Vec<String>,
    pub degraded: Option<String>,
}

/// 合成走了哪条路径
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    /// 模型生成的报告
    Model(FinalReport),
    /// 本地报告：无可用内容，或合成调用在重试后仍失败
    Diagnostic(FinalReport),
}

impl SynthesisOutcome {
    pub fn report(&self) -> &FinalReport {
        match self {
            SynthesisOutcome::Model(r) | SynthesisOutcome::Diagnostic(r) => r,
        }
    }

    pub fn into_report(self) -> FinalReport {
        match self {
            SynthesisOutcome::Model(r) | SynthesisOutcome::Diagnostic(r) => r,
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self, SynthesisOutcome::Diagnostic(_))
    }
}

/// 逐项研究的进度观察者：每一步完成后收到快照，不会被回读
#[async_trait]
pub trait ResearchProgress: Send + Sync {
    async fn on_subtopic(&self, index: usize, subtopic: &Subtopic, sources: &[Source]);
}

/// 不关心进度
pub struct NoProgress;

#[async_trait]
impl ResearchProgress for NoProgress {
    async fn on_subtopic(&self, _index: usize, _subtopic: &Subtopic, _sources: &[Source]) {}
}

struct ModelReply {
    text: String,
    model: String,
    /// 命中缓存时为 None（无需回写）
    cache_key: Option<String>,
}

/// 研究编排服务
pub struct ResearchService {
    client: Arc<dyn GenerationClient>,
    selector: ModelSelector,
    cache: ResponseCache,
    retry: RetryExecutor,
    thresholds: ContentThresholds,
}

impl ResearchService {
    pub fn new(client: Arc<dyn GenerationClient>, table: StrategyTable) -> Self {
        Self {
            client,
            selector: ModelSelector::new(table, PerformanceMonitor::new()),
            cache: ResponseCache::default(),
            retry: RetryExecutor::default(),
            thresholds: ContentThresholds::default(),
        }
    }

    pub fn with_monitor(mut self, monitor: PerformanceMonitor) -> Self {
        self.selector = ModelSelector::new(self.selector.table().clone(), monitor);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ContentThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        self.selector.monitor()
    }

    pub async fn performance_stats(&self) -> BTreeMap<String, StatsView> {
        self.monitor().all_stats().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn call_model(
        &self,
        task: TaskCategory,
        cache_params: &[&str],
        prompt: String,
    ) -> Result<ModelReply, ResearchError> {
        let entry = self.selector.table().entry(task).clone();
        let model = self.selector.select_model(task).await;

        let cache_key = task
            .is_cacheable()
            .then(|| ResponseCache::key(task, &model, &entry, cache_params));
        if let Some(key) = &cache_key {
            if let Some(text) = self.cache.get(key).await {
                return Ok(ModelReply {
                    text,
                    model,
                    cache_key: None,
                });
            }
        }

        let request = GenerationRequest {
            task,
            model: model.clone(),
            prompt,
            max_tokens: entry.max_tokens,
            temperature: entry.temperature,
            response_format: ResponseFormat::Json,
        };

        let client = &self.client;
        let monitor = self.selector.monitor();
        let model_ref = model.as_str();
        let text = self
            .retry
            .execute(|attempt| {
                let request = request.clone();
                async move {
                    let started = Instant::now();
                    let result = client.generate(request).await;
                    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    monitor.record_request(model_ref, result.is_ok(), elapsed_ms).await;
                    if let Err(e) = &result {
                        tracing::debug!(task = %task, model = model_ref, attempt, error = %e, "Model call failed");
                    }
                    result
                }
            })
            .await?;

        Ok(ModelReply {
            text,
            model,
            cache_key,
        })
    }

    async fn remember(&self, reply: &ModelReply) {
        if let Some(key) = &reply.cache_key {
            self.cache.set(key.clone(), reply.text.clone(), &reply.model).await;
        }
    }

    /// 生成 5~7 个子主题标题；按 topic 缓存
    pub async fn create_plan(&self, topic: &str) -> Result<Vec<String>, ResearchError> {
        let reply = self
            .call_model(TaskCategory::Planning, &[topic], prompts::plan_prompt(topic))
            .await?;
        let plan = parse_plan(&reply.text);
        if plan.is_empty() {
            return Err(ResearchError::EmptyPlan);
        }
        if plan.len() < MIN_PLAN_LEN {
            tracing::warn!(topic, len = plan.len(), "Plan is shorter than expected");
        }
        self.remember(&reply).await;
        tracing::info!(topic, model = %reply.model, subtopics = plan.len(), "Plan created");
        Ok(plan)
    }

    /// 按反馈精炼计划；任何失败都退化为「原计划 + 占位条目」，不会阻塞用户
    pub async fn refine_plan(&self, topic: &str, current_plan: &[String], feedback: &str) -> RefinedPlan {
        let prompt = prompts::refine_prompt(topic, current_plan, feedback);
        let outcome = self
            .call_model(TaskCategory::Refinement, &[], prompt)
            .await
            .map(|reply| parse_plan(&reply.text));

        match outcome {
            Ok(titles) if !titles.is_empty() => RefinedPlan {
                titles,
                degraded: None,
            },
            Ok(_) => Self::degraded_plan(current_plan, feedback, "the model returned an empty plan".into()),
            Err(e) => Self::degraded_plan(current_plan, feedback, e.to_string()),
        }
    }

    fn degraded_plan(current_plan: &[String], feedback: &str, reason: String) -> RefinedPlan {
        tracing::warn!(reason = %reason, "Plan refinement failed; keeping current plan");
        let mut titles = current_plan.to_vec();
        titles.push(format!("Additional focus: {}", feedback.trim()));
        RefinedPlan {
            titles,
            degraded: Some(reason),
        }
    }

    /// 研究单个子主题；按 (子主题, 主主题) 缓存
    pub async fn research_subtopic(
        &self,
        title: &str,
        main_topic: &str,
    ) -> Result<SubtopicFindings, ResearchError> {
        let reply = self
            .call_model(
                TaskCategory::Research,
                &[title, main_topic],
                prompts::research_prompt(title, main_topic),
            )
            .await?;
        let findings = parse_findings(&reply.text);
        self.remember(&reply).await;
        Ok(findings)
    }

    /// 按计划顺序逐个研究未完成的子主题，上一个 settle 之后才发出下一个调用。
    ///
    /// `subtopics` 与 `sources` 是调用方持有的工作集；每步完成后把快照交给 `progress`。
    /// 调用返回时若 `interest` 已取消（会话被 reset），丢弃结果并返回 `Discarded`。
    pub async fn research_all(
        &self,
        topic: &str,
        subtopics: &mut [Subtopic],
        sources: &mut Vec<Source>,
        interest: &CancellationToken,
        progress: &dyn ResearchProgress,
    ) -> Result<(), ResearchError> {
        for index in 0..subtopics.len() {
            if subtopics[index].is_complete() {
                continue;
            }
            if interest.is_cancelled() {
                return Err(ResearchError::Discarded);
            }

            subtopics[index].status = SubtopicStatus::Loading;
            progress.on_subtopic(index, &subtopics[index], sources).await;

            let title = subtopics[index].title.clone();
            tracing::info!(index, subtopic = %title, "Researching subtopic");
            let result = self.research_subtopic(&title, topic).await;

            if interest.is_cancelled() {
                tracing::info!(subtopic = %title, "Session reset during research; discarding result");
                return Err(ResearchError::Discarded);
            }

            let subtopic = &mut subtopics[index];
            match result {
                Ok(findings) => {
                    merge_sources(sources, &findings.sources);
                    subtopic.content = Some(findings.content);
                    subtopic.sources = Some(findings.sources);
                    subtopic.error = None;
                }
                Err(e) => {
                    tracing::warn!(subtopic = %title, error = %e, "Subtopic research failed; settling with placeholder");
                    subtopic.content = Some(format!("Research for \"{title}\" could not be completed: {e}"));
                    subtopic.sources = Some(Vec::new());
                    subtopic.error = Some(e.to_string());
                }
            }
            subtopic.status = SubtopicStatus::Complete;
            progress.on_subtopic(index, subtopic, sources).await;
        }
        Ok(())
    }

    /// 合成最终报告；不缓存。无可用内容时返回本地诊断报告而不调用模型；
    /// 瞬时错误重试用尽后也在本地成文，只有配置类错误向上返回
    pub async fn synthesize_report(
        &self,
        topic: &str,
        subtopics: &[Subtopic],
    ) -> Result<SynthesisOutcome, ResearchError> {
        let (usable, relaxed) = select_usable(subtopics, self.thresholds);
        if usable.is_empty() {
            tracing::warn!(topic, "No usable subtopic content; building diagnostic report locally");
            return Ok(SynthesisOutcome::Diagnostic(diagnostic_report(topic, subtopics)));
        }
        if relaxed {
            tracing::warn!(topic, usable = usable.len(), "Synthesizing with relaxed content threshold");
        }

        let prompt = prompts::synthesis_prompt(topic, &usable);
        let reply = match self.call_model(TaskCategory::Synthesis, &[], prompt).await {
            Ok(reply) => reply,
            Err(ResearchError::Llm(e)) if !e.is_configuration() => {
                tracing::warn!(topic, error = %e, "Synthesis failed after retries; building report locally");
                let reason = e.to_string();
                return Ok(SynthesisOutcome::Diagnostic(fallback_report(topic, &usable, subtopics, &reason)));
            }
            Err(e) => return Err(e),
        };
        let report = parse_report(&reply.text);
        tracing::info!(topic, model = %reply.model, summary = report.summary.len(), "Report synthesized");
        Ok(SynthesisOutcome::Model(report))
    }
}

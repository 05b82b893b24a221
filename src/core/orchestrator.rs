//! 研究工作流编排器：状态机驱动与主控循环
//!
//! ResearchWorkflow 持有 ResearchService、会话持久化与状态机；每个操作在锁内校验迁移、
//! 在锁外等待模型调用、回到锁内先检查关注令牌再写回。所有迁移同时写入持久化快照并通过 watch 通道发布。
//! spawn_workflow 建立 cmd/state 两通道，后台任务消费命令（长操作各自 spawn，reset 可随时插入）。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::config::{load_config, AppConfig, SessionBackend};
use crate::core::{
    RecoveryEngine, ResearchError, ResearchEvent, ResearchState, SessionSupervisor, Visibility,
    VisibilityAdvisory, VisibilityMonitor, WorkflowSnapshot,
};
use crate::llm::{
    create_deepseek_client, GenerationClient, MockGenerationClient, OpenAiGenerationClient,
    ResponseCache, RetryExecutor,
};
use crate::research::{
    progress_percent, FinalReport, ResearchProgress, ResearchService, Source, Subtopic,
    SubtopicStatus,
};
use crate::session::{
    ChatMessage, FileStore, KeyValueStore, MemoryStore, ResearchSession, Role, SessionPersistence,
    SqliteStore, SubtopicUpdate,
};

/// 从视图层发往编排器的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交研究主题（IDLE → PLANNING）
    SubmitTopic(String),
    /// 计划审阅阶段的反馈
    Feedback(String),
    /// 批准计划，开始研究
    Approve,
    /// 继续已恢复的会话
    Resume,
    /// 放弃当前会话
    Reset,
    /// 退出主控循环
    Quit,
}

/// 锁内的工作流状态（权威副本）
struct WorkflowState {
    state: ResearchState,
    topic: Option<String>,
    subtopics: Vec<Subtopic>,
    sources: Vec<Source>,
    chat_history: Vec<ChatMessage>,
    report: Option<FinalReport>,
    error_message: Option<String>,
    persistence: SessionPersistence,
}

impl WorkflowState {
    fn new(persistence: SessionPersistence) -> Self {
        Self {
            state: ResearchState::Idle,
            topic: None,
            subtopics: Vec::new(),
            sources: Vec::new(),
            chat_history: Vec::new(),
            report: None,
            error_message: None,
            persistence,
        }
    }

    fn clear(&mut self) {
        self.state = ResearchState::Idle;
        self.topic = None;
        self.subtopics.clear();
        self.sources.clear();
        self.chat_history.clear();
        self.report = None;
        self.error_message = None;
    }

    fn transition(&mut self, event: ResearchEvent) -> Result<ResearchState, ResearchError> {
        let next = self.state.next(event)?;
        tracing::info!(from = %self.state, to = %next, ?event, "Research state transition");
        self.state = next;
        Ok(next)
    }

    fn progress(&self) -> u8 {
        progress_percent(&self.subtopics)
    }

    fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state,
            topic: self.topic.clone(),
            subtopics: self.subtopics.clone(),
            sources: self.sources.clone(),
            chat_history: self.chat_history.clone(),
            report: self.report.clone(),
            error_message: self.error_message.clone(),
            progress: self.progress(),
        }
    }

    /// 持久化失败按降级处理：记录警告，内存中的流程继续
    fn persist<E>(&mut self, op: impl FnOnce(&mut SessionPersistence) -> Result<(), E>)
    where
        E: Into<ResearchError>,
    {
        if let Err(e) = op(&mut self.persistence) {
            let e: ResearchError = e.into();
            tracing::warn!(error = %e, "Failed to persist research session");
        }
    }

    fn say(&mut self, role: Role, content: String) {
        self.persist(|p| p.add_chat_message(role, content.clone()));
        self.chat_history.push(ChatMessage { role, content });
    }
}

fn plan_message(header: &str, titles: &[String]) -> String {
    let mut message = format!("{header}\n");
    for (i, title) in titles.iter().enumerate() {
        message.push_str(&format!("{}. {}\n", i + 1, title));
    }
    message.push_str("Reply with feedback to refine the plan, or approve it to start research.");
    message
}

/// 研究工作流（可克隆的共享句柄）
#[derive(Clone)]
pub struct ResearchWorkflow {
    service: Arc<ResearchService>,
    inner: Arc<Mutex<WorkflowState>>,
    snapshot_tx: Arc<watch::Sender<WorkflowSnapshot>>,
    supervisor: Arc<SessionSupervisor>,
    recovery: RecoveryEngine,
    visibility: VisibilityMonitor,
}

impl ResearchWorkflow {
    pub fn new(service: ResearchService, persistence: SessionPersistence) -> Self {
        let (snapshot_tx, _) = watch::channel(WorkflowSnapshot::default());
        Self {
            service: Arc::new(service),
            inner: Arc::new(Mutex::new(WorkflowState::new(persistence))),
            snapshot_tx: Arc::new(snapshot_tx),
            supervisor: Arc::new(SessionSupervisor::new()),
            recovery: RecoveryEngine::new(),
            visibility: VisibilityMonitor::new(),
        }
    }

    pub fn service(&self) -> &ResearchService {
        &self.service
    }

    pub fn visibility_monitor(&self) -> &VisibilityMonitor {
        &self.visibility
    }

    /// 当前快照
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// 订阅快照变化
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self, st: &WorkflowState) {
        if !st.state.agrees_with(&st.subtopics) {
            tracing::warn!(state = %st.state, "Research state disagrees with subtopic statuses");
        }
        self.snapshot_tx.send_replace(st.snapshot());
    }

    async fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.inner.lock().await
    }

    /// 锁内：令牌已取消则丢弃结果
    fn ensure_interest(interest: &CancellationToken) -> Result<(), ResearchError> {
        if interest.is_cancelled() {
            tracing::info!("Session was reset while a model call was in flight; discarding result");
            return Err(ResearchError::Discarded);
        }
        Ok(())
    }

    /// 致命失败：按当前状态迁移（PLANNING / SYNTHESIZING → ERROR），附带恢复说明
    fn fail(&self, st: &mut WorkflowState, err: ResearchError) -> ResearchError {
        let action = self.recovery.handle(&err);
        tracing::error!(state = %st.state, error = %err, "Research step failed");
        if st.transition(ResearchEvent::Failure).is_ok() {
            let state = st.state;
            st.persist(|p| p.update_research_state(state));
        }
        st.error_message = Some(action.message().to_string());
        self.publish(st);
        err
    }

    /// 提交主题：清空上一会话的所有数据后生成计划
    pub async fn submit_topic(&self, topic: &str) -> Result<(), ResearchError> {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            return Ok(());
        }

        let interest = {
            let mut st = self.lock().await;
            st.state.next(ResearchEvent::SubmitTopic)?;
            st.clear();
            st.persist(|p| p.clear_session());
            st.topic = Some(topic.clone());
            st.transition(ResearchEvent::SubmitTopic)?;
            self.publish(&st);
            self.supervisor.begin_session()
        };

        let result = self.service.create_plan(&topic).await;

        let mut st = self.lock().await;
        Self::ensure_interest(&interest)?;
        match result {
            Ok(titles) => {
                st.transition(ResearchEvent::PlanReady)?;
                st.subtopics = Subtopic::from_titles(&titles);
                st.persist(|p| p.create_session(&topic, &titles));
                st.say(Role::Assistant, plan_message("Here is the proposed research plan:", &titles));
                self.publish(&st);
                Ok(())
            }
            Err(e) => Err(self.fail(&mut st, e)),
        }
    }

    /// 计划反馈：精炼失败时追加占位条目并回到审阅，错误作为聊天消息展示
    pub async fn send_feedback(&self, feedback: &str) -> Result<(), ResearchError> {
        let feedback = feedback.trim().to_string();
        if feedback.is_empty() {
            return Ok(());
        }

        let (topic, plan, interest) = {
            let mut st = self.lock().await;
            st.state.next(ResearchEvent::UserFeedback)?;
            st.say(Role::User, feedback.clone());
            let state = st.transition(ResearchEvent::UserFeedback)?;
            st.persist(|p| p.update_research_state(state));
            self.publish(&st);
            let plan: Vec<String> = st.subtopics.iter().map(|s| s.title.clone()).collect();
            (st.topic.clone().unwrap_or_default(), plan, self.supervisor.interest())
        };

        let refined = self.service.refine_plan(&topic, &plan, &feedback).await;

        let mut st = self.lock().await;
        Self::ensure_interest(&interest)?;
        let (event, message) = match &refined.degraded {
            None => (ResearchEvent::Refined, plan_message("Updated research plan:", &refined.titles)),
            Some(reason) => (
                ResearchEvent::Failure,
                format!(
                    "The plan could not be refined ({reason}). Your feedback was added as a new section; \
                     you can send more feedback or approve the plan."
                ),
            ),
        };
        let state = st.transition(event)?;
        st.subtopics = Subtopic::from_titles(&refined.titles);
        st.persist(|p| p.replace_plan(&refined.titles));
        st.persist(|p| p.update_research_state(state));
        let role = if refined.degraded.is_some() { Role::System } else { Role::Assistant };
        st.say(role, message);
        self.publish(&st);
        Ok(())
    }

    /// 批准计划：顺序研究所有子主题，然后合成报告
    pub async fn approve(&self) -> Result<(), ResearchError> {
        let (topic, interest) = {
            let mut st = self.lock().await;
            let state = st.transition(ResearchEvent::Approve)?;
            st.persist(|p| p.update_research_state(state));
            self.publish(&st);
            (st.topic.clone().unwrap_or_default(), self.supervisor.interest())
        };
        self.run_research(&topic, interest).await
    }

    async fn run_research(&self, topic: &str, interest: CancellationToken) -> Result<(), ResearchError> {
        let (mut subtopics, mut sources) = {
            let st = self.lock().await;
            (st.subtopics.clone(), st.sources.clone())
        };

        let sink = WorkflowProgress {
            workflow: self,
            interest: &interest,
        };
        if let Err(e) = self
            .service
            .research_all(topic, &mut subtopics, &mut sources, &interest, &sink)
            .await
        {
            let mut st = self.lock().await;
            Self::ensure_interest(&interest)?;
            return Err(self.fail(&mut st, e));
        }

        {
            // 恢复时所有子主题可能已完成，此时没有 settle 回调推进状态
            let mut st = self.lock().await;
            Self::ensure_interest(&interest)?;
            if st.state == ResearchState::Researching {
                let state = st.transition(ResearchEvent::AllSubtopicsSettled)?;
                st.persist(|p| p.update_research_state(state));
                self.publish(&st);
            }
        }

        self.run_synthesis(topic, &subtopics, interest).await
    }

    async fn run_synthesis(
        &self,
        topic: &str,
        subtopics: &[Subtopic],
        interest: CancellationToken,
    ) -> Result<(), ResearchError> {
        let result = self.service.synthesize_report(topic, subtopics).await;

        let mut st = self.lock().await;
        Self::ensure_interest(&interest)?;
        match result {
            Ok(outcome) => {
                let event = if outcome.is_diagnostic() {
                    ResearchEvent::NoUsableContent
                } else {
                    ResearchEvent::ReportReady
                };
                let state = st.transition(event)?;
                st.report = Some(outcome.into_report());
                st.persist(|p| p.update_research_state(state));
                self.publish(&st);
                Ok(())
            }
            Err(e) => Err(self.fail(&mut st, e)),
        }
    }

    /// 放弃当前会话；进行中的调用照常完成，但结果不会写回
    pub async fn reset(&self) {
        self.supervisor.discard();
        let mut st = self.lock().await;
        let from = st.state;
        st.clear();
        st.persist(|p| p.clear_session());
        self.publish(&st);
        tracing::info!(from = %from, "Research session reset");
    }

    /// 读取存储中的会话并载入工作流；只有仍在进行中的会话会被提供
    pub async fn resume(&self) -> Result<Option<ResearchSession>, ResearchError> {
        let mut st = self.lock().await;
        if st.state != ResearchState::Idle {
            return Ok(None);
        }
        let Some(session) = st.persistence.restore()? else {
            return Ok(None);
        };
        if !session.research_state.is_in_flight() {
            st.persist(|p| p.clear_session());
            return Ok(None);
        }

        st.state = session.research_state;
        st.topic = Some(session.topic.clone());
        st.subtopics = session.subtopics.clone();
        st.chat_history = session.chat_history.clone();
        st.sources = Vec::new();
        for subtopic in &session.subtopics {
            if let Some(sources) = &subtopic.sources {
                crate::research::merge_sources(&mut st.sources, sources);
            }
        }
        self.publish(&st);
        Ok(Some(session))
    }

    /// 从恢复的状态继续：研究中 → 继续未完成的子主题；合成中 → 重新合成；精炼中 → 回到审阅
    pub async fn continue_session(&self) -> Result<(), ResearchError> {
        let (state, topic, subtopics, interest) = {
            let mut st = self.lock().await;
            let interest = self.supervisor.begin_session();
            if st.state == ResearchState::RefiningPlan {
                let state = st.transition(ResearchEvent::Failure)?;
                st.persist(|p| p.update_research_state(state));
                st.say(
                    Role::System,
                    "Plan refinement was interrupted. Send the feedback again or approve the plan.".to_string(),
                );
                self.publish(&st);
            }
            (st.state, st.topic.clone().unwrap_or_default(), st.subtopics.clone(), interest)
        };

        match state {
            ResearchState::Researching => self.run_research(&topic, interest).await,
            ResearchState::Synthesizing => self.run_synthesis(&topic, &subtopics, interest).await,
            _ => Ok(()),
        }
    }

    /// 视图可见性变化；进行中的研究离开时返回提示
    pub async fn set_visibility(&self, visibility: Visibility) -> Option<VisibilityAdvisory> {
        let st = self.lock().await;
        self.visibility.set_visibility(visibility, &st.persistence)
    }
}

/// 逐项研究的观察者：把每一步的快照写入权威状态与持久化
struct WorkflowProgress<'a> {
    workflow: &'a ResearchWorkflow,
    interest: &'a CancellationToken,
}

#[async_trait]
impl<'a> ResearchProgress for WorkflowProgress<'a> {
    async fn on_subtopic(&self, index: usize, subtopic: &Subtopic, sources: &[Source]) {
        let mut st = self.workflow.lock().await;
        if self.interest.is_cancelled() || index >= st.subtopics.len() {
            return;
        }
        st.subtopics[index] = subtopic.clone();
        st.sources = sources.to_vec();

        let update = SubtopicUpdate {
            status: subtopic.status,
            content: subtopic.content.clone(),
            sources: subtopic.sources.clone(),
            error: subtopic.error.clone(),
        };
        let settled = subtopic.status == SubtopicStatus::Complete
            && st.subtopics.iter().all(Subtopic::is_complete);
        if settled && st.state == ResearchState::Researching {
            // 最后一个子主题与 SYNTHESIZING 在同一次写入中落盘
            match st.transition(ResearchEvent::AllSubtopicsSettled) {
                Ok(state) => st.persist(|p| p.update_subtopic_and_state(index, update, state)),
                Err(e) => tracing::warn!(error = %e, "Could not advance to synthesis"),
            }
        } else {
            st.persist(|p| p.update_subtopic_status(index, update));
        }
        self.workflow.publish(&st);
    }
}

/// 根据配置与环境变量选择生成后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_client_from_config(cfg: &AppConfig) -> Arc<dyn GenerationClient> {
    let base_url = cfg.llm.base_url.as_deref();
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::info!("Using mock generation client");
            Arc::new(MockGenerationClient)
        }
        "openai" => {
            tracing::info!(base_url = ?base_url, "Using OpenAI-compatible generation client");
            Arc::new(OpenAiGenerationClient::from_env(base_url, cfg.request_timeout()))
        }
        other => {
            if other != "deepseek" {
                tracing::warn!(provider = other, "Unknown provider; falling back to DeepSeek");
            }
            tracing::info!("Using DeepSeek generation client");
            Arc::new(create_deepseek_client(base_url, cfg.request_timeout()))
        }
    }
}

/// 根据 [session] 段创建会话存储后端
pub fn create_store_from_config(cfg: &AppConfig) -> Result<Arc<dyn KeyValueStore>, ResearchError> {
    let path = cfg.session_path();
    let store: Arc<dyn KeyValueStore> = match cfg.session.backend {
        SessionBackend::Memory => Arc::new(MemoryStore::new()),
        SessionBackend::File => Arc::new(FileStore::new(&path)),
        SessionBackend::Sqlite => Arc::new(SqliteStore::open(&path)?),
    };
    tracing::info!(backend = ?cfg.session.backend, path = %path.display(), "Session store ready");
    Ok(store)
}

/// 按配置组装完整工作流
pub fn build_workflow(cfg: &AppConfig, client: Arc<dyn GenerationClient>) -> Result<ResearchWorkflow, ResearchError> {
    let service = ResearchService::new(client, cfg.strategy_table()?)
        .with_cache(ResponseCache::new(cfg.cache_ttl()))
        .with_retry(RetryExecutor::new(cfg.retry.max_retries, cfg.base_delay()))
        .with_thresholds(cfg.thresholds());
    let persistence =
        SessionPersistence::new(create_store_from_config(cfg)?).with_expiry(cfg.session_expiry());
    Ok(ResearchWorkflow::new(service, persistence))
}

/// 加载配置并创建工作流；配置加载失败时使用默认值
pub fn create_workflow(config_path: Option<PathBuf>) -> Result<(ResearchWorkflow, AppConfig), ResearchError> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let client = create_client_from_config(&cfg);
    Ok((build_workflow(&cfg, client)?, cfg))
}

fn log_outcome(step: &str, result: Result<(), ResearchError>) {
    match result {
        Ok(()) => {}
        Err(ResearchError::Discarded) => tracing::debug!(step, "Step result discarded after reset"),
        Err(e @ ResearchError::InvalidTransition { .. }) => tracing::warn!(step, error = %e, "Command ignored"),
        // 其余错误已在快照的 error_message 中呈现
        Err(e) => tracing::debug!(step, error = %e, "Step failed"),
    }
}

/// 启动主控循环：返回命令发送端与快照接收端
pub fn spawn_workflow(
    workflow: ResearchWorkflow,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<WorkflowSnapshot>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let state_rx = workflow.subscribe();

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let wf = workflow.clone();
            match cmd {
                Command::SubmitTopic(topic) => {
                    tokio::spawn(async move { log_outcome("submit_topic", wf.submit_topic(&topic).await) });
                }
                Command::Feedback(feedback) => {
                    tokio::spawn(async move { log_outcome("feedback", wf.send_feedback(&feedback).await) });
                }
                Command::Approve => {
                    tokio::spawn(async move { log_outcome("approve", wf.approve().await) });
                }
                Command::Resume => {
                    tokio::spawn(async move { log_outcome("resume", wf.continue_session().await) });
                }
                Command::Reset => wf.reset().await,
                Command::Quit => break,
            }
        }
        tracing::debug!("Workflow command loop stopped");
    });

    (cmd_tx, state_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::llm::{LlmError, RecordingSleeper, ScriptedGenerationClient, StrategyTable, TaskCategory};

    fn workflow_with(client: Arc<dyn GenerationClient>, store: Arc<dyn KeyValueStore>) -> ResearchWorkflow {
        let retry = RetryExecutor::default().with_sleeper(Arc::new(RecordingSleeper::default()));
        let service = ResearchService::new(client, StrategyTable::default()).with_retry(retry);
        let persistence = SessionPersistence::new(store).with_clock(Arc::new(ManualClock::new(0)));
        ResearchWorkflow::new(service, persistence)
    }

    #[tokio::test]
    async fn test_approve_rejected_outside_plan_review() {
        let wf = workflow_with(Arc::new(ScriptedGenerationClient::mock()), Arc::new(MemoryStore::new()));
        let err = wf.approve().await.unwrap_err();
        assert!(matches!(err, ResearchError::InvalidTransition { from: ResearchState::Idle, .. }));
        assert_eq!(wf.snapshot().state, ResearchState::Idle);
    }

    #[tokio::test]
    async fn test_planning_failure_reaches_error_with_message() {
        let client = Arc::new(ScriptedGenerationClient::new(|_| {
            Err(LlmError::MissingCredential("DEEPSEEK_API_KEY".into()))
        }));
        let wf = workflow_with(client.clone(), Arc::new(MemoryStore::new()));

        assert!(wf.submit_topic("Group Theory").await.is_err());
        let snapshot = wf.snapshot();
        assert_eq!(snapshot.state, ResearchState::Error);
        assert!(snapshot.error_message.unwrap().contains("API key"));
        assert_eq!(client.calls().len(), 1);

        // ERROR 只能 reset
        assert!(wf.submit_topic("again").await.is_err());
        wf.reset().await;
        assert_eq!(wf.snapshot().state, ResearchState::Idle);
    }

    #[tokio::test]
    async fn test_refinement_failure_returns_to_review_with_placeholder() {
        let client = Arc::new(ScriptedGenerationClient::new(|req| match req.task {
            TaskCategory::Refinement => Err(LlmError::Service("overloaded".into())),
            _ => Ok(r#"{"plan": ["A", "B", "C", "D", "E"]}"#.into()),
        }));
        let wf = workflow_with(client, Arc::new(MemoryStore::new()));
        wf.submit_topic("T").await.unwrap();
        wf.send_feedback("cover history").await.unwrap();

        let snapshot = wf.snapshot();
        assert_eq!(snapshot.state, ResearchState::PlanReview);
        assert_eq!(snapshot.plan().last().unwrap(), "Additional focus: cover history");
        let last = snapshot.chat_history.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.contains("could not be refined"));
    }

    #[tokio::test]
    async fn test_synthesis_outage_still_reaches_done_with_report() {
        let client = Arc::new(ScriptedGenerationClient::new(|req| match req.task {
            TaskCategory::Planning => Ok(r#"{"plan": ["A", "B", "C", "D", "E"]}"#.into()),
            TaskCategory::Synthesis => Err(LlmError::RateLimited("429".into())),
            _ => Ok(r#"{"content": "Findings that survive the outage.", "sources": []}"#.into()),
        }));
        let store = Arc::new(MemoryStore::new());
        let wf = workflow_with(client.clone(), store.clone());

        wf.submit_topic("T").await.unwrap();
        wf.approve().await.unwrap();

        let snapshot = wf.snapshot();
        assert_eq!(snapshot.state, ResearchState::Done);
        assert!(snapshot.error_message.is_none());
        let report = snapshot.report.unwrap();
        assert!(report.report.contains("Findings that survive the outage."));
        assert_eq!(client.call_count(TaskCategory::Synthesis), 3);

        let raw = store.get(crate::session::SESSION_KEY).unwrap().unwrap();
        let stored: ResearchSession = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.research_state, ResearchState::Done);
    }

    #[tokio::test]
    async fn test_snapshot_progress_tracks_subtopics() {
        let wf = workflow_with(Arc::new(ScriptedGenerationClient::mock()), Arc::new(MemoryStore::new()));
        let mut rx = wf.subscribe();
        wf.submit_topic("Group Theory").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, ResearchState::PlanReview);

        wf.approve().await.unwrap();
        let snapshot = wf.snapshot();
        assert_eq!(snapshot.state, ResearchState::Done);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.report.is_some());
    }

    #[tokio::test]
    async fn test_command_loop_drives_workflow() {
        let wf = workflow_with(Arc::new(ScriptedGenerationClient::mock()), Arc::new(MemoryStore::new()));
        let (cmd_tx, mut state_rx) = spawn_workflow(wf);

        cmd_tx.send(Command::SubmitTopic("Group Theory".into())).unwrap();
        state_rx
            .wait_for(|s| s.state == ResearchState::PlanReview)
            .await
            .unwrap();
        cmd_tx.send(Command::Approve).unwrap();
        let done = state_rx.wait_for(|s| s.state == ResearchState::Done).await.unwrap();
        assert!(done.subtopics.iter().all(Subtopic::is_complete));
        drop(done);
        cmd_tx.send(Command::Quit).unwrap();
    }
}

//! deepdive - 研究编排引擎命令行
//!
//! 入口：初始化日志、加载配置并创建工作流，提供恢复未完成的会话，然后运行行式 REPL：
//! 输入主题开始研究，计划审阅阶段输入反馈，`/approve` 批准，`/reset` 放弃，`/stats` 查看诊断，`/quit` 退出。

use std::path::PathBuf;

use anyhow::Context;
use deepdive::core::{create_workflow, spawn_workflow, Command, ResearchState, Visibility, WorkflowSnapshot};
use deepdive::research::SubtopicStatus;
use deepdive::session::Role;
use deepdive::{observability, ResearchWorkflow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

fn main() -> anyhow::Result<()> {
    observability::init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(run())
}

/// 已经打印过的内容，避免重复输出
#[derive(Default)]
struct View {
    state: Option<ResearchState>,
    chat_len: usize,
    statuses: Vec<SubtopicStatus>,
    report_shown: bool,
}

fn print_help() {
    println!("Commands:");
    println!("  <text>     submit a topic (idle) or send feedback on the plan (plan review)");
    println!("  /approve   approve the plan and start research");
    println!("  /reset     discard the current session");
    println!("  /stats     show model performance and cache statistics");
    println!("  /quit      exit");
}

fn render(snapshot: &WorkflowSnapshot, view: &mut View) {
    if view.state != Some(snapshot.state) {
        view.state = Some(snapshot.state);
        match &snapshot.topic {
            Some(topic) => println!("\n[{}] {}", snapshot.state, topic),
            None => println!("\n[{}]", snapshot.state),
        }
        if snapshot.state == ResearchState::Idle {
            view.chat_len = 0;
            view.statuses.clear();
            view.report_shown = false;
            println!("Enter a research topic.");
        }
    }

    for message in snapshot.chat_history.iter().skip(view.chat_len) {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "planner",
            Role::System => "notice",
        };
        println!("{who}> {}", message.content);
    }
    view.chat_len = snapshot.chat_history.len();

    let researching = matches!(
        snapshot.state,
        ResearchState::Researching | ResearchState::Synthesizing | ResearchState::Done
    );
    if researching {
        view.statuses.resize(snapshot.subtopics.len(), SubtopicStatus::Pending);
        let total = snapshot.subtopics.len();
        for (i, subtopic) in snapshot.subtopics.iter().enumerate() {
            if view.statuses[i] == subtopic.status || subtopic.status == SubtopicStatus::Pending {
                continue;
            }
            view.statuses[i] = subtopic.status;
            match (&subtopic.status, &subtopic.error) {
                (SubtopicStatus::Complete, Some(error)) => {
                    println!("  [{}/{}] {} failed: {}", i + 1, total, subtopic.title, error)
                }
                (status, _) => println!("  [{}/{}] {} {}", i + 1, total, subtopic.title, status),
            }
        }
    }

    if snapshot.state == ResearchState::Done && !view.report_shown {
        if let Some(report) = &snapshot.report {
            println!("\nSummary:");
            for point in &report.summary {
                println!("  - {point}");
            }
            println!("\n{}", report.report);
            println!("\nSources: {}", snapshot.sources.len());
            for source in &snapshot.sources {
                println!("  {} <{}>", source.title, source.uri);
            }
            println!("\nUse /reset to start a new topic.");
            view.report_shown = true;
        }
    }

    if snapshot.state == ResearchState::Error {
        if let Some(message) = &snapshot.error_message {
            println!("error> {message}");
        }
        println!("Use /reset to start over.");
    }
}

async fn print_stats(workflow: &ResearchWorkflow) {
    let stats = workflow.service().performance_stats().await;
    println!("Model performance:");
    if stats.is_empty() {
        println!("  (no requests yet)");
    }
    for (model, view) in &stats {
        println!(
            "  {model}: {} requests, {} success, avg {:.0} ms",
            view.stats.total_requests, view.success_rate, view.stats.avg_response_time_ms
        );
    }
    let cache = workflow.service().cache_stats().await;
    println!("Cache: {} entries ({} valid, {} expired)", cache.total, cache.valid, cache.expired);
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (workflow, cfg) = create_workflow(config_path).context("Failed to create research workflow")?;

    let shutdown = CancellationToken::new();
    let sweeper = workflow
        .service()
        .cache()
        .spawn_sweeper(cfg.sweep_interval(), shutdown.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut resume = false;
    let restored = workflow.resume().await.context("Failed to read stored session")?;
    if let Some(session) = &restored {
        println!(
            "Found an unfinished research session on \"{}\" ({}% complete, {}).",
            session.topic,
            session.progress(),
            session.research_state
        );
        println!("Resume it? [Y/n]");
        let answer = lines.next_line().await?.unwrap_or_default();
        resume = !answer.trim().to_lowercase().starts_with('n');
    }

    let (cmd_tx, mut state_rx) = spawn_workflow(workflow.clone());
    if resume {
        cmd_tx.send(Command::Resume)?;
    } else if restored.is_some() {
        cmd_tx.send(Command::Reset)?;
    }

    print_help();
    let mut view = View::default();
    render(&state_rx.borrow_and_update(), &mut view);

    let mut backgrounded = false;
    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state_rx.borrow_and_update().clone();
                render(&snapshot, &mut view);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if backgrounded {
                    workflow.set_visibility(Visibility::Foreground).await;
                    backgrounded = false;
                }
                let input = line.trim();
                match input {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/help" => print_help(),
                    "/approve" => cmd_tx.send(Command::Approve)?,
                    "/reset" => cmd_tx.send(Command::Reset)?,
                    "/stats" => print_stats(&workflow).await,
                    text => {
                        let state = state_rx.borrow().state;
                        match state {
                            ResearchState::Idle => cmd_tx.send(Command::SubmitTopic(text.to_string()))?,
                            ResearchState::PlanReview => cmd_tx.send(Command::Feedback(text.to_string()))?,
                            other => println!("Busy ({other}); wait for the current step or use /reset."),
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                // 研究进行中的第一次 Ctrl+C 视为离开：提示进度已保存，不中断研究
                if !backgrounded {
                    if let Some(advisory) = workflow.set_visibility(Visibility::Background).await {
                        println!("\nnotice> {}", advisory.message);
                        println!("Press Ctrl+C again to quit, or type anything to stay.");
                        backgrounded = true;
                        continue;
                    }
                }
                break;
            }
        }
    }

    let _ = cmd_tx.send(Command::Quit);
    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}

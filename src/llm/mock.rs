//! Mock 生成客户端（用于测试与离线演示，无需 API）
//!
//! - MockGenerationClient：按任务类别返回确定性的 JSON，能完整跑通 计划 → 精炼 → 研究 → 合成。
//! - ScriptedGenerationClient：由闭包决定每次返回，记录所有请求，可按请求注入延迟。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{GenerationClient, GenerationRequest, LlmError, TaskCategory};
use crate::research::prompts::{list_section, prompt_field};

const ASPECTS: [&str; 6] = [
    "Historical background",
    "Core definitions",
    "Key results",
    "Methods and techniques",
    "Applications",
    "Open problems",
];

/// 确定性 Mock：不访问网络
#[derive(Debug, Default)]
pub struct MockGenerationClient;

fn slug(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// "add a section on symmetry groups" -> "Symmetry groups"
fn title_from_feedback(feedback: &str) -> String {
    let focus = feedback
        .split_once(" on ")
        .map(|(_, rest)| rest)
        .unwrap_or(feedback)
        .trim()
        .trim_end_matches('.');
    let mut chars = focus.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Additional focus".to_string(),
    }
}

impl MockGenerationClient {
    fn respond(&self, request: &GenerationRequest) -> serde_json::Value {
        let prompt = &request.prompt;
        let topic = prompt_field(prompt, "Topic").unwrap_or("the topic");
        match request.task {
            TaskCategory::Planning => {
                let plan: Vec<String> = ASPECTS.iter().map(|a| format!("{a} of {topic}")).collect();
                json!({ "plan": plan })
            }
            TaskCategory::Refinement => {
                let mut plan = list_section(prompt, "Current plan");
                let feedback = prompt_field(prompt, "Feedback").unwrap_or_default();
                plan.push(title_from_feedback(feedback));
                json!({ "plan": plan })
            }
            TaskCategory::Research => {
                let subtopic = prompt_field(prompt, "Subtopic").unwrap_or("the subtopic");
                json!({
                    "content": format!(
                        "## {subtopic}\n\n{subtopic} is a central part of {topic}. \
                         This section summarizes the main ideas, the standard notation and \
                         the results most often cited in introductory and advanced texts."
                    ),
                    "sources": [
                        { "uri": format!("https://example.org/{}/{}", slug(topic), slug(subtopic)), "title": subtopic },
                        { "uri": format!("https://example.org/{}/overview", slug(topic)), "title": format!("{topic} overview") },
                    ],
                })
            }
            TaskCategory::Synthesis => {
                let sections = list_section(prompt, "Sections");
                let summary: Vec<String> = sections
                    .iter()
                    .take(6)
                    .map(|s| format!("{s} is covered in detail."))
                    .chain(std::iter::repeat("Further reading is listed in the sources.".to_string()))
                    .take(sections.len().clamp(4, 6))
                    .collect();
                let body: String = sections
                    .iter()
                    .map(|s| format!("## {s}\n\nKey findings about {s}.\n\n"))
                    .collect();
                json!({
                    "summary": summary,
                    "report": format!("# {topic}\n\n{body}"),
                })
            }
        }
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        Ok(self.respond(&request).to_string())
    }
}

type Handler = dyn Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync;
type DelayFn = dyn Fn(&GenerationRequest) -> Duration + Send + Sync;

/// 可编排的测试客户端
pub struct ScriptedGenerationClient {
    handler: Box<Handler>,
    delay: Option<Box<DelayFn>>,
    calls: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedGenerationClient {
    pub fn new(
        handler: impl Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 委托给 MockGenerationClient，但仍记录请求
    pub fn mock() -> Self {
        let mock = MockGenerationClient;
        Self::new(move |req| Ok(mock.respond(req).to_string()))
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&GenerationRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    /// 已收到的请求（按到达顺序）
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self, task: TaskCategory) -> usize {
        self.calls().iter().filter(|c| c.task == task).count()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(&request)).await;
        }
        (self.handler)(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ResponseFormat;
    use crate::research::prompts;

    fn request(task: TaskCategory, prompt: String) -> GenerationRequest {
        GenerationRequest {
            task,
            model: "mock".into(),
            prompt,
            max_tokens: 100,
            temperature: 0.0,
            response_format: ResponseFormat::Json,
        }
    }

    #[tokio::test]
    async fn test_mock_plan_has_six_titles() {
        let out = MockGenerationClient
            .generate(request(TaskCategory::Planning, prompts::plan_prompt("Group Theory")))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["plan"].as_array().unwrap().len(), 6);
        assert!(out.contains("Group Theory"));
    }

    #[tokio::test]
    async fn test_mock_refinement_appends_feedback_title() {
        let plan = vec!["A".to_string(), "B".to_string()];
        let prompt = prompts::refine_prompt("T", &plan, "add a section on symmetry groups");
        let out = MockGenerationClient
            .generate(request(TaskCategory::Refinement, prompt))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["plan"], json!(["A", "B", "Symmetry groups"]));
    }

    #[tokio::test]
    async fn test_scripted_records_calls() {
        let client = ScriptedGenerationClient::new(|_| Err(LlmError::Service("down".into())));
        let result = client
            .generate(request(TaskCategory::Research, "x".into()))
            .await;
        assert!(result.is_err());
        assert_eq!(client.call_count(TaskCategory::Research), 1);
        assert_eq!(client.call_count(TaskCategory::Planning), 0);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Group Theory: Basics"), "group-theory-basics");
    }
}

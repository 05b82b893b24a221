//! 最小化 Prompt 构造
//!
//! 只负责把结构化输入排成固定的「字段行 + 列表段」格式，并附上期望输出的 JSON Schema；
//! 措辞本身不是编排层关心的内容。

use schemars::{schema_for, JsonSchema};

use crate::research::parse::{PlanPayload, ReportPayload};
use crate::research::{Subtopic, SubtopicFindings};

fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn push_list(out: &mut String, header: &str, items: &[String]) {
    out.push_str(header);
    out.push_str(":\n");
    for item in items {
        out.push_str("- ");
        out.push_str(item);
        out.push('\n');
    }
    out.push('\n');
}

fn with_schema<T: JsonSchema>(mut body: String) -> String {
    body.push_str("Respond with a single JSON object matching this schema:\n");
    body.push_str(&schema_json::<T>());
    body
}

pub fn plan_prompt(topic: &str) -> String {
    with_schema::<PlanPayload>(format!(
        "Create a research plan of 5 to 7 subtopics.\nTopic: {topic}\n\n"
    ))
}

pub fn refine_prompt(topic: &str, current_plan: &[String], feedback: &str) -> String {
    let mut body = format!(
        "Revise the research plan according to the feedback. Keep 5 to 7 subtopics.\nTopic: {topic}\nFeedback: {feedback}\n\n"
    );
    push_list(&mut body, "Current plan", current_plan);
    with_schema::<PlanPayload>(body)
}

pub fn research_prompt(subtopic: &str, main_topic: &str) -> String {
    with_schema::<SubtopicFindings>(format!(
        "Research the subtopic in the context of the main topic. Cite sources.\nTopic: {main_topic}\nSubtopic: {subtopic}\n\n"
    ))
}

pub fn synthesis_prompt(topic: &str, subtopics: &[&Subtopic]) -> String {
    let titles: Vec<String> = subtopics.iter().map(|s| s.title.clone()).collect();
    let mut body = format!(
        "Write a final report with 4 to 6 summary points and a markdown body.\nTopic: {topic}\n\n"
    );
    push_list(&mut body, "Sections", &titles);
    for subtopic in subtopics {
        body.push_str("### ");
        body.push_str(&subtopic.title);
        body.push('\n');
        body.push_str(subtopic.content.as_deref().unwrap_or_default().trim());
        body.push_str("\n\n");
    }
    with_schema::<ReportPayload>(body)
}

/// 读取 "Name: value" 字段行
pub fn prompt_field<'a>(prompt: &'a str, name: &str) -> Option<&'a str> {
    prompt.lines().find_map(|line| {
        line.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

/// 读取 "Header:" 之后的 "- item" 列表，直到空行
pub fn list_section(prompt: &str, header: &str) -> Vec<String> {
    let marker = format!("{header}:");
    prompt
        .lines()
        .skip_while(|line| line.trim() != marker)
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.trim().strip_prefix("- ").map(str::to_string))
        .collect()
}

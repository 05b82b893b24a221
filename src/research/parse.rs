//! 模型输出解析
//!
//! 从文本中提取 JSON（```json ... ``` 代码块或首个 { 到最后一个 }），解析为期望结构；
//! 解析失败时退回原文（研究内容 / 报告正文），不让整个操作失败。

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::research::{FinalReport, SubtopicFindings};

/// 计划最多保留的条目数
pub const MAX_PLAN_LEN: usize = 7;
/// 计划期望的最少条目数（不足时只记录警告）
pub const MIN_PLAN_LEN: usize = 5;
/// 摘要最多保留的条目数
pub const MAX_SUMMARY_LEN: usize = 6;

/// 计划输出格式
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanPayload {
    /// 5 到 7 个子主题标题，按研究顺序排列
    pub plan: Vec<String>,
}

/// 报告输出格式
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReportPayload {
    /// 4 到 6 条要点
    pub summary: Vec<String>,
    /// Markdown 正文
    pub report: String,
}

/// 提取 JSON 片段；没有候选时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    (end > start).then(|| &trimmed[start..=end])
}

fn list_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "1. " / "2) " / "- " / "* " / "• "
    RE.get_or_init(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").expect("valid regex"))
}

/// 去掉编号、列表符号、Markdown 强调与首尾引号
fn clean_title(line: &str) -> String {
    let stripped = list_marker().replace(line, "");
    stripped
        .trim()
        .trim_matches(|c| c == '*' || c == '"' || c == '#')
        .trim()
        .to_string()
}

/// 清洗计划：去空、去重（忽略大小写）、最多 MAX_PLAN_LEN 条
pub fn normalize_plan<I, S>(titles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut plan: Vec<String> = Vec::new();
    for title in titles {
        let title = clean_title(title.as_ref());
        if title.is_empty() || plan.iter().any(|p| p.eq_ignore_ascii_case(&title)) {
            continue;
        }
        plan.push(title);
        if plan.len() == MAX_PLAN_LEN {
            break;
        }
    }
    plan
}

/// 解析计划：JSON {"plan": [...]} / 纯数组；否则按行退回
pub fn parse_plan(output: &str) -> Vec<String> {
    if let Some(json) = extract_json(output) {
        if let Ok(payload) = serde_json::from_str::<PlanPayload>(json) {
            return normalize_plan(payload.plan);
        }
        if let Ok(list) = serde_json::from_str::<Vec<String>>(json) {
            return normalize_plan(list);
        }
    }
    tracing::warn!("Plan output is not valid JSON; falling back to line parsing");
    normalize_plan(output.lines().filter(|l| !l.trim_start().starts_with("```")))
}

/// 解析研究结果；格式错误时原文作为 content，来源为空
pub fn parse_findings(output: &str) -> SubtopicFindings {
    extract_json(output)
        .and_then(|json| serde_json::from_str::<SubtopicFindings>(json).ok())
        .unwrap_or_else(|| {
            tracing::warn!("Research output is not valid JSON; using raw text as content");
            SubtopicFindings {
                content: output.trim().to_string(),
                sources: Vec::new(),
            }
        })
}

/// 解析报告；格式错误时原文作为 report，摘要为空
pub fn parse_report(output: &str) -> FinalReport {
    match extract_json(output).and_then(|json| serde_json::from_str::<ReportPayload>(json).ok()) {
        Some(payload) => FinalReport {
            summary: payload
                .summary
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(MAX_SUMMARY_LEN)
                .collect(),
            report: payload.report,
        },
        None => {
            tracing::warn!("Report output is not valid JSON; using raw text as report");
            FinalReport {
                summary: Vec::new(),
                report: output.trim().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_from_fenced_json() {
        let out = "Here you go:\n```json\n{\"plan\": [\"A\", \"B\", \"a\", \" \"]}\n```";
        assert_eq!(parse_plan(out), vec!["A", "B"]);
    }

    #[test]
    fn test_parse_plan_from_bare_array() {
        assert_eq!(parse_plan("[\"x\", \"y\"]"), vec!["x", "y"]);
    }

    #[test]
    fn test_parse_plan_falls_back_to_numbered_lines() {
        let out = "1. **Origins**\n2) Structure\n- \"Symmetry\"\n\n";
        assert_eq!(parse_plan(out), vec!["Origins", "Structure", "Symmetry"]);
    }

    #[test]
    fn test_parse_plan_caps_length() {
        let titles: Vec<String> = (0..10).map(|i| format!("T{i}")).collect();
        let json = serde_json::json!({ "plan": titles }).to_string();
        assert_eq!(parse_plan(&json).len(), MAX_PLAN_LEN);
    }

    #[test]
    fn test_parse_findings_with_sources() {
        let out = r#"{"content": "body", "sources": [{"uri": "https://a", "title": "A"}]}"#;
        let findings = parse_findings(out);
        assert_eq!(findings.content, "body");
        assert_eq!(findings.sources.len(), 1);
    }

    #[test]
    fn test_parse_findings_keeps_empty_content() {
        let findings = parse_findings(r#"{"content": "", "sources": []}"#);
        assert_eq!(findings.content, "");
        assert!(findings.sources.is_empty());
    }

    #[test]
    fn test_parse_findings_malformed_uses_raw_text() {
        let findings = parse_findings("Just prose about {braces without json");
        assert_eq!(findings.content, "Just prose about {braces without json");
        assert!(findings.sources.is_empty());
    }

    #[test]
    fn test_parse_report_caps_summary() {
        let out = serde_json::json!({
            "summary": ["1", "2", "3", "4", "5", "6", "7"],
            "report": "# R"
        })
        .to_string();
        let report = parse_report(&out);
        assert_eq!(report.summary.len(), MAX_SUMMARY_LEN);
        assert_eq!(report.report, "# R");
    }

    #[test]
    fn test_parse_report_malformed() {
        let report = parse_report("# Title\n\nplain markdown");
        assert!(report.summary.is_empty());
        assert_eq!(report.report, "# Title\n\nplain markdown");
    }
}

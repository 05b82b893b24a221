//! 合成输入过滤与本地诊断报告
//!
//! 先按主阈值筛选可用子主题，全部落选时用放宽阈值再筛一次；
//! 仍然为空则在本地生成诊断报告，不带空输入调用模型。
//! 合成调用本身失败时，用已有内容在本地拼出降级报告。

use crate::research::{FinalReport, Subtopic};

/// 合成输入的内容长度阈值（字符数，严格大于）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentThresholds {
    pub min_content_chars: usize,
    pub relaxed_min_content_chars: usize,
}

impl Default for ContentThresholds {
    fn default() -> Self {
        Self {
            min_content_chars: 100,
            relaxed_min_content_chars: 0,
        }
    }
}

fn is_usable(subtopic: &Subtopic, min_chars: usize) -> bool {
    subtopic.is_complete() && subtopic.error.is_none() && subtopic.content_len() > min_chars
}

/// 两轮筛选；返回 (可用子主题, 是否用了放宽阈值)
pub fn select_usable(subtopics: &[Subtopic], thresholds: ContentThresholds) -> (Vec<&Subtopic>, bool) {
    let strict: Vec<&Subtopic> = subtopics
        .iter()
        .filter(|s| is_usable(s, thresholds.min_content_chars))
        .collect();
    if !strict.is_empty() {
        return (strict, false);
    }
    let relaxed = subtopics
        .iter()
        .filter(|s| is_usable(s, thresholds.relaxed_min_content_chars))
        .collect();
    (relaxed, true)
}

fn failure_reason(subtopic: &Subtopic) -> String {
    if let Some(error) = &subtopic.error {
        return format!("research call failed: {error}");
    }
    if !subtopic.is_complete() {
        return format!("research did not finish (status: {})", subtopic.status);
    }
    if subtopic.content_len() == 0 {
        return "the model returned no content".to_string();
    }
    "content was too short to use".to_string()
}

/// 本地诊断报告：列出每个子主题为何没有可用内容
pub fn diagnostic_report(topic: &str, subtopics: &[Subtopic]) -> FinalReport {
    let failed = subtopics.iter().filter(|s| s.error.is_some()).count();
    let mut report = format!(
        "# {topic}: research incomplete\n\n\
         None of the {} planned subtopics produced content that could be synthesized into a report.\n\n\
         ## Subtopic status\n\n",
        subtopics.len()
    );
    for subtopic in subtopics {
        report.push_str(&format!("- **{}**: {}\n", subtopic.title, failure_reason(subtopic)));
    }
    report.push_str(
        "\n## Next steps\n\nCheck the model backend configuration and connectivity, then reset and run the research again.\n",
    );

    FinalReport {
        summary: vec![
            format!("No usable research content was gathered for \"{topic}\"."),
            format!("{} of {} subtopics failed outright.", failed, subtopics.len()),
            "This report was generated locally without calling the model.".to_string(),
            "Reset the session to try again.".to_string(),
        ],
        report,
    }
}

/// 合成调用失败时的本地报告：可用子主题原文逐节列出，并注明失败原因
pub fn fallback_report(topic: &str, usable: &[&Subtopic], subtopics: &[Subtopic], reason: &str) -> FinalReport {
    let mut report = format!(
        "# {topic}\n\n\
         > The report could not be synthesized by the model ({reason}). \
         The sections below are the raw findings for each researched subtopic.\n\n"
    );
    for subtopic in usable {
        report.push_str(&format!(
            "## {}\n\n{}\n\n",
            subtopic.title,
            subtopic.content.as_deref().unwrap_or_default().trim()
        ));
    }
    let missing: Vec<&Subtopic> = subtopics
        .iter()
        .filter(|s| !usable.iter().any(|u| std::ptr::eq(*u, *s)))
        .collect();
    if !missing.is_empty() {
        report.push_str("## Not covered\n\n");
        for subtopic in &missing {
            report.push_str(&format!("- **{}**: {}\n", subtopic.title, failure_reason(subtopic)));
        }
    }

    FinalReport {
        summary: vec![
            format!("Research on \"{topic}\" gathered findings for {} of {} subtopics.", usable.len(), subtopics.len()),
            format!("Synthesis by the model failed: {reason}."),
            "The findings are listed per subtopic without an overall synthesis.".to_string(),
            "Reset the session to try the synthesis again.".to_string(),
        ],
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::SubtopicStatus;

    fn complete(title: &str, content: &str) -> Subtopic {
        let mut s = Subtopic::new(title);
        s.status = SubtopicStatus::Complete;
        s.content = Some(content.to_string());
        s
    }

    #[test]
    fn test_strict_filter_preferred() {
        let subtopics = vec![complete("long", &"x".repeat(150)), complete("short", "tiny")];
        let (usable, relaxed) = select_usable(&subtopics, ContentThresholds::default());
        assert!(!relaxed);
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].title, "long");
    }

    #[test]
    fn test_relaxed_filter_when_nothing_long_enough() {
        let subtopics = vec![complete("short", "tiny"), complete("empty", "   ")];
        let (usable, relaxed) = select_usable(&subtopics, ContentThresholds::default());
        assert!(relaxed);
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].title, "short");
    }

    #[test]
    fn test_failed_placeholders_never_usable() {
        let mut failed = complete("failed", &"placeholder ".repeat(20));
        failed.error = Some("timeout".into());
        let subtopics = [failed];
        let (usable, _) = select_usable(&subtopics, ContentThresholds::default());
        assert!(usable.is_empty());
    }

    #[test]
    fn test_diagnostic_report_lists_reasons() {
        let mut failed = complete("A", "placeholder");
        failed.error = Some("rate limited".into());
        let empty = complete("B", "");
        let report = diagnostic_report("Topic", &[failed, empty]);
        assert!((4..=6).contains(&report.summary.len()));
        assert!(report.report.contains("**A**: research call failed: rate limited"));
        assert!(report.report.contains("**B**: the model returned no content"));
    }

    #[test]
    fn test_fallback_report_keeps_findings() {
        let subtopics = vec![complete("Axioms", "Groups satisfy closure."), complete("Empty", "")];
        let usable = vec![&subtopics[0]];
        let report = fallback_report("Group Theory", &usable, &subtopics, "Rate limited: 429");
        assert!((4..=6).contains(&report.summary.len()));
        assert!(report.report.contains("## Axioms\n\nGroups satisfy closure."));
        assert!(report.report.contains("Rate limited: 429"));
        assert!(report.report.contains("**Empty**: the model returned no content"));
    }
}

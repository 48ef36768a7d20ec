//! 智能体上下文
//!
//! 由 WorkflowState 与当前文档派生：字数、已有标题、未撰写小节、最近 10 条动作历史等。
//! 调用方可传入覆盖项（任意 JSON 键），同名字段以覆盖项为准，其余进入 extra。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ParseError;
use crate::patch::similarity::is_cjk;
use crate::state::{ActionRecord, Citation, CritiqueSummary, PlanSection, SectionStatus, WorkflowState};

/// 上下文中保留的最近动作条数
pub const RECENT_HISTORY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub instructions: String,
    pub document: String,
    pub word_count: usize,
    pub headings: Vec<String>,
    pub format_guidance: Option<String>,
    pub section_plan: Vec<PlanSection>,
    /// 尚未撰写的小节标题（按大纲顺序）
    pub pending_sections: Vec<String>,
    pub sections_drafted: Vec<String>,
    pub pass_index: u32,
    pub max_passes: u32,
    pub min_score: f32,
    pub max_hunks: usize,
    pub recent_history: Vec<ActionRecord>,
    pub last_critique: Option<CritiqueSummary>,
    pub existing_citations: Vec<Citation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Context {
    /// 从状态与文档派生上下文
    pub fn derive(state: &WorkflowState, document: &str) -> Self {
        let headings = extract_headings(document);
        let pending_sections = state
            .section_plan
            .iter()
            .filter(|s| {
                s.status() == SectionStatus::Pending
                    && !state.sections_drafted.iter().any(|t| t == &s.title)
                    && !has_heading(&headings, &s.title)
            })
            .map(|s| s.title.clone())
            .collect();
        let skip = state.action_history.len().saturating_sub(RECENT_HISTORY);

        Self {
            instructions: state.instructions.clone(),
            document: document.to_string(),
            word_count: word_count(document),
            headings,
            format_guidance: state.format_guidance.clone(),
            section_plan: state.section_plan.clone(),
            pending_sections,
            sections_drafted: state.sections_drafted.clone(),
            pass_index: state.pass_index,
            max_passes: state.limits.max_passes,
            min_score: state.limits.min_score,
            max_hunks: state.limits.max_hunks,
            recent_history: state.action_history[skip..].to_vec(),
            last_critique: state.last_critique.clone(),
            existing_citations: state.existing_citations.clone(),
            extra: Map::new(),
        }
    }

    /// 合并覆盖项，覆盖项优先
    pub fn with_overrides(self, overrides: Map<String, Value>) -> Result<Self, ParseError> {
        if overrides.is_empty() {
            return Ok(self);
        }
        let invalid = |e: serde_json::Error| ParseError::InvalidJson {
            message: format!("context override: {e}"),
            raw: String::new(),
        };
        let mut value = serde_json::to_value(&self).map_err(invalid)?;
        if let Some(obj) = value.as_object_mut() {
            obj.extend(overrides);
        }
        serde_json::from_value(value).map_err(invalid)
    }

    /// 读取 extra 中的字符串覆盖项
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// 供提示词使用的状态摘要（不含全文）
    pub fn render_status(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Instructions:\n{}\n\n", self.instructions.trim()));
        out.push_str(&format!("Current word count: {}\n", self.word_count));
        out.push_str(&format!(
            "Revision passes used: {}/{} (target score {:.1})\n",
            self.pass_index, self.max_passes, self.min_score
        ));
        out.push_str(&format!(
            "Format guidance: {}\n",
            if self.format_guidance.is_some() { "available" } else { "missing" }
        ));
        if self.section_plan.is_empty() {
            out.push_str("Section plan: none\n");
        } else {
            out.push_str("Section plan:\n");
            for s in &self.section_plan {
                let done = if self.pending_sections.contains(&s.title) { " " } else { "x" };
                out.push_str(&format!("  [{}] {} - {}\n", done, s.title, s.summary));
            }
        }
        if !self.headings.is_empty() {
            out.push_str(&format!("Headings in document: {}\n", self.headings.join(" | ")));
        }
        if let Some(c) = &self.last_critique {
            out.push_str(&format!(
                "Last critique score: {:.1} ({} open item(s))\n",
                c.score,
                c.action_items.len()
            ));
        }
        if !self.recent_history.is_empty() {
            out.push_str("Recent actions:\n");
            for r in &self.recent_history {
                let status = if r.success { "ok" } else { "failed" };
                out.push_str(&format!("  - {} [{}]: {}\n", r.action, status, r.summary));
            }
        }
        out
    }
}

static CITATION_MARKUP_RE: OnceLock<Regex> = OnceLock::new();
static HEADING_RE: OnceLock<Regex> = OnceLock::new();

fn citation_markup() -> &'static Regex {
    CITATION_MARKUP_RE.get_or_init(|| {
        Regex::new(r"\\cite[pt]?\*?(\[[^\]]*\])*\{[^}]*\}|\[@[^\]]+\]|\[\d+(\s*[,\-–]\s*\d+)*\]")
            .expect("citation markup regex")
    })
}

/// 字数：不计引用标记；CJK 每字一词，其余按空白切分且至少含一个字母或数字
pub fn word_count(text: &str) -> usize {
    let stripped = citation_markup().replace_all(text, " ");
    let mut count = 0;
    let mut has_alnum = false;
    for c in stripped.chars() {
        if is_cjk(c) || c.is_whitespace() {
            count += usize::from(has_alnum) + usize::from(is_cjk(c));
            has_alnum = false;
        } else if c.is_alphanumeric() {
            has_alnum = true;
        }
    }
    count + usize::from(has_alnum)
}

fn heading_pattern() -> &'static Regex {
    HEADING_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:#{1,4}\s+(.+?)\s*#*\s*$|\\(?:sub){0,2}section\*?\{([^}]*)\}|\\paragraph\*?\{([^}]*)\})")
            .expect("heading regex")
    })
}

/// 提取 Markdown 与 LaTeX 标题文本
pub fn extract_headings(document: &str) -> Vec<String> {
    heading_pattern()
        .captures_iter(document)
        .filter_map(|cap| cap.get(1).or(cap.get(2)).or(cap.get(3)))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// 标题比较用的归一化：去掉编号前缀、小写、合并空白
pub fn normalize_title(title: &str) -> String {
    let trimmed = title
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace());
    trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// headings 中是否已有该标题
pub fn has_heading(headings: &[String], title: &str) -> bool {
    let want = normalize_title(title);
    !want.is_empty() && headings.iter().any(|h| normalize_title(h) == want)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Limits, StateKey};
    use serde_json::json;

    #[test]
    fn test_word_count_excludes_citations() {
        assert_eq!(word_count("Deep nets work \\cite{lecun2015}."), 3);
        assert_eq!(word_count("Deep nets work."), 3);
        assert_eq!(word_count("Deep nets work [1, 2] well [@smith2020]."), 4);
        assert_eq!(word_count("See \\citep[p.~3]{a,b} now"), 2);
        assert_eq!(word_count("大模型 works"), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_extract_headings_markdown_and_latex() {
        let doc = "# Title\ntext\n## 1. Introduction\n\\section{Methods}\n\\subsubsection*{Data}\n\\paragraph{Notes}\n####### too deep";
        assert_eq!(
            extract_headings(doc),
            vec!["Title", "1. Introduction", "Methods", "Data", "Notes"]
        );
    }

    #[test]
    fn test_has_heading_normalized() {
        let headings = vec!["2.1  Related   Work".to_string()];
        assert!(has_heading(&headings, "related work"));
        assert!(!has_heading(&headings, "Related"));
    }

    #[test]
    fn test_derive_pending_and_history_window() {
        let mut state = WorkflowState::new(&StateKey::document("d"), "write", Limits::default());
        state.section_plan = vec![
            PlanSection::new("Introduction", "why", 200),
            PlanSection::new("Methods", "how", 300),
            PlanSection::new("Results", "what", 300),
        ];
        state.mark_section_drafted("Introduction");
        for i in 0..15 {
            state.push_history(format!("a{i}"), "s", true, None);
        }
        let ctx = Context::derive(&state, "# Introduction\n\n## Methods\nbody");
        assert_eq!(ctx.pending_sections, vec!["Results".to_string()]);
        assert_eq!(ctx.recent_history.len(), RECENT_HISTORY);
        assert_eq!(ctx.recent_history[0].action, "a5");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let state = WorkflowState::new(&StateKey::document("d"), "original", Limits::default());
        let ctx = Context::derive(&state, "text");
        let mut overrides = Map::new();
        overrides.insert("instructions".into(), json!("focused"));
        overrides.insert("focus".into(), json!("Methods"));
        let ctx = ctx.with_overrides(overrides).unwrap();
        assert_eq!(ctx.instructions, "focused");
        assert_eq!(ctx.extra_str("focus"), Some("Methods"));
    }
}

//! 各智能体的 system prompt
//!
//! 构造时读入 `<dir>/<agent>.txt`（如 config/prompts/critic.txt），不存在时使用内置文本；
//! 末尾追加输出类型的 JSON Schema。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;

use super::kind::AgentKind;
use super::schema::output_format_block;

#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
    /// 构造时读入的覆盖文本，按智能体标识索引
    overrides: HashMap<&'static str, String>,
}

impl PromptLibrary {
    /// 一次性读入 `<dir>/<agent>.txt`；缺失或空白的文件忽略
    pub fn new(dir: Option<PathBuf>) -> Self {
        let mut overrides = HashMap::new();
        if let Some(dir) = &dir {
            for kind in AgentKind::ALL {
                let path = dir.join(format!("{}.txt", kind.as_str()));
                match std::fs::read_to_string(&path) {
                    Ok(text) if !text.trim().is_empty() => {
                        tracing::debug!(path = %path.display(), "loaded prompt override");
                        overrides.insert(kind.as_str(), text);
                    }
                    _ => {}
                }
            }
        }
        Self { dir, overrides }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// 指令部分：覆盖文本或内置文本
    pub fn instructions(&self, kind: AgentKind) -> String {
        self.overrides
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| builtin(kind))
    }

    /// 完整 system prompt：指令 + 输出格式
    pub fn system_prompt<T: JsonSchema>(&self, kind: AgentKind) -> String {
        format!(
            "{}\n\n{}",
            self.instructions(kind).trim_end(),
            output_format_block::<T>()
        )
    }
}

const EDIT_RULES: &str = "Edits are find/replace operations. `find` must be copied verbatim from the \
current document (a unique passage of one or more full sentences); `replace` is the new text. \
Use an empty `find` only to append new material at the end of the document. Never rewrite the \
whole document in one operation.";

fn builtin(kind: AgentKind) -> String {
    let body = match kind {
        AgentKind::Manager => "You coordinate a team of writing agents drafting a long-form document. \
Given the instructions and the current progress, choose exactly one next action. \
Available actions: generate_format_guidance, generate_plan, process_images, process_tables, \
write_section, critique_and_improve, revise, finish. \
Typical order: format guidance, then a plan, then one write_section per planned section, \
then assets, then critique_and_improve. Choose finish once every section is written and the \
critique score meets the target or no revision passes remain. Put action-specific arguments \
in `parameters` (for example {\"title\": \"Methods\"} for write_section, {\"name\": \"fig1.png\"} \
for process_images).",
        AgentKind::Formatter => "You research the formatting conventions for the requested document \
(venue, style guide, citation style, section structure, length limits) and summarize them as \
concise guidance the writers must follow.",
        AgentKind::Planner => "You design the section plan for the requested document. Produce an \
ordered list of sections, each with a title, a one-paragraph summary of its content, and a \
target word count. Respect the format guidance if present.",
        AgentKind::Writer => "You draft exactly one section of the document, following the plan, the \
format guidance and the style of the existing text. Insert the section at the right place: \
either replace a placeholder or existing fragment, or append it. Include the section heading.",
        AgentKind::Critic => "You review the document against the instructions and the format \
guidance. Score it from 0 to 10 and list concrete, actionable improvement items (most \
important first). Return an empty list when nothing important remains.",
        AgentKind::Reviser => "You apply the given improvement items to the document with targeted \
edits. Change only what the items require and keep everything else intact.",
        AgentKind::Figure => "You integrate an image into the document. Write a figure block (with \
caption and label in the document's markup) plus a sentence referencing it, and place it \
where it fits the surrounding text.",
        AgentKind::Table => "You integrate tabular data into the document. Render it as a table in \
the document's markup with a caption, and reference it from the surrounding text.",
        AgentKind::CitationOrchestrator => "You find factual claims in the document that need a \
citation. Copy each sentence verbatim, with a little surrounding context, the section it is \
in, why it needs support and what kind of evidence would support it. Skip sentences that are \
already cited and sentences listed as already known.",
        AgentKind::CitationGenerator => "You find one real, verifiable source for the given claim. \
If you find one, return the sentence rewritten to include the citation in the document's \
citation style, plus the bibliography entry. If you cannot find a reliable source, return \
{\"status\": \"not_found\"}. Never invent sources.",
    };
    match kind {
        AgentKind::Writer | AgentKind::Reviser | AgentKind::Figure | AgentKind::Table => {
            format!("{body}\n\n{EDIT_RULES}")
        }
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn test_override_file_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("critic.txt"), "Be harsh.").unwrap();
        let lib = PromptLibrary::new(Some(dir.path().to_path_buf()));
        assert_eq!(lib.instructions(AgentKind::Critic), "Be harsh.");
        assert!(lib.instructions(AgentKind::Planner).contains("section plan"));
    }

    #[test]
    fn test_overrides_read_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("writer.txt"), "Write tersely.").unwrap();
        let lib = PromptLibrary::new(Some(dir.path().to_path_buf()));
        std::fs::remove_file(dir.path().join("writer.txt")).unwrap();
        assert_eq!(lib.instructions(AgentKind::Writer), "Write tersely.");
    }

    #[test]
    fn test_edit_agents_get_edit_rules() {
        let lib = PromptLibrary::default();
        assert!(lib.instructions(AgentKind::Reviser).contains("verbatim"));
        assert!(!lib.instructions(AgentKind::Critic).contains("find/replace"));
    }

    #[test]
    fn test_system_prompt_has_schema() {
        let prompt = PromptLibrary::default().system_prompt::<Value>(AgentKind::Formatter);
        assert!(prompt.contains("JSON Schema"));
    }
}

//! 引用智能体
//!
//! - Orchestrator：在文档中找出需要引用支撑的句子（离线）
//! - Generator：为单个句子检索可靠来源并改写句子（联网）

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::Capability;
use crate::state::{Citation, CitationTarget};

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiscoveredTargets {
    pub targets: Vec<CitationTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Found,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CitationResolution {
    pub status: ResolutionStatus,
    /// 带引用标记的改写句（status 为 found 时必填）
    #[serde(default)]
    pub replacement_sentence: Option<String>,
    #[serde(default)]
    pub citation: Option<Citation>,
}

impl CitationResolution {
    /// found 且改写句与文献条目齐全时返回二者
    pub fn into_found(self) -> Option<(String, Citation)> {
        match (self.status, self.replacement_sentence, self.citation) {
            (ResolutionStatus::Found, Some(sentence), Some(citation))
                if !sentence.trim().is_empty() =>
            {
                Some((sentence, citation))
            }
            _ => None,
        }
    }
}

pub fn build_discovery_prompt(ctx: &Context, requested: usize, known: &[String]) -> String {
    let mut prompt = format!(
        "Find up to {requested} sentence(s) in the document that need a supporting citation.\n"
    );
    if !known.is_empty() {
        prompt.push_str("\nAlready identified (do not repeat):\n");
        for sentence in known {
            prompt.push_str(&format!("- {sentence}\n"));
        }
    }
    prompt.push_str(&format!("\nDocument:\n{}\n", ctx.document));
    prompt
}

pub async fn discover_targets(
    runtime: &AgentRuntime,
    ctx: &Context,
    requested: usize,
    known: &[String],
) -> Result<DiscoveredTargets, AgentError> {
    runtime
        .run_structured(
            AgentKind::CitationOrchestrator,
            &build_discovery_prompt(ctx, requested, known),
            &["targets"],
            Capability::offline(),
        )
        .await
}

pub fn build_generator_prompt(target: &CitationTarget, existing: &[Citation]) -> String {
    let mut prompt = format!(
        "Claim needing a source:\n\"{}\"\n\nContext before: {}\nContext after: {}\nSection: {}\nWhy: {}\nEvidence type: {}\n",
        target.sentence,
        target.context_before,
        target.context_after,
        target.section,
        target.reason,
        target.evidence_type
    );
    if !existing.is_empty() {
        prompt.push_str(
            "\nVerified citations already in the document (reuse the exact key and entry when the same source applies):\n",
        );
        for c in existing {
            prompt.push_str(&format!("- [{}] {}\n", c.key, c.entry));
        }
    }
    prompt
}

pub async fn generate_citation(
    runtime: &AgentRuntime,
    target: &CitationTarget,
    existing: &[Citation],
) -> Result<CitationResolution, AgentError> {
    let capability = if AgentKind::CitationGenerator.requires_online() {
        Capability::online()
    } else {
        Capability::offline()
    };
    runtime
        .run_structured(
            AgentKind::CitationGenerator,
            &build_generator_prompt(target, existing),
            &["status"],
            capability,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_parses() {
        let r: CitationResolution = serde_json::from_str(r#"{"status":"not_found"}"#).unwrap();
        assert!(r.into_found().is_none());
    }

    #[test]
    fn test_found_requires_sentence_and_entry() {
        let r: CitationResolution = serde_json::from_str(
            r#"{"status":"found","replacement_sentence":"X grew 10% \\cite{a}.","citation":{"key":"a","entry":"A. 2020."}}"#,
        )
        .unwrap();
        let (sentence, citation) = r.into_found().unwrap();
        assert_eq!(sentence, "X grew 10% \\cite{a}.");
        assert_eq!(citation.key, "a");

        let partial: CitationResolution =
            serde_json::from_str(r#"{"status":"found","replacement_sentence":"X."}"#).unwrap();
        assert!(partial.into_found().is_none());
    }

    #[test]
    fn test_generator_prompt_lists_existing() {
        let target = CitationTarget {
            sentence: "Transformers dominate NLP.".into(),
            context_before: String::new(),
            context_after: String::new(),
            section: "Intro".into(),
            reason: "broad claim".into(),
            evidence_type: "survey".into(),
            status: Default::default(),
        };
        let existing = vec![Citation {
            key: "vaswani2017".into(),
            entry: "Vaswani et al. 2017.".into(),
            url: None,
        }];
        let prompt = build_generator_prompt(&target, &existing);
        assert!(prompt.contains("[vaswani2017]"));
        assert!(prompt.contains("Transformers dominate NLP."));
    }
}

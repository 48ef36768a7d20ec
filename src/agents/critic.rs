//! Critic：打分并给出改进项

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::Capability;
use crate::state::CritiqueSummary;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Critique {
    /// 0-10
    pub score: f32,
    #[serde(default)]
    pub summary: String,
    /// 可执行的改进项，重要的在前
    pub action_items: Vec<String>,
}

impl Critique {
    /// 达标：分数不低于 min_score，或没有剩余改进项
    pub fn satisfied(&self, min_score: f32) -> bool {
        self.score >= min_score || self.action_items.is_empty()
    }
}

impl From<&Critique> for CritiqueSummary {
    fn from(c: &Critique) -> Self {
        Self {
            score: c.score,
            summary: c.summary.clone(),
            action_items: c.action_items.clone(),
        }
    }
}

pub fn build_prompt(ctx: &Context) -> String {
    let mut prompt = ctx.render_status();
    if let Some(guidance) = &ctx.format_guidance {
        prompt.push_str(&format!("\nFormat guidance:\n{guidance}\n"));
    }
    prompt.push_str(&format!("\nDocument to review:\n{}\n", ctx.document));
    prompt
}

pub async fn critique(runtime: &AgentRuntime, ctx: &Context) -> Result<Critique, AgentError> {
    let mut critique: Critique = runtime
        .run_structured(
            AgentKind::Critic,
            &build_prompt(ctx),
            &["score", "action_items"],
            Capability::offline(),
        )
        .await?;
    critique.score = critique.score.clamp(0.0, 10.0);
    critique.action_items.retain(|item| !item.trim().is_empty());
    Ok(critique)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfied() {
        let c = Critique {
            score: 6.0,
            summary: String::new(),
            action_items: vec!["tighten intro".into()],
        };
        assert!(!c.satisfied(8.0));
        assert!(c.satisfied(6.0));
        let done = Critique {
            action_items: vec![],
            ..c
        };
        assert!(done.satisfied(8.0));
    }
}

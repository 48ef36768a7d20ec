//! Writer：撰写一个小节，输出编辑操作

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::Capability;
use crate::patch::EditOperation;
use crate::state::PlanSection;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

/// 编辑型智能体的通用输出
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EditProposal {
    pub operations: Vec<EditOperation>,
    /// 一句话说明本次改动
    #[serde(default)]
    pub summary: String,
}

pub fn build_prompt(ctx: &Context, section: &PlanSection) -> String {
    let mut prompt = ctx.render_status();
    if let Some(guidance) = &ctx.format_guidance {
        prompt.push_str(&format!("\nFormat guidance:\n{guidance}\n"));
    }
    prompt.push_str(&format!(
        "\nSection to write: {}\nWhat it covers: {}\n",
        section.title, section.summary
    ));
    if section.target_words > 0 {
        prompt.push_str(&format!("Target length: about {} words\n", section.target_words));
    }
    prompt.push_str(&format!("\nCurrent document:\n{}\n", ctx.document));
    prompt
}

pub async fn write_section(
    runtime: &AgentRuntime,
    ctx: &Context,
    section: &PlanSection,
) -> Result<EditProposal, AgentError> {
    runtime
        .run_structured(
            AgentKind::Writer,
            &build_prompt(ctx, section),
            &["operations"],
            Capability::offline(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Limits, StateKey, WorkflowState};

    #[test]
    fn test_prompt_mentions_section_and_document() {
        let state = WorkflowState::new(&StateKey::document("d"), "A survey", Limits::default());
        let ctx = Context::derive(&state, "# Survey\n");
        let prompt = build_prompt(&ctx, &PlanSection::new("Background", "history of the field", 400));
        assert!(prompt.contains("Section to write: Background"));
        assert!(prompt.contains("about 400 words"));
        assert!(prompt.contains("# Survey"));
    }
}

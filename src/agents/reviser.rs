//! Reviser：按改进项做定点修改，操作数不超过 max_hunks

use crate::core::AgentError;
use crate::llm::Capability;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;
use super::writer::EditProposal;

pub fn build_prompt(ctx: &Context, action_items: &[String]) -> String {
    let mut prompt = ctx.render_status();
    prompt.push_str("\nImprovement items to address:\n");
    for (i, item) in action_items.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, item));
    }
    prompt.push_str(&format!(
        "\nUse at most {} edit operation(s).\n\nCurrent document:\n{}\n",
        ctx.max_hunks, ctx.document
    ));
    prompt
}

pub async fn revise(
    runtime: &AgentRuntime,
    ctx: &Context,
    action_items: &[String],
) -> Result<EditProposal, AgentError> {
    let mut proposal: EditProposal = runtime
        .run_structured(
            AgentKind::Reviser,
            &build_prompt(ctx, action_items),
            &["operations"],
            Capability::offline(),
        )
        .await?;
    if proposal.operations.len() > ctx.max_hunks {
        tracing::warn!(
            proposed = proposal.operations.len(),
            max_hunks = ctx.max_hunks,
            "reviser exceeded max hunks, truncating"
        );
        proposal.operations.truncate(ctx.max_hunks);
    }
    Ok(proposal)
}

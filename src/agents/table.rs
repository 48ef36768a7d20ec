//! Table：把表格数据排成文档中的表

use crate::asset::{Asset, AssetPayload};
use crate::core::AgentError;
use crate::llm::Capability;

use super::context::Context;
use super::figure::AssetPlacement;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

/// 表格数据在提示词中保留的最大字符数
const MAX_TABLE_CHARS: usize = 20_000;

pub fn build_prompt(ctx: &Context, name: &str, caption: Option<&str>, data: &str) -> String {
    let data: String = data.chars().take(MAX_TABLE_CHARS).collect();
    let mut prompt = ctx.render_status();
    prompt.push_str(&format!("\nTable source: {name}\n"));
    if let Some(caption) = caption {
        prompt.push_str(&format!("Author's caption hint: {caption}\n"));
    }
    prompt.push_str(&format!(
        "Data:\n{}\n\nCurrent document:\n{}\n",
        data, ctx.document
    ));
    prompt
}

pub async fn process_table(
    runtime: &AgentRuntime,
    ctx: &Context,
    asset: &Asset,
) -> Result<AssetPlacement, AgentError> {
    let AssetPayload::Table(data) = &asset.payload else {
        return Err(AgentError::AssetNotFound(format!("{} is not a table", asset.name)));
    };
    runtime
        .run_structured(
            AgentKind::Table,
            &build_prompt(ctx, &asset.name, asset.caption.as_deref(), data),
            &["operation"],
            Capability::offline(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Limits, StateKey, WorkflowState};

    #[test]
    fn test_prompt_truncates_large_tables() {
        let state = WorkflowState::new(&StateKey::document("d"), "x", Limits::default());
        let ctx = Context::derive(&state, "");
        let data = "1,2\n".repeat(10_000);
        let prompt = build_prompt(&ctx, "big.csv", Some("Results"), &data);
        assert!(prompt.len() < data.len());
        assert!(prompt.contains("Author's caption hint: Results"));
    }
}

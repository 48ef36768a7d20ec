//! Manager 的决策调用：选择下一步动作
//!
//! 这里只做结构解析；动作名到 Action 的映射（以及未知动作的拒绝）在 workflow::action 中完成。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::asset::AssetSummary;
use crate::core::AgentError;
use crate::llm::Capability;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    /// 动作名，如 write_section
    pub action: String,
    /// 动作参数
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub reasoning: String,
}

pub fn build_prompt(ctx: &Context, assets: &[AssetSummary]) -> String {
    let mut prompt = ctx.render_status();
    if !assets.is_empty() {
        prompt.push_str("Assets:\n");
        for a in assets {
            prompt.push_str(&format!(
                "  - {} ({:?}){}\n",
                a.name,
                a.kind,
                if a.processed { " [inserted]" } else { "" }
            ));
        }
    }
    for (key, value) in &ctx.extra {
        prompt.push_str(&format!("{key}: {value}\n"));
    }
    prompt.push_str("\nChoose the next action.");
    prompt
}

pub async fn decide(
    runtime: &AgentRuntime,
    ctx: &Context,
    assets: &[AssetSummary],
) -> Result<Decision, AgentError> {
    runtime
        .run_structured(
            AgentKind::Manager,
            &build_prompt(ctx, assets),
            &["action"],
            Capability::offline(),
        )
        .await
}

//! Formatter：检索目标文体/刊物的格式规范（联网）

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::Capability;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FormatGuidance {
    /// 供撰写者遵循的格式要点
    pub guidance: String,
}

pub fn build_prompt(ctx: &Context) -> String {
    let opening: String = ctx.document.chars().take(1500).collect();
    format!(
        "{}\nDocument opening:\n{}\n\nDescribe the formatting conventions this document must follow.",
        ctx.render_status(),
        if opening.trim().is_empty() { "(empty)" } else { opening.as_str() }
    )
}

pub async fn generate_format_guidance(
    runtime: &AgentRuntime,
    ctx: &Context,
) -> Result<FormatGuidance, AgentError> {
    let capability = if AgentKind::Formatter.requires_online() {
        Capability::online()
    } else {
        Capability::offline()
    };
    runtime
        .run_structured(AgentKind::Formatter, &build_prompt(ctx), &["guidance"], capability)
        .await
}

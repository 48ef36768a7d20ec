//! Planner：生成小节大纲

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, ParseError};
use crate::llm::Capability;
use crate::state::PlanSection;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SectionPlan {
    pub sections: Vec<PlanSection>,
}

pub fn build_prompt(ctx: &Context) -> String {
    let mut prompt = ctx.render_status();
    if let Some(guidance) = &ctx.format_guidance {
        prompt.push_str(&format!("\nFormat guidance:\n{guidance}\n"));
    }
    if !ctx.document.trim().is_empty() {
        prompt.push_str(&format!("\nCurrent document:\n{}\n", ctx.document));
    }
    prompt.push_str("\nProduce the ordered section plan.");
    prompt
}

/// 生成大纲；空大纲视为无效输出，与解析失败一样触发重新生成
pub async fn generate_plan(runtime: &AgentRuntime, ctx: &Context) -> Result<SectionPlan, AgentError> {
    runtime
        .run_structured_validated(
            AgentKind::Planner,
            &build_prompt(ctx),
            &["sections"],
            Capability::offline(),
            normalize_plan,
        )
        .await
}

/// 去掉空标题与重复标题（忽略大小写），清空状态；剩余为空时报错
pub fn normalize_plan(mut plan: SectionPlan) -> Result<SectionPlan, ParseError> {
    plan.sections.retain(|s| !s.title.trim().is_empty());
    let mut seen = std::collections::HashSet::new();
    plan.sections.retain(|s| seen.insert(s.title.trim().to_lowercase()));
    if plan.sections.is_empty() {
        return Err(ParseError::InvalidJson {
            message: "section plan is empty".to_string(),
            raw: String::new(),
        });
    }
    for section in &mut plan.sections {
        section.title = section.title.trim().to_string();
        section.status = None;
    }
    Ok(plan)
}

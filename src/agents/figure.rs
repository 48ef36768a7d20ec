//! Figure：看图后写出图块与引用句（视觉模型）

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetPayload};
use crate::core::AgentError;
use crate::llm::Capability;
use crate::patch::EditOperation;

use super::context::Context;
use super::kind::AgentKind;
use super::runtime::AgentRuntime;

/// 图片/表格智能体的输出：一个插入操作
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetPlacement {
    pub operation: EditOperation,
    #[serde(default)]
    pub caption: String,
}

pub fn build_prompt(ctx: &Context, asset: &Asset) -> String {
    let mut prompt = ctx.render_status();
    prompt.push_str(&format!("\nImage file: {}\n", asset.name));
    if let Some(caption) = &asset.caption {
        prompt.push_str(&format!("Author's caption hint: {caption}\n"));
    }
    prompt.push_str(&format!(
        "\nThe image is attached. Place it in the document below.\n\nCurrent document:\n{}\n",
        ctx.document
    ));
    prompt
}

pub async fn process_image(
    runtime: &AgentRuntime,
    ctx: &Context,
    asset: &Asset,
) -> Result<AssetPlacement, AgentError> {
    let AssetPayload::Image(image) = &asset.payload else {
        return Err(AgentError::AssetNotFound(format!("{} is not an image", asset.name)));
    };
    runtime
        .run_structured(
            AgentKind::Figure,
            &build_prompt(ctx, asset),
            &["operation"],
            Capability::online().with_image(image.clone()),
        )
        .await
}

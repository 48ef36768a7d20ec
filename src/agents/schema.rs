//! 输出格式 JSON Schema（schemars 自动生成）
//!
//! 拼入 system prompt，减少模型输出格式错误。

use schemars::{schema_for, JsonSchema};

/// 返回类型 T 的 JSON Schema 字符串
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 追加到 system prompt 末尾的输出格式说明
pub fn output_format_block<T: JsonSchema>() -> String {
    format!(
        "Respond with a single JSON value and nothing else. It must match this JSON Schema:\n{}",
        schema_json::<T>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::EditOperation;

    #[test]
    fn test_edit_operation_schema_lists_fields() {
        let schema = schema_json::<EditOperation>();
        assert!(schema.contains("\"find\""));
        assert!(schema.contains("\"replace\""));
        assert!(schema.contains("\"count\""));
    }
}

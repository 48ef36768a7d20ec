//! Manager 可执行的动作
//!
//! 决策输出在这里映射为封闭的枚举；无法识别的动作名直接报 UnknownAction，不做静默忽略。

use std::fmt;

use serde_json::{Map, Value};

use crate::agents::Decision;
use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    GenerateFormatGuidance,
    GeneratePlan,
    /// name 为空时处理下一张未插入的图片
    ProcessImages { name: Option<String> },
    ProcessTables { name: Option<String> },
    /// title 为空时按大纲顺序选下一个未撰写的小节
    WriteSection { title: Option<String> },
    CritiqueAndImprove,
    /// action_items 为空时使用最近一次评审的改进项
    Revise { action_items: Vec<String> },
    Finish,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::GenerateFormatGuidance => "generate_format_guidance",
            Action::GeneratePlan => "generate_plan",
            Action::ProcessImages { .. } => "process_images",
            Action::ProcessTables { .. } => "process_tables",
            Action::WriteSection { .. } => "write_section",
            Action::CritiqueAndImprove => "critique_and_improve",
            Action::Revise { .. } => "revise",
            Action::Finish => "finish",
        }
    }

    pub fn from_decision(decision: &Decision) -> Result<Self, AgentError> {
        Self::parse(&decision.action, &decision.parameters)
    }

    /// 动作名大小写、连字符与空格不敏感
    pub fn parse(action: &str, params: &Map<String, Value>) -> Result<Self, AgentError> {
        let normalized = action.trim().to_lowercase().replace(['-', ' '], "_");
        let action = match normalized.as_str() {
            "generate_format_guidance" => Action::GenerateFormatGuidance,
            "generate_plan" => Action::GeneratePlan,
            "process_images" | "process_image" => Action::ProcessImages {
                name: str_param(params, &["name", "asset", "image", "file"]),
            },
            "process_tables" | "process_table" => Action::ProcessTables {
                name: str_param(params, &["name", "asset", "table", "file"]),
            },
            "write_section" => Action::WriteSection {
                title: str_param(params, &["title", "section", "section_title"]),
            },
            "critique_and_improve" => Action::CritiqueAndImprove,
            "revise" => Action::Revise {
                action_items: list_param(params, &["action_items", "items"]),
            },
            "finish" => Action::Finish,
            _ => return Err(AgentError::UnknownAction(action.to_string())),
        };
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn str_param(params: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn list_param(params: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .find_map(|v| match v {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(s) if !s.trim().is_empty() => Some(vec![s.clone()]),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(
            Action::parse("Write-Section", &params(json!({"title": " Methods "}))).unwrap(),
            Action::WriteSection {
                title: Some("Methods".into())
            }
        );
        assert_eq!(
            Action::parse("process_images", &Map::new()).unwrap(),
            Action::ProcessImages { name: None }
        );
        assert_eq!(
            Action::parse("revise", &params(json!({"items": "fix typos"}))).unwrap(),
            Action::Revise {
                action_items: vec!["fix typos".into()]
            }
        );
        assert_eq!(Action::parse("FINISH", &Map::new()).unwrap(), Action::Finish);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Action::parse("publish_to_arxiv", &Map::new()).unwrap_err();
        assert!(matches!(err, AgentError::UnknownAction(a) if a == "publish_to_arxiv"));
    }

    #[test]
    fn test_names_roundtrip() {
        for action in [
            Action::GenerateFormatGuidance,
            Action::GeneratePlan,
            Action::ProcessImages { name: None },
            Action::ProcessTables { name: None },
            Action::WriteSection { title: None },
            Action::CritiqueAndImprove,
            Action::Revise {
                action_items: vec![],
            },
            Action::Finish,
        ] {
            assert_eq!(Action::parse(action.name(), &Map::new()).unwrap(), action);
        }
    }
}

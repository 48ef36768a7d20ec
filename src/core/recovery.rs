//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供重试包装器与 Manager 主循环决定是重新生成、跳过还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Parse(_) => RecoveryAction::Regenerate,
            AgentError::MissingPlan(_) | AgentError::AssetNotFound(_) => RecoveryAction::SkipStep,
            AgentError::Llm(_)
            | AgentError::Store(_)
            | AgentError::Document(_)
            | AgentError::UnknownAction(_)
            | AgentError::Cancelled => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParseError;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_parse_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Parse(ParseError::MissingFields(vec!["operations".into()]));
        assert_eq!(engine.handle(&err), RecoveryAction::Regenerate);
    }

    #[test]
    fn test_recovery_policy_violations() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&AgentError::AssetNotFound("fig1".into())),
            RecoveryAction::SkipStep
        );
        assert_eq!(
            engine.handle(&AgentError::MissingPlan("no plan".into())),
            RecoveryAction::SkipStep
        );
        assert_eq!(
            engine.handle(&AgentError::UnknownAction("dance".into())),
            RecoveryAction::Abort
        );
    }

    #[test]
    fn test_recovery_llm_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Llm(LlmError::RateLimited { retry_after_ms: 1000 });
        assert_eq!(engine.handle(&err), RecoveryAction::Abort);
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort);
    }

    #[test]
    fn test_missing_fields_message() {
        let err = ParseError::MissingFields(vec!["score".into(), "action_items".into()]);
        assert_eq!(err.to_string(), "Missing required field(s): score, action_items");
    }
}

//! 智能体种类：既是日志标签，也决定默认的联网能力与提示词文件名

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Manager 的决策调用
    Manager,
    Formatter,
    Planner,
    Writer,
    Critic,
    Reviser,
    Figure,
    Table,
    /// 引用目标发现
    CitationOrchestrator,
    /// 单个目标的文献检索与句子改写
    CitationGenerator,
}

impl AgentKind {
    pub const ALL: [AgentKind; 10] = [
        AgentKind::Manager,
        AgentKind::Formatter,
        AgentKind::Planner,
        AgentKind::Writer,
        AgentKind::Critic,
        AgentKind::Reviser,
        AgentKind::Figure,
        AgentKind::Table,
        AgentKind::CitationOrchestrator,
        AgentKind::CitationGenerator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Manager => "manager",
            AgentKind::Formatter => "formatter",
            AgentKind::Planner => "planner",
            AgentKind::Writer => "writer",
            AgentKind::Critic => "critic",
            AgentKind::Reviser => "reviser",
            AgentKind::Figure => "figure",
            AgentKind::Table => "table",
            AgentKind::CitationOrchestrator => "citation_orchestrator",
            AgentKind::CitationGenerator => "citation_generator",
        }
    }

    /// 是否需要联网（检索型）模型
    pub fn requires_online(self) -> bool {
        matches!(self, AgentKind::Formatter | AgentKind::CitationGenerator)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for kind in AgentKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}

//! WorkflowState 及其组成部分
//!
//! 每个 (document_id, section_id) 一条记录；每个有副作用的步骤之后整体写回，可崩溃恢复。

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::WorkflowSection;

/// 状态存储键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub document_id: String,
    pub section_id: String,
}

impl StateKey {
    pub fn new(document_id: impl Into<String>, section_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            section_id: section_id.into(),
        }
    }

    /// 整篇文档（不分节）使用的键
    pub fn document(document_id: impl Into<String>) -> Self {
        Self::new(document_id, "main")
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_id, self.section_id)
    }
}

/// 运行限额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub max_passes: u32,
    pub min_score: f32,
    pub max_hunks: usize,
    pub max_targets: usize,
}

impl Limits {
    pub fn new(max_passes: u32, min_score: f32) -> Self {
        Self {
            max_passes,
            min_score,
            max_hunks: 5,
            max_targets: 10,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(3, 8.0)
    }
}

impl From<&WorkflowSection> for Limits {
    fn from(cfg: &WorkflowSection) -> Self {
        Self {
            max_passes: cfg.max_passes,
            min_score: cfg.min_score,
            max_hunks: cfg.max_hunks,
            max_targets: cfg.max_targets,
        }
    }
}

/// 大纲中小节的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    #[default]
    Pending,
    Drafted,
    Revised,
}

/// 大纲小节
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanSection {
    pub title: String,
    pub summary: String,
    /// 建议字数，仅作参考
    #[serde(default)]
    pub target_words: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SectionStatus>,
}

impl PlanSection {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, target_words: u32) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            target_words,
            status: None,
        }
    }

    pub fn status(&self) -> SectionStatus {
        self.status.unwrap_or_default()
    }
}

/// 一次 Manager 动作的历史记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub summary: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 需要补引用的句子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CitationTarget {
    /// 文档中的原句（逐字引用）
    pub sentence: String,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub reason: String,
    /// 需要的证据类型，如 statistic / study / definition
    #[serde(default)]
    pub evidence_type: String,
    #[serde(default)]
    #[schemars(skip)]
    pub status: TargetStatus,
}

/// 引用目标的处理进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    #[default]
    Pending,
    Inserted,
    /// 原句已不在文档中
    Skipped,
    /// 没有找到可靠来源
    NotFound,
}

/// 已核实的参考文献
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Citation {
    /// 引用键，如 smith2021deep
    pub key: String,
    /// 完整参考文献条目
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// 最近一次评审的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueSummary {
    pub score: f32,
    pub summary: String,
    pub action_items: Vec<String>,
}

/// 工作流状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub document_id: String,
    pub section_id: String,
    pub instructions: String,
    pub limits: Limits,
    pub pass_index: u32,
    #[serde(default)]
    pub format_guidance: Option<String>,
    #[serde(default)]
    pub section_plan: Vec<PlanSection>,
    #[serde(default)]
    pub sections_drafted: Vec<String>,
    #[serde(default)]
    pub action_history: Vec<ActionRecord>,
    #[serde(default)]
    pub citation_targets: Vec<CitationTarget>,
    #[serde(default)]
    pub existing_citations: Vec<Citation>,
    #[serde(default)]
    pub last_critique: Option<CritiqueSummary>,
    #[serde(default)]
    pub processed_assets: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(key: &StateKey, instructions: impl Into<String>, limits: Limits) -> Self {
        let now = Utc::now();
        Self {
            document_id: key.document_id.clone(),
            section_id: key.section_id.clone(),
            instructions: instructions.into(),
            limits,
            pass_index: 0,
            format_guidance: None,
            section_plan: Vec::new(),
            sections_drafted: Vec::new(),
            action_history: Vec::new(),
            citation_targets: Vec::new(),
            existing_citations: Vec::new(),
            last_critique: None,
            processed_assets: Vec::new(),
            created_at: now,
            last_modified: now,
        }
    }

    pub fn key(&self) -> StateKey {
        StateKey::new(&self.document_id, &self.section_id)
    }

    /// 剩余评审-修订轮数
    pub fn passes_remaining(&self) -> u32 {
        self.limits.max_passes.saturating_sub(self.pass_index)
    }

    /// pass_index 加一，不超过 max_passes；返回是否真的增加了
    pub fn increment_pass(&mut self) -> bool {
        if self.pass_index < self.limits.max_passes {
            self.pass_index += 1;
            true
        } else {
            false
        }
    }

    /// 追加引用目标：按原句精确去重，总数不超过 max_targets；返回新增数量
    pub fn add_citation_targets(&mut self, targets: Vec<CitationTarget>) -> usize {
        let mut added = 0;
        for mut target in targets {
            if self.citation_targets.len() >= self.limits.max_targets {
                break;
            }
            if target.sentence.trim().is_empty()
                || self
                    .citation_targets
                    .iter()
                    .any(|t| t.sentence == target.sentence)
            {
                continue;
            }
            target.status = TargetStatus::Pending;
            self.citation_targets.push(target);
            added += 1;
        }
        added
    }

    /// 追加已核实引用（按 key 去重）
    pub fn add_citation(&mut self, citation: Citation) {
        if !self.existing_citations.iter().any(|c| c.key == citation.key) {
            self.existing_citations.push(citation);
        }
    }

    /// 标记小节已撰写
    pub fn mark_section_drafted(&mut self, title: &str) {
        if let Some(section) = self.section_plan.iter_mut().find(|s| s.title == title) {
            section.status = Some(SectionStatus::Drafted);
        }
        if !self.sections_drafted.iter().any(|t| t == title) {
            self.sections_drafted.push(title.to_string());
        }
    }

    pub fn push_history(
        &mut self,
        action: impl Into<String>,
        summary: impl Into<String>,
        success: bool,
        error: Option<String>,
    ) {
        self.action_history.push(ActionRecord {
            action: action.into(),
            summary: summary.into(),
            success,
            error,
            timestamp: Utc::now(),
        });
    }
}

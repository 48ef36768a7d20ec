//! 引用流水线
//!
//! 独立于 Manager 的顶层流程：先发现需要引用的句子，再逐个检索文献并改写原句。
//! 改写只做逐字匹配，原句已不在文档中就跳过并记错误日志。

use serde::Serialize;
use serde_json::json;

use crate::agents::citation::{discover_targets, generate_citation};
use crate::agents::{AgentKind, AgentRuntime, Context, LogKind};
use crate::core::AgentError;
use crate::document::DocumentHandle;
use crate::patch::{apply_exact, EditOperation};
use crate::state::TargetStatus;

/// 每次发现调用最多请求的目标数
pub const TARGETS_PER_CALL: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CitationReport {
    pub targets_found: usize,
    pub inserted: usize,
    pub skipped: usize,
}

pub struct CitationPipeline<'a> {
    runtime: &'a AgentRuntime,
    document: &'a dyn DocumentHandle,
}

impl<'a> CitationPipeline<'a> {
    pub fn new(runtime: &'a AgentRuntime, document: &'a dyn DocumentHandle) -> Self {
        Self { runtime, document }
    }

    pub async fn run(&self, instructions: &str) -> Result<CitationReport, AgentError> {
        let limits = self.runtime.limits();
        self.runtime
            .get_or_create_state(instructions, limits.max_passes, limits.min_score)
            .await?;
        let targets_found = self.discover().await?;
        let (inserted, skipped) = self.resolve().await?;
        let report = CitationReport {
            targets_found,
            inserted,
            skipped,
        };
        tracing::info!(?report, "citation pipeline finished");
        Ok(report)
    }

    /// 发现阶段：直到达到 max_targets 或某次调用没有新目标；返回目标总数
    pub async fn discover(&self) -> Result<usize, AgentError> {
        loop {
            let state = self.runtime.load_state().await?;
            let max_targets = state.limits.max_targets;
            if state.citation_targets.len() >= max_targets {
                break;
            }
            let requested = TARGETS_PER_CALL.min(max_targets - state.citation_targets.len());
            let known: Vec<String> = state
                .citation_targets
                .iter()
                .map(|t| t.sentence.clone())
                .collect();

            let document = self.document.get_current_document().await?;
            let ctx = Context::derive(&state, &document);
            let found = discover_targets(self.runtime, &ctx, requested, &known).await?;
            let returned = found.targets.len();

            let mut added = 0;
            let state = self
                .runtime
                .update_state(|s| added = s.add_citation_targets(found.targets))
                .await?;
            self.runtime.log(
                AgentKind::CitationOrchestrator,
                LogKind::Info,
                format!("{added} new target(s) out of {returned} returned"),
                json!({ "total": state.citation_targets.len(), "max_targets": max_targets }),
            );
            if added == 0 {
                break;
            }
        }
        Ok(self.runtime.load_state().await?.citation_targets.len())
    }

    /// 解析阶段：逐个处理 pending 目标；返回 (插入数, 跳过数)
    pub async fn resolve(&self) -> Result<(usize, usize), AgentError> {
        let targets = self.runtime.load_state().await?.citation_targets;
        let mut inserted = 0;
        let mut skipped = 0;

        for (index, target) in targets.iter().enumerate() {
            if target.status != TargetStatus::Pending {
                continue;
            }
            let document = self.document.get_current_document().await?;
            if !document.contains(&target.sentence) {
                self.log_missing(index, &target.sentence);
                self.mark(index, TargetStatus::Skipped).await?;
                skipped += 1;
                continue;
            }

            // 已核实引用随处理推进增长，后面的目标可复用同一条文献
            let existing = self.runtime.load_state().await?.existing_citations;
            let resolution = generate_citation(self.runtime, target, &existing).await?;
            let Some((sentence, citation)) = resolution.into_found() else {
                self.runtime.log(
                    AgentKind::CitationGenerator,
                    LogKind::Info,
                    "no reliable source found, target skipped",
                    json!({ "index": index, "sentence": target.sentence }),
                );
                self.mark(index, TargetStatus::NotFound).await?;
                skipped += 1;
                continue;
            };

            let op = EditOperation::new(target.sentence.clone(), sentence)
                .with_reason(format!("citation {}", citation.key));
            let Some((next, _)) = apply_exact(&document, &op) else {
                self.log_missing(index, &target.sentence);
                self.mark(index, TargetStatus::Skipped).await?;
                skipped += 1;
                continue;
            };
            self.document.update_document(next).await?;
            self.runtime
                .update_state(|s| {
                    s.add_citation(citation);
                    if let Some(t) = s.citation_targets.get_mut(index) {
                        t.status = TargetStatus::Inserted;
                    }
                })
                .await?;
            inserted += 1;
        }
        Ok((inserted, skipped))
    }

    async fn mark(&self, index: usize, status: TargetStatus) -> Result<(), AgentError> {
        self.runtime
            .update_state(|s| {
                if let Some(t) = s.citation_targets.get_mut(index) {
                    t.status = status;
                }
            })
            .await
            .map(|_| ())
    }

    fn log_missing(&self, index: usize, sentence: &str) {
        self.runtime.log(
            AgentKind::CitationGenerator,
            LogKind::Error,
            "target sentence no longer present in document",
            json!({ "index": index, "sentence": sentence }),
        );
    }
}

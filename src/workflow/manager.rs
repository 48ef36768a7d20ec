//! Manager 主循环
//!
//! 构建上下文 -> 决策 -> 分派动作 -> 记录历史，直到 finish 或达到迭代上限。
//! 每个动作结束都写一条历史；策略违规（缺大纲、缺素材）跳过当前步骤，其余错误终止运行，
//! 已持久化的状态与文档保持有效，可再次运行续上。

use serde::Serialize;
use serde_json::{json, Map};

use crate::agents::context::{extract_headings, has_heading, normalize_title};
use crate::agents::{
    critic, decision, figure, formatter, planner, reviser, table, writer, AgentKind, AgentRuntime,
    Context, Critique, LogKind,
};
use crate::asset::{Asset, AssetKind, AssetSummary};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::document::DocumentHandle;
use crate::patch::{apply_operations, ApplyReport, EditOperation, PatchOptions};
use crate::state::{CritiqueSummary, PlanSection, SectionStatus, WorkflowState};

use super::action::Action;

/// 单次运行最多决策次数
pub const MAX_MANAGER_ITERATIONS: usize = 50;
/// 单次 critique_and_improve 最多评审-修订轮数
pub const MAX_CRITIQUE_CYCLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Finished,
    IterationLimit,
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub document: String,
    pub iterations: usize,
    pub finished: bool,
    pub reason: StopReason,
}

pub struct Manager<'a> {
    runtime: &'a AgentRuntime,
    document: &'a dyn DocumentHandle,
    assets: Vec<Asset>,
    recovery: RecoveryEngine,
}

impl<'a> Manager<'a> {
    pub fn new(runtime: &'a AgentRuntime, document: &'a dyn DocumentHandle) -> Self {
        Self {
            runtime,
            document,
            assets: Vec::new(),
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn with_assets(mut self, assets: Vec<Asset>) -> Self {
        self.assets = assets;
        self
    }

    /// 运行到 finish 或迭代上限
    pub async fn run(&self, instructions: &str) -> Result<RunOutcome, AgentError> {
        let limits = self.runtime.limits();
        self.runtime
            .get_or_create_state(instructions, limits.max_passes, limits.min_score)
            .await?;

        for iteration in 1..=MAX_MANAGER_ITERATIONS {
            self.runtime.check_cancelled()?;
            let document = self.document.get_current_document().await?;
            let state = self.runtime.load_state().await?;
            let assets = self.asset_summaries(&state);

            let mut overrides = Map::new();
            overrides.insert(
                "iteration".to_string(),
                json!(format!("{iteration}/{MAX_MANAGER_ITERATIONS}")),
            );
            let ctx = self.runtime.build_context(&document, overrides).await?;

            let decision = match decision::decide(self.runtime, &ctx, &assets).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.log_error(format!("decision failed: {e}"), "decide");
                    return Err(e);
                }
            };
            let action = match Action::from_decision(&decision) {
                Ok(action) => action,
                Err(e) => {
                    self.log_error(e.to_string(), &decision.action);
                    self.record(&decision.action, "rejected", false, Some(e.to_string()))
                        .await;
                    return Err(e);
                }
            };
            self.runtime.log(
                AgentKind::Manager,
                LogKind::Info,
                format!("{action}: {}", decision.reasoning),
                json!({ "iteration": iteration, "parameters": decision.parameters }),
            );

            if action == Action::Finish {
                self.record(action.name(), "run finished", true, None).await;
                return Ok(RunOutcome {
                    document: self.document.get_current_document().await?,
                    iterations: iteration,
                    finished: true,
                    reason: StopReason::Finished,
                });
            }

            match self.dispatch(&action).await {
                Ok(summary) => {
                    tracing::info!(iteration, action = %action, "{}", summary);
                    self.record(action.name(), &summary, true, None).await;
                }
                Err(e) => {
                    self.log_error(e.to_string(), action.name());
                    self.record(action.name(), "failed", false, Some(e.to_string()))
                        .await;
                    if self.recovery.handle(&e) != RecoveryAction::SkipStep {
                        return Err(e);
                    }
                }
            }
        }

        tracing::warn!(
            max = MAX_MANAGER_ITERATIONS,
            "manager reached iteration limit without finishing"
        );
        Ok(RunOutcome {
            document: self.document.get_current_document().await?,
            iterations: MAX_MANAGER_ITERATIONS,
            finished: false,
            reason: StopReason::IterationLimit,
        })
    }

    async fn dispatch(&self, action: &Action) -> Result<String, AgentError> {
        match action {
            Action::GenerateFormatGuidance => {
                let ctx = self.context().await?;
                let out = formatter::generate_format_guidance(self.runtime, &ctx).await?;
                let chars = out.guidance.chars().count();
                self.runtime
                    .update_state(|s| s.format_guidance = Some(out.guidance))
                    .await?;
                Ok(format!("stored format guidance ({chars} chars)"))
            }
            Action::GeneratePlan => {
                let ctx = self.context().await?;
                let plan = planner::generate_plan(self.runtime, &ctx).await?;
                let titles: Vec<String> = plan.sections.iter().map(|s| s.title.clone()).collect();
                let headings = ctx.headings;
                self.runtime
                    .update_state(|s| {
                        s.section_plan = plan.sections;
                        // 文档中已有的小节视为已撰写
                        for section in s.section_plan.iter_mut() {
                            if s.sections_drafted.contains(&section.title)
                                || has_heading(&headings, &section.title)
                            {
                                section.status = Some(SectionStatus::Drafted);
                            }
                        }
                    })
                    .await?;
                Ok(format!(
                    "planned {} section(s): {}",
                    titles.len(),
                    titles.join(", ")
                ))
            }
            Action::ProcessImages { name } => {
                self.process_asset(AssetKind::Image, name.as_deref()).await
            }
            Action::ProcessTables { name } => {
                self.process_asset(AssetKind::Table, name.as_deref()).await
            }
            Action::WriteSection { title } => self.write_section(title.as_deref()).await,
            Action::CritiqueAndImprove => self.critique_and_improve().await,
            Action::Revise { action_items } => self.revise(action_items).await,
            Action::Finish => Ok("finished".to_string()),
        }
    }

    async fn context(&self) -> Result<Context, AgentError> {
        let document = self.document.get_current_document().await?;
        self.runtime.build_context(&document, Map::new()).await
    }

    /// 在当前文档上应用编辑并写回
    async fn apply(
        &self,
        operations: &[EditOperation],
        options: PatchOptions,
        agent: AgentKind,
    ) -> Result<ApplyReport, AgentError> {
        let current = self.document.get_current_document().await?;
        let (next, report) = apply_operations(&current, operations, options);
        if next != current {
            self.document.update_document(next).await?;
        }
        if report.appended() > 0 {
            self.runtime.log(
                agent,
                LogKind::Info,
                format!(
                    "{} operation(s) had no match and were appended",
                    report.appended()
                ),
                json!(report),
            );
        }
        Ok(report)
    }

    fn asset_summaries(&self, state: &WorkflowState) -> Vec<AssetSummary> {
        self.assets
            .iter()
            .map(|a| AssetSummary {
                name: a.name.clone(),
                kind: a.kind(),
                processed: state.processed_assets.contains(&a.name),
            })
            .collect()
    }

    async fn process_asset(&self, kind: AssetKind, name: Option<&str>) -> Result<String, AgentError> {
        let state = self.runtime.load_state().await?;
        let asset = find_asset(&self.assets, kind, name, &state.processed_assets).ok_or_else(|| {
            AgentError::AssetNotFound(match name {
                Some(n) => n.to_string(),
                None => format!("no unprocessed {kind:?} asset"),
            })
        })?;

        let ctx = self.context().await?;
        let (placement, agent) = match kind {
            AssetKind::Image => (
                figure::process_image(self.runtime, &ctx, asset).await?,
                AgentKind::Figure,
            ),
            AssetKind::Table => (
                table::process_table(self.runtime, &ctx, asset).await?,
                AgentKind::Table,
            ),
        };
        let report = self
            .apply(&[placement.operation], PatchOptions::default(), agent)
            .await?;
        let asset_name = asset.name.clone();
        self.runtime
            .update_state(|s| {
                if !s.processed_assets.contains(&asset_name) {
                    s.processed_assets.push(asset_name);
                }
            })
            .await?;
        Ok(format!("inserted {} ({})", asset.name, report.summary()))
    }

    async fn write_section(&self, title: Option<&str>) -> Result<String, AgentError> {
        let state = self.runtime.load_state().await?;
        if state.section_plan.is_empty() {
            return Err(AgentError::MissingPlan(
                "write_section requested before a section plan exists".to_string(),
            ));
        }
        let document = self.document.get_current_document().await?;
        let headings = extract_headings(&document);
        let section = resolve_section(&state, title, &headings).ok_or_else(|| {
            AgentError::MissingPlan(match title {
                Some(t) => format!("no planned section left to write for {t:?}"),
                None => "every planned section is already drafted".to_string(),
            })
        })?;

        let ctx = self.runtime.build_context(&document, Map::new()).await?;
        let proposal = writer::write_section(self.runtime, &ctx, &section).await?;
        let report = self
            .apply(&proposal.operations, PatchOptions::default(), AgentKind::Writer)
            .await?;
        self.runtime
            .update_state(|s| s.mark_section_drafted(&section.title))
            .await?;
        Ok(format!("wrote {:?}: {}", section.title, report.summary()))
    }

    async fn critique(&self) -> Result<Critique, AgentError> {
        let ctx = self.context().await?;
        let critique = critic::critique(self.runtime, &ctx).await?;
        let summary = CritiqueSummary::from(&critique);
        self.runtime
            .update_state(|s| s.last_critique = Some(summary))
            .await?;
        self.runtime.log(
            AgentKind::Critic,
            LogKind::Info,
            format!("score {:.1}", critique.score),
            json!({ "action_items": critique.action_items.len() }),
        );
        Ok(critique)
    }

    async fn revise_with(&self, action_items: &[String]) -> Result<ApplyReport, AgentError> {
        let ctx = self.context().await?;
        let proposal = reviser::revise(self.runtime, &ctx, action_items).await?;
        self.apply(&proposal.operations, PatchOptions::revision(), AgentKind::Reviser)
            .await
    }

    async fn critique_and_improve(&self) -> Result<String, AgentError> {
        let state = self.runtime.load_state().await?;
        if state.passes_remaining() == 0 {
            return Ok(pass_limit_skip(&state));
        }
        let min_score = state.limits.min_score;

        // 上一轮修订后的复评，作为下一轮的起点
        let mut pending: Option<Critique> = None;
        let mut cycles = 0;
        let mut final_score = None;
        while cycles < MAX_CRITIQUE_CYCLES {
            if self.runtime.load_state().await?.passes_remaining() == 0 {
                break;
            }
            let current = match pending.take() {
                Some(c) => c,
                None => self.critique().await?,
            };
            cycles += 1;

            let recheck = if current.satisfied(min_score) {
                None
            } else {
                self.revise_with(&current.action_items).await?;
                Some(self.critique().await?)
            };
            self.runtime
                .update_state(|s| {
                    s.increment_pass();
                })
                .await?;

            let latest = recheck.as_ref().unwrap_or(&current);
            final_score = Some(latest.score);
            if latest.satisfied(min_score) {
                break;
            }
            pending = recheck;
        }

        Ok(match final_score {
            Some(score) => format!("{cycles} critique cycle(s), final score {score:.1}"),
            None => "no critique cycle run".to_string(),
        })
    }

    async fn revise(&self, explicit_items: &[String]) -> Result<String, AgentError> {
        let state = self.runtime.load_state().await?;
        if state.passes_remaining() == 0 {
            return Ok(pass_limit_skip(&state));
        }
        let items: Vec<String> = if explicit_items.is_empty() {
            state
                .last_critique
                .map(|c| c.action_items)
                .unwrap_or_default()
        } else {
            explicit_items.to_vec()
        };
        if items.is_empty() {
            return Ok("skipped: no action items to address".to_string());
        }
        let report = self.revise_with(&items).await?;
        self.runtime
            .update_state(|s| {
                s.increment_pass();
            })
            .await?;
        Ok(format!("addressed {} item(s): {}", items.len(), report.summary()))
    }

    fn log_error(&self, message: String, action: &str) {
        self.runtime.log(
            AgentKind::Manager,
            LogKind::Error,
            message,
            json!({ "action": action }),
        );
    }

    /// 写历史；历史写入失败只打日志，不掩盖原错误
    async fn record(&self, action: &str, summary: &str, success: bool, error: Option<String>) {
        if let Err(e) = self.runtime.add_history(action, summary, success, error).await {
            tracing::warn!(action, "failed to record action history: {}", e);
        }
    }
}

fn pass_limit_skip(state: &WorkflowState) -> String {
    format!(
        "skipped: revision pass limit reached ({}/{})",
        state.pass_index, state.limits.max_passes
    )
}

/// 选择要撰写的小节：标题归一化精确匹配 -> 包含匹配 -> 第一个文档中还没有标题且未撰写的小节
pub fn resolve_section(
    state: &WorkflowState,
    title: Option<&str>,
    headings: &[String],
) -> Option<PlanSection> {
    let plan = &state.section_plan;
    if let Some(title) = title {
        let want = normalize_title(title);
        if !want.is_empty() {
            if let Some(s) = plan.iter().find(|s| normalize_title(&s.title) == want) {
                return Some(s.clone());
            }
            if let Some(s) = plan.iter().find(|s| {
                let have = normalize_title(&s.title);
                !have.is_empty() && (have.contains(&want) || want.contains(&have))
            }) {
                return Some(s.clone());
            }
        }
    }
    plan.iter()
        .find(|s| {
            s.status() == SectionStatus::Pending
                && !state.sections_drafted.contains(&s.title)
                && !has_heading(headings, &s.title)
        })
        .cloned()
}

/// 按名称（忽略大小写，可省略扩展名）或第一个未处理的同类素材查找
pub fn find_asset<'s>(
    assets: &'s [Asset],
    kind: AssetKind,
    name: Option<&str>,
    processed: &[String],
) -> Option<&'s Asset> {
    let mut same_kind = assets.iter().filter(|a| a.kind() == kind);
    match name {
        Some(name) => same_kind.find(|a| {
            a.name.eq_ignore_ascii_case(name)
                || std::path::Path::new(&a.name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(name))
        }),
        None => same_kind.find(|a| !processed.contains(&a.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;
    use crate::state::{Limits, StateKey};

    fn planned_state() -> WorkflowState {
        let mut state = WorkflowState::new(&StateKey::document("d"), "x", Limits::default());
        state.section_plan = vec![
            PlanSection::new("Introduction", "", 0),
            PlanSection::new("Related Work", "", 0),
            PlanSection::new("Methods", "", 0),
        ];
        state
    }

    #[test]
    fn test_resolve_section_chain() {
        let state = planned_state();
        let none: Vec<String> = vec![];
        let pick = |t: Option<&str>, h: &[String]| resolve_section(&state, t, h).map(|s| s.title);

        assert_eq!(pick(Some("  methods "), &none).as_deref(), Some("Methods"));
        assert_eq!(pick(Some("Related"), &none).as_deref(), Some("Related Work"));
        // 无匹配时退回第一个缺标题的小节
        let headings = vec!["Introduction".to_string()];
        assert_eq!(pick(Some("Appendix"), &headings).as_deref(), Some("Related Work"));
        assert_eq!(pick(None, &none).as_deref(), Some("Introduction"));
    }

    #[test]
    fn test_resolve_section_all_drafted() {
        let mut state = planned_state();
        for t in ["Introduction", "Related Work", "Methods"] {
            state.mark_section_drafted(t);
        }
        assert!(resolve_section(&state, None, &[]).is_none());
    }

    #[test]
    fn test_find_asset() {
        let assets = vec![
            Asset::image("fig1.png", ImageAttachment::new("image/png", vec![1])),
            Asset::image("fig2.png", ImageAttachment::new("image/png", vec![2])),
            Asset::table("results.csv", "a,b"),
        ];
        let processed = vec!["fig1.png".to_string()];
        assert_eq!(
            find_asset(&assets, AssetKind::Image, None, &processed).map(|a| a.name.as_str()),
            Some("fig2.png")
        );
        assert_eq!(
            find_asset(&assets, AssetKind::Table, Some("RESULTS"), &[]).map(|a| a.name.as_str()),
            Some("results.csv")
        );
        assert!(find_asset(&assets, AssetKind::Table, Some("fig1.png"), &[]).is_none());
    }
}

//! 工作流
//!
//! - **action**：Manager 动作集合与决策映射
//! - **manager**：决策主循环（迭代上限 50，单次评审最多 3 轮）
//! - **citations**：独立的引用发现与插入流程

pub mod action;
pub mod citations;
pub mod manager;

pub use action::Action;
pub use citations::{CitationPipeline, CitationReport, TARGETS_PER_CALL};
pub use manager::{
    Manager, RunOutcome, StopReason, MAX_CRITIQUE_CYCLES, MAX_MANAGER_ITERATIONS,
};

//! 工作流状态与持久化
//!
//! - **types**：WorkflowState、大纲、动作历史、引用目标与参考文献
//! - **store**：StateStore trait 与进程内实现
//! - **file_store**：JSON 文件实现（CLI 默认）
//! - **sqlite_store**：sqlx 实现（`async-sqlite` feature）

pub mod file_store;
pub mod sqlite_store;
pub mod store;
pub mod types;

pub use file_store::FileStateStore;
#[cfg(feature = "async-sqlite")]
pub use sqlite_store::SqliteStateStore;
pub use store::{MemoryStateStore, StateStore};
pub use types::{
    ActionRecord, Citation, CitationTarget, CritiqueSummary, Limits, PlanSection, SectionStatus,
    StateKey, TargetStatus, WorkflowState,
};

//! 智能体层
//!
//! - **runtime**：网关调用、日志、状态读写与上下文构建
//! - **parser**：结构化输出清洗、校验与重试
//! - **context / prompts / schema**：提示词材料
//! - 各专职智能体：formatter、planner、writer、critic、reviser、figure、table、citation、decision
//!
//! 每个智能体都是 (runtime, context) -> 已校验的结构化输出，不直接修改文档或状态。

pub mod citation;
pub mod context;
pub mod critic;
pub mod decision;
pub mod figure;
pub mod formatter;
pub mod kind;
pub mod log;
pub mod parser;
pub mod planner;
pub mod prompts;
pub mod reviser;
pub mod runtime;
pub mod schema;
pub mod table;
pub mod writer;

pub use context::{word_count, Context};
pub use critic::Critique;
pub use decision::Decision;
pub use figure::AssetPlacement;
pub use kind::AgentKind;
pub use log::{LogEntry, LogKind, LogSink, MemoryLogSink, TracingLogSink};
pub use parser::{clean, parse, validate_required, with_retry, with_retry_validated};
pub use prompts::PromptLibrary;
pub use runtime::{AgentRuntime, StateHandle};
pub use writer::EditProposal;

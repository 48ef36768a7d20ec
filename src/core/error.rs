//! 错误类型与恢复动作
//!
//! 三类错误：传输/生成（LlmError，不重试）、解析/校验（ParseError，整轮重新生成一次）、
//! 策略违规（未知动作、缺少大纲、素材不存在）。RecoveryEngine 把错误映射为恢复动作。

use thiserror::Error;

use crate::llm::LlmError;

/// 结构化输出解析/校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// raw 为原始输出的前 500 个字符
    #[error("Invalid structured output: {message} (raw: {raw})")]
    InvalidJson { message: String, raw: String },

    #[error("Missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// 状态存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Workflow state not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// 工作流运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("No section plan: {0}")]
    MissingPlan(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 整轮重新生成（格式错误视为偶发）
    Regenerate,
    /// 记录失败并跳过当前步骤，主循环继续
    SkipStep,
    /// 终止整个运行（已持久化的状态仍可恢复）
    Abort,
}

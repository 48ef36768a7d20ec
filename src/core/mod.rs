//! 核心层：错误类型、恢复策略与关闭信号

pub mod error;
pub mod recovery;
pub mod shutdown;

pub use error::{AgentError, ParseError, RecoveryAction, StoreError};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};

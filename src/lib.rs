//! Quill - 多智能体长文写作引擎
//!
//! 模块划分：
//! - **agents**: 智能体运行时、结构化输出解析与各专职智能体
//! - **asset**: 待插入的图片与表格素材
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复策略、关闭信号
//! - **document**: 文档读写句柄
//! - **llm**: LLM 客户端抽象、实现（OpenAI 兼容 / DeepSeek / Mock）与生成网关路由
//! - **observability**: tracing 初始化
//! - **patch**: 编辑落地引擎（精确 / 归一化 / 行级 / 近似窗口 / 追加）
//! - **state**: WorkflowState 与状态存储
//! - **workflow**: Manager 主循环与引用流水线

pub mod agents;
pub mod asset;
pub mod config;
pub mod core;
pub mod document;
pub mod llm;
pub mod observability;
pub mod patch;
pub mod state;
pub mod workflow;

pub use agents::{AgentKind, AgentRuntime, LogEntry, LogSink};
pub use document::{DocumentHandle, FileDocument, InMemoryDocument};
pub use workflow::{CitationPipeline, CitationReport, Manager, RunOutcome};

//! 智能体日志：每次调用的输入、输出、错误与信息条目
//!
//! LogSink 是可插拔的落点；默认 TracingLogSink 转发到 tracing，测试用 MemoryLogSink 收集。

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::kind::AgentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Input,
    Output,
    Error,
    Info,
}

/// 单条日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent: AgentKind,
    pub kind: LogKind,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl LogEntry {
    pub fn new(agent: AgentKind, kind: LogKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            agent,
            kind,
            content: content.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 日志落点
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: &LogEntry);
}

impl<F> LogSink for F
where
    F: Fn(&LogEntry) + Send + Sync,
{
    fn emit(&self, entry: &LogEntry) {
        self(entry)
    }
}

/// 输出到 tracing；正文过长时只打印前 200 个字符
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

const TRACE_PREVIEW_CHARS: usize = 200;

impl LogSink for TracingLogSink {
    fn emit(&self, entry: &LogEntry) {
        let preview: String = entry.content.chars().take(TRACE_PREVIEW_CHARS).collect();
        match entry.kind {
            LogKind::Error => tracing::warn!(
                agent = %entry.agent,
                metadata = %entry.metadata,
                "{}",
                preview
            ),
            LogKind::Info => tracing::info!(agent = %entry.agent, "{}", preview),
            LogKind::Input | LogKind::Output => tracing::debug!(
                agent = %entry.agent,
                kind = ?entry.kind,
                chars = entry.content.len(),
                "{}",
                preview
            ),
        }
    }
}

/// 内存收集器
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, agent: AgentKind, kind: LogKind) -> usize {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|x| x.agent == agent && x.kind == kind).count())
            .unwrap_or(0)
    }
}

impl LogSink for MemoryLogSink {
    fn emit(&self, entry: &LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_sink() {
        let seen = AtomicUsize::new(0);
        let sink = |_: &LogEntry| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        sink.emit(&LogEntry::new(AgentKind::Writer, LogKind::Info, "hi"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_memory_sink_count() {
        let sink = MemoryLogSink::new();
        sink.emit(&LogEntry::new(AgentKind::Critic, LogKind::Error, "bad"));
        sink.emit(&LogEntry::new(AgentKind::Critic, LogKind::Output, "ok"));
        assert_eq!(sink.count(AgentKind::Critic, LogKind::Error), 1);
        assert_eq!(sink.entries().len(), 2);
        assert!(!sink.entries()[0].id.is_empty());
    }
}

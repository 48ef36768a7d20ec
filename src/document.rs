//! 文档句柄
//!
//! 工作流只通过 DocumentHandle 读写文档全文；编辑先在内存中经编辑引擎算出新全文，再一次写回。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::AgentError;

/// 当前文档的读写接口
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    async fn get_current_document(&self) -> Result<String, AgentError>;

    async fn update_document(&self, text: String) -> Result<(), AgentError>;
}

/// 内存文档
#[derive(Debug, Default)]
pub struct InMemoryDocument {
    text: RwLock<String>,
}

impl InMemoryDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: RwLock::new(text.into()),
        }
    }

    pub async fn snapshot(&self) -> String {
        self.text.read().await.clone()
    }
}

#[async_trait]
impl DocumentHandle for InMemoryDocument {
    async fn get_current_document(&self) -> Result<String, AgentError> {
        Ok(self.text.read().await.clone())
    }

    async fn update_document(&self, text: String) -> Result<(), AgentError> {
        *self.text.write().await = text;
        Ok(())
    }
}

/// 磁盘文档：文件不存在时视为空文档，写回时先写临时文件再 rename
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentHandle for FileDocument {
    async fn get_current_document(&self) -> Result<String, AgentError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AgentError::Document(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn update_document(&self, text: String) -> Result<(), AgentError> {
        let to_err = |e: std::io::Error| {
            AgentError::Document(format!("write {}: {}", self.path.display(), e))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(to_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, text).await.map_err(to_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(to_err)?;
        Ok(())
    }
}

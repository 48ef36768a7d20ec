//! 文件状态存储
//!
//! 每条状态一个 JSON 文件：`<root>/<document_id>/<section_id>.json`。
//! 先写临时文件再 rename，进程中途退出不会留下半截 JSON。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::StoreError;

use super::store::StateStore;
use super::types::{StateKey, WorkflowState};

/// JSON 文件存储
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 状态文件路径；id 中的路径分隔符等字符替换为 `_`
    pub fn path_for(&self, key: &StateKey) -> PathBuf {
        self.root
            .join(sanitize(&key.document_id))
            .join(format!("{}.json", sanitize(&key.section_id)))
    }
}

fn sanitize(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<WorkflowState>, StoreError> {
        let path = self.path_for(key);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
        let path = self.path_for(&state.key());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), "workflow state saved");
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

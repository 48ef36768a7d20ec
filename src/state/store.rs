//! 状态存储抽象
//!
//! 按 (document_id, section_id) 存取 WorkflowState。create 与 update 都是整条写回（upsert），
//! 后写覆盖先写。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::StoreError;

use super::types::{StateKey, WorkflowState};

/// 可替换的状态存储后端
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 读取状态；不存在时返回 None
    async fn get(&self, key: &StateKey) -> Result<Option<WorkflowState>, StoreError>;

    /// 写入（创建或覆盖）状态
    async fn save(&self, state: &WorkflowState) -> Result<(), StoreError>;

    /// 删除状态；不存在时不报错
    async fn delete(&self, key: &StateKey) -> Result<(), StoreError>;

    /// 读取状态；不存在时返回 NotFound
    async fn load(&self, key: &StateKey) -> Result<WorkflowState, StoreError> {
        self.get(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

/// 进程内存储，用于测试和一次性运行
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<StateKey, WorkflowState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &StateKey) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(state.key(), state.clone());
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<(), StoreError> {
        self.states.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Limits;

    #[tokio::test]
    async fn test_memory_store_upsert() {
        let store = MemoryStateStore::new();
        let key = StateKey::new("doc", "intro");
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(matches!(
            store.load(&key).await,
            Err(StoreError::NotFound(_))
        ));

        let mut state = WorkflowState::new(&key, "write it", Limits::default());
        store.save(&state).await.unwrap();
        state.pass_index = 2;
        store.save(&state).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(&key).await.unwrap().pass_index, 2);

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}

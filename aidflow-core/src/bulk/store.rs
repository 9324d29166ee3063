use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::BulkOperation;
use crate::error::{Error, Result};

/// Keyed storage for bulk-operation records.
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn insert(&self, operation: BulkOperation) -> Result<()>;
    async fn update(&self, operation: BulkOperation) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<BulkOperation>>;
    async fn list(&self) -> Result<Vec<BulkOperation>>;
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Process-local store; records live as long as the serving process.
#[derive(Default)]
pub struct InMemoryOperationStore {
    operations: RwLock<HashMap<String, BulkOperation>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn insert(&self, operation: BulkOperation) -> Result<()> {
        let mut operations = self.operations.write().await;
        if operations.contains_key(&operation.id) {
            return Err(Error::Storage(format!(
                "bulk operation '{}' already exists",
                operation.id
            )));
        }
        operations.insert(operation.id.clone(), operation);
        Ok(())
    }

    async fn update(&self, operation: BulkOperation) -> Result<()> {
        let mut operations = self.operations.write().await;
        match operations.get_mut(&operation.id) {
            Some(existing) => {
                *existing = operation;
                Ok(())
            }
            None => Err(Error::NotFound(format!("bulk operation '{}'", operation.id))),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<BulkOperation>> {
        Ok(self.operations.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<BulkOperation>> {
        Ok(self.operations.read().await.values().cloned().collect())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.operations.write().await.remove(id).is_some())
    }
}

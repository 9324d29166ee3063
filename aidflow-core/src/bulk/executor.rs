use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::{BulkAction, EntityType};
use crate::error::{Error, Result};

/// One unit of bulk work addressed to the document store.
#[derive(Debug, Clone)]
pub struct EntityRequest {
    pub operation_id: String,
    pub entity_type: EntityType,
    pub action: BulkAction,
    pub entity_id: String,
    /// Patch derived from the action and the operation payload.
    pub payload: Option<Value>,
    /// Cancelled when the owning operation is cancelled; honouring it is optional.
    pub cancellation: CancellationToken,
}

/// Per-entity collaborator supplied by the CRUD layer.
#[async_trait]
pub trait EntityExecutor: Send + Sync {
    async fn apply(&self, request: &EntityRequest) -> Result<()>;

    /// Reads one document for `export` operations.
    async fn fetch(&self, request: &EntityRequest) -> Result<Value> {
        Err(Error::executor_with_code(
            format!("export is not supported for '{}'", request.entity_type),
            "unsupported",
        ))
    }
}

pub mod bulk;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod runtime;
pub mod workflows;

pub use bulk::{BulkOperation, BulkOperationManager, EntityExecutor, EntityRequest};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use workflows::{StepHandler, StepHandlerRegistry, WorkflowExecutor};

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use workflows::{builtin_templates, WorkflowDefinition, WorkflowLoader};

pub struct AidFlow {
    config: Config,
    runtime: runtime::Runtime,
}

impl AidFlow {
    pub fn new(
        config: Config,
        executor: Arc<dyn EntityExecutor>,
        handlers: StepHandlerRegistry,
    ) -> Result<Self> {
        config::validate_config(&config)?;
        let runtime = runtime::Runtime::new(config.clone(), executor, handlers);
        Ok(Self { config, runtime })
    }

    pub fn from_config_path(
        path: &Path,
        executor: Arc<dyn EntityExecutor>,
        handlers: StepHandlerRegistry,
    ) -> Result<Self> {
        let config = config::load(Some(path))?;
        Self::new(config, executor, handlers)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime(&self) -> &runtime::Runtime {
        &self.runtime
    }

    pub fn bulk(&self) -> &BulkOperationManager {
        &self.runtime.bulk
    }

    pub fn workflows(&self) -> &WorkflowExecutor {
        &self.runtime.workflows
    }

    pub fn events(&self) -> &EventBus {
        &self.runtime.event_bus
    }

    /// Validates a raw request and, when it is acceptable, starts the operation.
    ///
    /// An invalid request fails synchronously and creates no record.
    pub async fn submit_bulk(
        &self,
        entity_type: &str,
        action: &str,
        entity_ids: Vec<String>,
        payload: Option<Value>,
    ) -> Result<BulkOperation> {
        let (entity_type, action) = self.runtime.validator.validate_request(
            entity_type,
            action,
            &entity_ids,
            payload.as_ref(),
        )?;
        self.runtime
            .bulk
            .create_operation(entity_type, action, entity_ids, payload)
            .await
    }

    /// Stores every definition found in `workflows.definitions_dir`, if configured.
    pub async fn load_workflow_definitions(&self, created_by: &str) -> Result<Vec<WorkflowDefinition>> {
        let Some(dir) = self.config.workflows.definitions_dir.as_deref() else {
            return Ok(Vec::new());
        };

        let mut stored = Vec::new();
        for workflow in WorkflowLoader::load_dir(Path::new(dir))? {
            stored.push(self.runtime.workflow_store.create(workflow, created_by).await?);
        }
        tracing::info!(count = stored.len(), dir, "workflow definitions loaded");
        Ok(stored)
    }

    pub async fn install_builtin_templates(&self, created_by: &str) -> Result<Vec<WorkflowDefinition>> {
        let mut stored = Vec::new();
        for template in builtin_templates() {
            stored.push(self.runtime.workflow_store.create(template, created_by).await?);
        }
        Ok(stored)
    }
}

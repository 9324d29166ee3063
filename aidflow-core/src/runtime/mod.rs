use std::sync::Arc;

use crate::bulk::{
    BulkOperationManager, BulkOperationValidator, EntityActionRegistry, EntityExecutor,
    InMemoryOperationStore, OperationStore,
};
use crate::config::Config;
use crate::events::EventBus;
use crate::workflows::{InMemoryWorkflowStore, StepHandlerRegistry, WorkflowExecutor, WorkflowStore};

/// Explicitly owned wiring of every service; nothing here is a process-wide singleton.
pub struct Runtime {
    pub event_bus: EventBus,
    pub validator: BulkOperationValidator,
    pub bulk: BulkOperationManager,
    pub workflow_store: Arc<dyn WorkflowStore>,
    pub workflows: WorkflowExecutor,
    pub config: Config,
}

impl Runtime {
    /// Wires the services over in-memory stores.
    pub fn new(
        config: Config,
        executor: Arc<dyn EntityExecutor>,
        handlers: StepHandlerRegistry,
    ) -> Self {
        Self::with_stores(
            config,
            executor,
            handlers,
            Arc::new(InMemoryOperationStore::new()),
            Arc::new(InMemoryWorkflowStore::new()),
        )
    }

    pub fn with_stores(
        config: Config,
        executor: Arc<dyn EntityExecutor>,
        mut handlers: StepHandlerRegistry,
        operations: Arc<dyn OperationStore>,
        workflow_store: Arc<dyn WorkflowStore>,
    ) -> Self {
        let event_bus = EventBus::new(config.events.buffer_size);
        let validator =
            BulkOperationValidator::new(EntityActionRegistry::new(), config.bulk.max_entity_ids);
        let bulk = BulkOperationManager::new(
            operations,
            executor,
            event_bus.clone(),
            config.bulk.clone(),
        );

        handlers.register_builtins(config.workflows.wait_max_ms);
        let workflows = WorkflowExecutor::new(
            workflow_store.clone(),
            Arc::new(handlers),
            event_bus.clone(),
            config.workflows.clone(),
        );

        Self {
            event_bus,
            validator,
            bulk,
            workflow_store,
            workflows,
            config,
        }
    }
}

pub mod conditions;
pub mod executor;
pub mod handlers;
pub mod loader;
pub mod store;
pub mod templates;
pub mod types;

pub use executor::WorkflowExecutor;
pub use handlers::{StepHandler, StepHandlerRegistry};
pub use loader::WorkflowLoader;
pub use store::{InMemoryWorkflowStore, WorkflowStore};
pub use templates::builtin_templates;
pub use types::{
    ConditionOperator, ExecutionStatus, NewWorkflow, StepResult, StepStatus, WorkflowCondition,
    WorkflowDefinition, WorkflowExecutionResult, WorkflowStatus, WorkflowStep, WorkflowTrigger,
    WorkflowUpdate,
};

use crate::bulk::types::BulkOperation;
use crate::workflows::types::{ExecutionStatus, StepStatus};

#[derive(Debug, Clone)]
pub enum Event {
    /// Snapshot published after every status or progress change.
    OperationUpdated(BulkOperation),
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
    },
    WorkflowStepFinished {
        execution_id: String,
        workflow_id: String,
        step_id: String,
        status: StepStatus,
    },
    WorkflowFinished {
        execution_id: String,
        workflow_id: String,
        status: ExecutionStatus,
    },
}

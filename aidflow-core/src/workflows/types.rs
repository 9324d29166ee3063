use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTrigger {
    BeneficiaryCreated,
    DonationReceived,
    AidApplicationSubmitted,
    TaskAssigned,
    MeetingScheduled,
    DeadlineApproaching,
    #[default]
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Inactive,
    Draft,
    Testing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WorkflowCondition {
    /// Dotted path into the input, e.g. `donor.email`.
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub config: Value,
    #[serde(alias = "continueOnError")]
    pub continue_on_error: bool,
}

impl Default for WorkflowStep {
    fn default() -> Self {
        Self {
            id: String::new(),
            step_type: String::new(),
            config: Value::Object(serde_json::Map::new()),
            continue_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trigger: WorkflowTrigger,
    pub status: WorkflowStatus,
    pub enabled: bool,
    pub conditions: Vec<WorkflowCondition>,
    pub steps: Vec<WorkflowStep>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub execution_count: u64,
    pub last_executed: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn is_runnable(&self) -> bool {
        self.enabled && self.status != WorkflowStatus::Inactive
    }
}

/// Fields a caller supplies when creating a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NewWorkflow {
    /// Stable id for definitions loaded from files; generated when absent.
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub trigger: WorkflowTrigger,
    pub status: WorkflowStatus,
    pub conditions: Vec<WorkflowCondition>,
    pub steps: Vec<WorkflowStep>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger: Option<WorkflowTrigger>,
    pub status: Option<WorkflowStatus>,
    pub enabled: Option<bool>,
    pub conditions: Option<Vec<WorkflowCondition>>,
    pub steps: Option<Vec<WorkflowStep>>,
}

pub fn validate_definition(name: &str, steps: &[WorkflowStep]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("workflow name cannot be empty".to_owned()));
    }

    let mut step_ids = HashSet::new();
    for step in steps {
        let id = step.id.trim();
        if id.is_empty() {
            return Err(Error::Validation(format!(
                "workflow '{name}' has a step without an id"
            )));
        }
        if step.step_type.trim().is_empty() {
            return Err(Error::Validation(format!(
                "workflow step '{id}' has no type"
            )));
        }
        if !step_ids.insert(id) {
            return Err(Error::Validation(format!(
                "workflow '{name}' has duplicate step id '{id}'"
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl StepResult {
    pub fn success(step_id: &str, output: Value) -> Self {
        Self {
            step_id: step_id.to_owned(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(step_id: &str, error: String) -> Self {
        Self {
            step_id: step_id.to_owned(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
        }
    }

    pub fn skipped(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_owned(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub step_results: Vec<StepResult>,
    /// Input plus every successful step output keyed by step id.
    pub context: Value,
}

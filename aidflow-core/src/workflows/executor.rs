use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::conditions::first_unmet;
use super::handlers::StepHandlerRegistry;
use super::store::WorkflowStore;
use super::templates::render_value;
use super::types::{
    ExecutionStatus, StepResult, StepStatus, WorkflowExecutionResult, WorkflowStep,
};
use crate::config::schema::WorkflowsConfig;
use crate::error::{panic_message, Error, Result};
use crate::events::{Event, EventBus};

/// Runs workflow definitions step by step against the registered handlers.
///
/// Steps run strictly in order; each successful output is merged into the
/// context under its step id so later steps can reference it.
#[derive(Clone)]
pub struct WorkflowExecutor {
    workflows: Arc<dyn WorkflowStore>,
    handlers: Arc<StepHandlerRegistry>,
    events: EventBus,
    history: Arc<RwLock<VecDeque<WorkflowExecutionResult>>>,
    config: WorkflowsConfig,
}

impl WorkflowExecutor {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        handlers: Arc<StepHandlerRegistry>,
        events: EventBus,
        config: WorkflowsConfig,
    ) -> Self {
        Self {
            workflows,
            handlers,
            events,
            history: Arc::new(RwLock::new(VecDeque::new())),
            config,
        }
    }

    pub fn handlers(&self) -> &StepHandlerRegistry {
        &self.handlers
    }

    pub async fn execute(&self, workflow_id: &str, input: Value) -> Result<WorkflowExecutionResult> {
        let definition = self.workflows.get(workflow_id).await?;
        if !definition.is_runnable() {
            return Err(Error::Validation(format!(
                "workflow '{}' is not active",
                definition.id
            )));
        }

        let mut context = seed_context(input);
        if let Some(unmet) = first_unmet(&definition.conditions, &context) {
            return Err(Error::Validation(format!(
                "workflow '{}' conditions not met: '{}' {:?}",
                definition.id, unmet.field, unmet.operator
            )));
        }

        let execution_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(
            workflow_id = %definition.id,
            execution_id = %execution_id,
            steps = definition.steps.len(),
            "workflow execution started"
        );
        self.events.publish(Event::WorkflowStarted {
            execution_id: execution_id.clone(),
            workflow_id: definition.id.clone(),
        });

        let mut step_results = Vec::with_capacity(definition.steps.len());
        let mut halted = false;
        let mut status = ExecutionStatus::Success;

        for step in &definition.steps {
            let result = if halted {
                StepResult::skipped(&step.id)
            } else {
                let result = self.run_step(step, &context).await;
                match result.status {
                    StepStatus::Success => {
                        if let (Value::Object(map), Some(output)) = (&mut context, &result.output) {
                            map.insert(step.id.clone(), output.clone());
                        }
                    }
                    StepStatus::Failed if !step.continue_on_error => {
                        halted = true;
                        status = ExecutionStatus::Failed;
                    }
                    _ => {}
                }
                result
            };

            self.events.publish(Event::WorkflowStepFinished {
                execution_id: execution_id.clone(),
                workflow_id: definition.id.clone(),
                step_id: step.id.clone(),
                status: result.status,
            });
            step_results.push(result);
        }

        let finished_at = Utc::now();
        if let Err(err) = self.workflows.record_execution(&definition.id, finished_at).await {
            tracing::warn!(workflow_id = %definition.id, %err, "failed to record workflow execution");
        }

        let execution = WorkflowExecutionResult {
            execution_id,
            workflow_id: definition.id,
            started_at,
            finished_at,
            status,
            step_results,
            context,
        };
        tracing::info!(
            workflow_id = %execution.workflow_id,
            execution_id = %execution.execution_id,
            status = %execution.status,
            "workflow execution finished"
        );

        self.remember(execution.clone()).await;
        self.events.publish(Event::WorkflowFinished {
            execution_id: execution.execution_id.clone(),
            workflow_id: execution.workflow_id.clone(),
            status: execution.status,
        });
        Ok(execution)
    }

    /// Recent results, newest first, optionally limited to one workflow.
    pub async fn executions(&self, workflow_id: Option<&str>) -> Vec<WorkflowExecutionResult> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .filter(|execution| workflow_id.map_or(true, |id| execution.workflow_id == id))
            .cloned()
            .collect()
    }

    async fn run_step(&self, step: &WorkflowStep, context: &Value) -> StepResult {
        let Some(handler) = self.handlers.get(&step.step_type) else {
            tracing::warn!(step_id = %step.id, step_type = %step.step_type, "unknown step type");
            return StepResult::failed(&step.id, format!("unknown step type '{}'", step.step_type));
        };

        let config = render_value(&step.config, context);
        let outcome = AssertUnwindSafe(handler.run(&config, context))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(output)) => {
                tracing::debug!(step_id = %step.id, step_type = %step.step_type, "step succeeded");
                StepResult::success(&step.id, output)
            }
            Ok(Err(err)) => {
                tracing::warn!(step_id = %step.id, step_type = %step.step_type, %err, "step failed");
                StepResult::failed(&step.id, err.unit_reason())
            }
            Err(panic) => {
                let reason = format!("step handler panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(step_id = %step.id, step_type = %step.step_type, %reason, "step handler panicked");
                StepResult::failed(&step.id, reason)
            }
        }
    }

    async fn remember(&self, execution: WorkflowExecutionResult) {
        if self.config.history_limit == 0 {
            return;
        }
        let mut history = self.history.write().await;
        history.push_back(execution);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }
}

fn seed_context(input: Value) -> Value {
    match input {
        Value::Object(map) => Value::Object(map),
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("input".to_owned(), other);
            Value::Object(map)
        }
    }
}

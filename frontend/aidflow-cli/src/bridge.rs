use aidflow_core::error::{Error, Result};
use aidflow_core::{EntityExecutor, EntityRequest, StepHandler, StepHandlerRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Step types provided by the notification, document and messaging services.
const EXTERNAL_STEP_TYPES: &[&str] = &[
    "send-notification",
    "create-document",
    "create-task",
    "send-email",
    "send-sms",
    "move-to-stage",
    "assign-user",
    "update-status",
    "generate-report",
];

/// Logs every call instead of touching a document store.
pub struct DryRunExecutor {
    fail_ids: HashSet<String>,
    delay: Duration,
}

impl DryRunExecutor {
    pub fn new(fail_ids: impl IntoIterator<Item = String>, delay_ms: u64) -> Self {
        Self {
            fail_ids: fail_ids.into_iter().collect(),
            delay: Duration::from_millis(delay_ms),
        }
    }

    async fn simulate(&self, request: &EntityRequest) -> Result<()> {
        tokio::select! {
            _ = request.cancellation.cancelled() => {
                return Err(Error::executor_with_code("cancelled before completion", "cancelled"));
            }
            _ = sleep(self.delay) => {}
        }

        if self.fail_ids.contains(&request.entity_id) {
            return Err(Error::executor_with_code(
                format!("{} '{}' rejected by dry run", request.entity_type, request.entity_id),
                "dry_run",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityExecutor for DryRunExecutor {
    async fn apply(&self, request: &EntityRequest) -> Result<()> {
        tracing::info!(
            operation_id = %request.operation_id,
            entity_type = %request.entity_type,
            action = %request.action,
            entity_id = %request.entity_id,
            patch = ?request.payload,
            "dry run apply"
        );
        self.simulate(request).await
    }

    async fn fetch(&self, request: &EntityRequest) -> Result<Value> {
        tracing::info!(
            operation_id = %request.operation_id,
            entity_type = %request.entity_type,
            entity_id = %request.entity_id,
            "dry run fetch"
        );
        self.simulate(request).await?;
        Ok(json!({
            "id": request.entity_id,
            "entityType": request.entity_type.as_str(),
        }))
    }
}

/// Reports what an external service would have been asked to do.
struct EchoStepHandler {
    step_type: &'static str,
}

#[async_trait]
impl StepHandler for EchoStepHandler {
    async fn run(&self, config: &Value, _context: &Value) -> Result<Value> {
        tracing::info!(step_type = self.step_type, %config, "dry run step");
        Ok(json!({
            "dryRun": true,
            "stepType": self.step_type,
            "config": config,
        }))
    }
}

pub fn dry_run_handlers() -> StepHandlerRegistry {
    let mut registry = StepHandlerRegistry::new();
    for step_type in EXTERNAL_STEP_TYPES {
        registry.register(*step_type, Arc::new(EchoStepHandler { step_type: *step_type }));
    }
    registry
}

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::conditions::first_unmet;
use super::types::WorkflowCondition;
use crate::error::{Error, Result};

pub const WAIT_STEP: &str = "wait";
pub const CONDITIONAL_BRANCH_STEP: &str = "conditional-branch";

/// Performs the effect of one workflow step type.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, config: &Value, context: &Value) -> Result<Value>;
}

#[derive(Default, Clone)]
pub struct StepHandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl StepHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the handlers that need no outside service.
    pub fn with_builtins(wait_max_ms: u64) -> Self {
        let mut registry = Self::new();
        registry.register_builtins(wait_max_ms);
        registry
    }

    /// Adds `wait` and `conditional-branch` unless the caller already registered them.
    pub fn register_builtins(&mut self, wait_max_ms: u64) {
        if !self.contains(WAIT_STEP) {
            self.register(WAIT_STEP, Arc::new(WaitHandler::new(wait_max_ms)));
        }
        if !self.contains(CONDITIONAL_BRANCH_STEP) {
            self.register(CONDITIONAL_BRANCH_STEP, Arc::new(ConditionalBranchHandler));
        }
    }

    pub fn register(&mut self, step_type: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(step_type.into(), handler);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(step_type).cloned()
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.handlers.contains_key(step_type)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Sleeps for `durationMs`, capped at the configured maximum.
pub struct WaitHandler {
    max_ms: u64,
}

impl WaitHandler {
    pub fn new(max_ms: u64) -> Self {
        Self { max_ms }
    }
}

#[async_trait]
impl StepHandler for WaitHandler {
    async fn run(&self, config: &Value, _context: &Value) -> Result<Value> {
        let requested = config
            .get("durationMs")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::StepHandler("wait step requires a non-negative integer 'durationMs'".to_owned())
            })?;

        let waited = requested.min(self.max_ms);
        if waited < requested {
            tracing::debug!(requested, waited, "wait step capped");
        }
        sleep(Duration::from_millis(waited)).await;
        Ok(json!({ "waitedMs": waited }))
    }
}

/// Evaluates `conditions` against the run context and reports `{ "matched": bool }`.
///
/// With `failWhenFalse: true` an unmatched branch fails the step instead.
pub struct ConditionalBranchHandler;

#[async_trait]
impl StepHandler for ConditionalBranchHandler {
    async fn run(&self, config: &Value, context: &Value) -> Result<Value> {
        let conditions: Vec<WorkflowCondition> = match config.get("conditions") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|err| {
                Error::StepHandler(format!("invalid conditions for conditional-branch: {err}"))
            })?,
            None => Vec::new(),
        };
        let fail_when_false = config
            .get("failWhenFalse")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match first_unmet(&conditions, context) {
            None => Ok(json!({ "matched": true })),
            Some(unmet) if fail_when_false => Err(Error::StepHandler(format!(
                "branch condition on '{}' not met",
                unmet.field
            ))),
            Some(_) => Ok(json!({ "matched": false })),
        }
    }
}

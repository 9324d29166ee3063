use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::{validate_definition, NewWorkflow, WorkflowDefinition, WorkflowUpdate};
use crate::error::{Error, Result};

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, workflow: NewWorkflow, created_by: &str) -> Result<WorkflowDefinition>;
    async fn get(&self, id: &str) -> Result<WorkflowDefinition>;
    async fn list(&self) -> Result<Vec<WorkflowDefinition>>;
    async fn update(&self, id: &str, update: WorkflowUpdate) -> Result<WorkflowDefinition>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn record_execution(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &str) -> Error {
    Error::NotFound(format!("workflow '{id}'"))
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, workflow: NewWorkflow, created_by: &str) -> Result<WorkflowDefinition> {
        validate_definition(&workflow.name, &workflow.steps)?;

        let id = workflow
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        let definition = WorkflowDefinition {
            id: id.clone(),
            name: workflow.name,
            description: workflow.description,
            trigger: workflow.trigger,
            status: workflow.status,
            enabled: true,
            conditions: workflow.conditions,
            steps: workflow.steps,
            created_by: created_by.to_owned(),
            created_at: now,
            updated_at: now,
            execution_count: 0,
            last_executed: None,
        };

        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&id) {
            return Err(Error::Validation(format!("workflow '{id}' already exists")));
        }
        workflows.insert(id, definition.clone());
        tracing::debug!(workflow_id = %definition.id, name = %definition.name, "workflow created");
        Ok(definition)
    }

    async fn get(&self, id: &str) -> Result<WorkflowDefinition> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>> {
        let mut workflows: Vec<WorkflowDefinition> =
            self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|left, right| left.name.cmp(&right.name).then(left.id.cmp(&right.id)));
        Ok(workflows)
    }

    async fn update(&self, id: &str, update: WorkflowUpdate) -> Result<WorkflowDefinition> {
        let mut workflows = self.workflows.write().await;
        let existing = workflows.get_mut(id).ok_or_else(|| not_found(id))?;

        let name = update.name.as_ref().unwrap_or(&existing.name);
        let steps = update.steps.as_ref().unwrap_or(&existing.steps);
        validate_definition(name, steps)?;

        if let Some(name) = update.name {
            existing.name = name;
        }
        if let Some(description) = update.description {
            existing.description = description;
        }
        if let Some(trigger) = update.trigger {
            existing.trigger = trigger;
        }
        if let Some(status) = update.status {
            existing.status = status;
        }
        if let Some(enabled) = update.enabled {
            existing.enabled = enabled;
        }
        if let Some(conditions) = update.conditions {
            existing.conditions = conditions;
        }
        if let Some(steps) = update.steps {
            existing.steps = steps;
        }
        existing.updated_at = Utc::now();

        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.workflows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn record_execution(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let existing = workflows.get_mut(id).ok_or_else(|| not_found(id))?;
        existing.execution_count += 1;
        existing.last_executed = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::types::{WorkflowStatus, WorkflowStep};

    fn new_workflow(name: &str) -> NewWorkflow {
        NewWorkflow {
            name: name.to_owned(),
            steps: vec![WorkflowStep {
                id: "pause".to_owned(),
                step_type: "wait".to_owned(),
                ..WorkflowStep::default()
            }],
            ..NewWorkflow::default()
        }
    }

    #[tokio::test]
    async fn supports_full_crud_cycle() {
        let store = InMemoryWorkflowStore::new();
        let created = store
            .create(new_workflow("Intake"), "coordinator")
            .await
            .expect("create");
        assert_eq!(created.created_by, "coordinator");
        assert!(created.enabled);

        let fetched = store.get(&created.id).await.expect("get");
        assert_eq!(fetched.name, "Intake");

        let updated = store
            .update(
                &created.id,
                WorkflowUpdate {
                    name: Some("Intake v2".to_owned()),
                    status: Some(WorkflowStatus::Draft),
                    ..WorkflowUpdate::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.name, "Intake v2");
        assert_eq!(updated.status, WorkflowStatus::Draft);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.steps.len(), 1);

        assert_eq!(store.list().await.expect("list").len(), 1);
        store.delete(&created.id).await.expect("delete");

        let error = store.get(&created.id).await.expect_err("deleted");
        assert!(matches!(error, Error::NotFound(_)));
        let error = store.delete(&created.id).await.expect_err("double delete");
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_invalid_updates_without_mutating() {
        let store = InMemoryWorkflowStore::new();
        let created = store.create(new_workflow("Intake"), "admin").await.expect("create");

        store
            .update(
                &created.id,
                WorkflowUpdate {
                    name: Some(String::new()),
                    ..WorkflowUpdate::default()
                },
            )
            .await
            .expect_err("blank name");
        assert_eq!(store.get(&created.id).await.expect("get").name, "Intake");
    }

    #[tokio::test]
    async fn keeps_supplied_ids_unique() {
        let store = InMemoryWorkflowStore::new();
        let mut workflow = new_workflow("Receipt");
        workflow.id = Some("receipt".to_owned());

        store.create(workflow.clone(), "admin").await.expect("first");
        let error = store.create(workflow, "admin").await.expect_err("second");
        assert!(error.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn records_executions() {
        let store = InMemoryWorkflowStore::new();
        let created = store.create(new_workflow("Intake"), "admin").await.expect("create");
        let at = Utc::now();

        store.record_execution(&created.id, at).await.expect("record");
        let fetched = store.get(&created.id).await.expect("get");
        assert_eq!(fetched.execution_count, 1);
        assert_eq!(fetched.last_executed, Some(at));
    }
}

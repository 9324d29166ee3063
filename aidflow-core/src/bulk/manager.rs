use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use super::executor::{EntityExecutor, EntityRequest};
use super::export::build_csv_export;
use super::registry::EntityActionRegistry;
use super::store::OperationStore;
use super::types::{BulkAction, BulkOperation, EntityType, OperationStatus};
use crate::config::schema::BulkConfig;
use crate::error::{panic_message, Error, Result};
use crate::events::{Event, EventBus};

enum UnitOutcome {
    Succeeded(Option<Value>),
    Failed {
        reason: String,
        code: Option<String>,
    },
    Skipped,
}

/// Shared state of one running operation. The mutex is the single writer lock:
/// every counter change and its store write happen while it is held.
struct RunState {
    operation_id: String,
    record: Mutex<BulkOperation>,
    exported: Mutex<Vec<Value>>,
    cancellation: CancellationToken,
    entity_type: EntityType,
    action: BulkAction,
    patch: Option<Value>,
}

#[derive(Clone)]
pub struct BulkOperationManager {
    store: Arc<dyn OperationStore>,
    executor: Arc<dyn EntityExecutor>,
    registry: EntityActionRegistry,
    events: EventBus,
    in_flight: Arc<Semaphore>,
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
    config: BulkConfig,
}

impl BulkOperationManager {
    pub fn new(
        store: Arc<dyn OperationStore>,
        executor: Arc<dyn EntityExecutor>,
        events: EventBus,
        config: BulkConfig,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let max_in_flight = config.max_in_flight.max(worker_count);
        Self {
            store,
            executor,
            registry: EntityActionRegistry::new(),
            events,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            cancellations: Arc::new(RwLock::new(HashMap::new())),
            config: BulkConfig {
                worker_count,
                max_in_flight,
                ..config
            },
        }
    }

    /// Accepts an already validated request and starts processing it in the background.
    ///
    /// Returns the `running` record before any executor call completes.
    pub async fn create_operation(
        &self,
        entity_type: EntityType,
        action: BulkAction,
        entity_ids: Vec<String>,
        payload: Option<Value>,
    ) -> Result<BulkOperation> {
        let mut operation = BulkOperation::new(entity_type, action, entity_ids, payload);
        operation.transition(OperationStatus::Validating)?;
        operation.transition(OperationStatus::Running)?;

        // Registered first so a cancel never sees a stored record without its token.
        let cancellation = CancellationToken::new();
        self.cancellations
            .write()
            .await
            .insert(operation.id.clone(), cancellation.clone());
        if let Err(err) = self.store.insert(operation.clone()).await {
            self.cancellations.write().await.remove(&operation.id);
            return Err(err);
        }
        self.events.publish(Event::OperationUpdated(operation.clone()));

        tracing::info!(
            operation_id = %operation.id,
            entity_type = %entity_type,
            action = %action,
            total = operation.progress.total,
            "bulk operation started"
        );

        let manager = self.clone();
        let record = operation.clone();
        tokio::spawn(async move {
            manager.process(record, cancellation).await;
        });

        Ok(operation)
    }

    pub async fn get_operation(&self, id: &str) -> Result<BulkOperation> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("bulk operation '{id}'")))
    }

    /// Requests cooperative cancellation. Repeated calls and calls on finished
    /// operations are no-ops.
    pub async fn cancel_operation(&self, id: &str) -> Result<()> {
        let operation = self.get_operation(id).await?;
        if operation.is_terminal() {
            tracing::debug!(
                operation_id = %id,
                status = %operation.status,
                "cancel ignored for finished operation"
            );
            return Ok(());
        }

        if let Some(token) = self.cancellations.read().await.get(id) {
            if !token.is_cancelled() {
                tracing::info!(operation_id = %id, "bulk operation cancellation requested");
            }
            token.cancel();
        }
        Ok(())
    }

    /// All known operations, most recently created first.
    pub async fn list_operations(&self) -> Result<Vec<BulkOperation>> {
        let mut operations = self.store.list().await?;
        operations.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(operations)
    }

    pub async fn operations_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<BulkOperation>> {
        Ok(self
            .list_operations()
            .await?
            .into_iter()
            .filter(|operation| operation.status == status)
            .collect())
    }

    /// Drops finished operations that completed before `cutoff`. Running
    /// operations are never touched.
    pub async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for operation in self.store.list().await? {
            let expired = operation.is_terminal()
                && operation
                    .completed_at
                    .is_some_and(|completed_at| completed_at < cutoff);
            if expired && self.store.remove(&operation.id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, %cutoff, "purged finished bulk operations");
        }
        Ok(removed)
    }

    /// Purges finished operations older than the configured retention window.
    pub async fn purge_expired(&self) -> Result<usize> {
        let retention_days = self.config.retention_days;
        let cutoff = TimeDelta::try_days(retention_days)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .ok_or_else(|| {
                Error::Config(format!(
                    "bulk.retention_days ({retention_days}) is out of range"
                ))
            })?;
        self.purge_finished_before(cutoff).await
    }

    async fn process(&self, operation: BulkOperation, cancellation: CancellationToken) {
        let operation_id = operation.id.clone();

        let mut seen = HashSet::new();
        let mut unique_ids = Vec::with_capacity(operation.entity_ids.len());
        for entity_id in &operation.entity_ids {
            if seen.insert(entity_id.as_str()) {
                unique_ids.push(entity_id.clone());
            }
        }
        let duplicates = operation.entity_ids.len() - unique_ids.len();

        let state = RunState {
            operation_id: operation_id.clone(),
            entity_type: operation.entity_type,
            action: operation.action,
            patch: self
                .registry
                .document_patch(operation.action, operation.payload.as_ref()),
            record: Mutex::new(operation),
            exported: Mutex::new(Vec::new()),
            cancellation,
        };

        if duplicates > 0 {
            let mut record = state.record.lock().await;
            record.record_skipped(duplicates);
            self.persist(&record).await;
        }

        stream::iter(unique_ids)
            .for_each_concurrent(self.config.worker_count, |entity_id| {
                let state = &state;
                async move {
                    let outcome = self.run_unit(state, &entity_id).await;
                    self.record_outcome(state, &entity_id, outcome).await;
                }
            })
            .await;

        self.finish(&state).await;
        self.cancellations.write().await.remove(&operation_id);
    }

    async fn run_unit(&self, state: &RunState, entity_id: &str) -> UnitOutcome {
        if state.cancellation.is_cancelled() {
            return UnitOutcome::Skipped;
        }

        let _permit = match self.in_flight.acquire().await {
            Ok(permit) => permit,
            Err(_) => return UnitOutcome::Skipped,
        };

        // The flag may have flipped while waiting for a slot.
        if state.cancellation.is_cancelled() {
            return UnitOutcome::Skipped;
        }

        let request = EntityRequest {
            operation_id: state.operation_id.clone(),
            entity_type: state.entity_type,
            action: state.action,
            entity_id: entity_id.to_owned(),
            payload: state.patch.clone(),
            cancellation: state.cancellation.child_token(),
        };

        let call = async {
            if request.action == BulkAction::Export {
                self.executor.fetch(&request).await.map(Some)
            } else {
                self.executor.apply(&request).await.map(|_| None)
            }
        };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(document)) => UnitOutcome::Succeeded(document),
            Ok(Err(err)) => UnitOutcome::Failed {
                reason: err.unit_reason(),
                code: err.code().map(str::to_owned),
            },
            Err(panic) => UnitOutcome::Failed {
                reason: format!("executor panicked: {}", panic_message(panic.as_ref())),
                code: Some("internal".to_owned()),
            },
        }
    }

    async fn record_outcome(&self, state: &RunState, entity_id: &str, outcome: UnitOutcome) {
        let mut record = state.record.lock().await;
        match outcome {
            UnitOutcome::Succeeded(document) => {
                if let Some(document) = document {
                    state.exported.lock().await.push(document);
                }
                record.record_success();
            }
            UnitOutcome::Failed { reason, code } => {
                tracing::warn!(
                    operation_id = %record.id,
                    entity_id,
                    reason = %reason,
                    "bulk unit failed"
                );
                record.record_failure(entity_id, reason, code);
            }
            UnitOutcome::Skipped => record.record_skipped(1),
        }
        self.persist(&record).await;
    }

    async fn finish(&self, state: &RunState) {
        let mut record = state.record.lock().await;

        let status = if state.cancellation.is_cancelled() {
            OperationStatus::Cancelled
        } else if record.progress.failed == 0 {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };

        if record.action == BulkAction::Export && status != OperationStatus::Cancelled {
            let documents = state.exported.lock().await;
            match build_csv_export(record.entity_type, &documents, Utc::now()) {
                Ok(export) => record.result = Some(export),
                Err(err) => {
                    tracing::warn!(operation_id = %record.id, %err, "failed to build export file")
                }
            }
        }

        if let Err(err) = record.transition(status) {
            tracing::warn!(operation_id = %record.id, %err, "bulk operation finished twice");
            return;
        }
        self.persist(&record).await;

        tracing::info!(
            operation_id = %record.id,
            status = %record.status,
            succeeded = record.progress.succeeded,
            failed = record.progress.failed,
            skipped = record.progress.skipped,
            "bulk operation finished"
        );
    }

    async fn persist(&self, record: &BulkOperation) {
        if let Err(err) = self.store.update(record.clone()).await {
            tracing::warn!(operation_id = %record.id, %err, "failed to persist bulk operation");
        }
        self.events.publish(Event::OperationUpdated(record.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::store::InMemoryOperationStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct ScriptedExecutor {
        fail_ids: HashSet<String>,
        panic_ids: HashSet<String>,
        delay_ms: u64,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak_active: AtomicUsize,
        requests: StdMutex<Vec<EntityRequest>>,
    }

    impl ScriptedExecutor {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail_ids: ids.iter().map(|id| (*id).to_owned()).collect(),
                ..Self::default()
            }
        }

        async fn enter(&self, request: &EntityRequest) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(active, Ordering::SeqCst);
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());

            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.expect("gate open");
            }
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
        }
    }

    #[async_trait]
    impl EntityExecutor for ScriptedExecutor {
        async fn apply(&self, request: &EntityRequest) -> Result<()> {
            self.enter(request).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panic_ids.contains(&request.entity_id) {
                panic!("document store client crashed");
            }
            if self.fail_ids.contains(&request.entity_id) {
                return Err(Error::executor_with_code(
                    format!("failed to {} {}", request.action, request.entity_type),
                    "store_error",
                ));
            }
            Ok(())
        }

        async fn fetch(&self, request: &EntityRequest) -> Result<Value> {
            self.enter(request).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"id": request.entity_id, "amount": 25}))
        }
    }

    fn manager_with(executor: Arc<ScriptedExecutor>, config: BulkConfig) -> BulkOperationManager {
        BulkOperationManager::new(
            Arc::new(InMemoryOperationStore::new()),
            executor,
            EventBus::default(),
            config,
        )
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    async fn wait_for_terminal(manager: &BulkOperationManager, id: &str) -> BulkOperation {
        for _ in 0..500 {
            let operation = manager.get_operation(id).await.expect("operation exists");
            if operation.is_terminal() {
                return operation;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("operation {id} did not finish");
    }

    #[tokio::test]
    async fn returns_running_record_before_any_unit_completes() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(ScriptedExecutor {
            gate: Some(gate.clone()),
            ..ScriptedExecutor::default()
        });
        let manager = manager_with(executor.clone(), BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Beneficiary, BulkAction::Archive, ids(&["a", "b"]), None)
            .await
            .expect("create");

        assert_eq!(operation.status, OperationStatus::Running);
        assert_eq!(operation.progress.total, 2);
        assert_eq!(operation.progress.processed(), 0);

        sleep(Duration::from_millis(2)).await;
        gate.add_permits(10);
        let finished = wait_for_terminal(&manager, &operation.id).await;
        assert_eq!(finished.status, OperationStatus::Completed);
        assert_eq!(finished.progress.succeeded, 2);
        assert_eq!(finished.progress.skipped, 0);
        assert!(finished.updated_at > operation.updated_at);

        let requests = executor.requests.lock().expect("requests lock");
        assert!(requests
            .iter()
            .all(|request| request.payload == Some(json!({"status": "archived"}))));
    }

    #[tokio::test]
    async fn single_failure_marks_whole_operation_failed() {
        let executor = Arc::new(ScriptedExecutor::failing(&["b"]));
        let manager = manager_with(executor, BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Donation, BulkAction::Delete, ids(&["a", "b", "c"]), None)
            .await
            .expect("create");
        let finished = wait_for_terminal(&manager, &operation.id).await;

        assert_eq!(finished.status, OperationStatus::Failed);
        assert_eq!(finished.progress.succeeded, 2);
        assert_eq!(finished.progress.failed, 1);
        assert_eq!(finished.progress.skipped, 0);
        assert_eq!(finished.errors.len(), 1);
        assert_eq!(finished.errors[0].entity_id, "b");
        assert!(finished.errors[0].reason.contains("failed to delete donation"));
        assert_eq!(finished.errors[0].code.as_deref(), Some("store_error"));
    }

    #[tokio::test]
    async fn natural_completion_accounts_for_every_id() {
        let executor = Arc::new(ScriptedExecutor::failing(&["id-3", "id-17", "id-40"]));
        let manager = manager_with(executor, BulkConfig::default());
        let entity_ids: Vec<String> = (0..50).map(|index| format!("id-{index}")).collect();

        let operation = manager
            .create_operation(EntityType::Task, BulkAction::Delete, entity_ids, None)
            .await
            .expect("create");
        let finished = wait_for_terminal(&manager, &operation.id).await;

        assert_eq!(
            finished.progress.succeeded + finished.progress.failed,
            finished.progress.total
        );
        assert_eq!(finished.progress.skipped, 0);
        let failed: HashSet<&str> = finished
            .errors
            .iter()
            .map(|error| error.entity_id.as_str())
            .collect();
        assert_eq!(failed, HashSet::from(["id-3", "id-17", "id-40"]));
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_every_id() {
        let executor = Arc::new(ScriptedExecutor::default());
        let manager = manager_with(executor.clone(), BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::User, BulkAction::Deactivate, ids(&["u1", "u2", "u3"]), None)
            .await
            .expect("create");
        manager.cancel_operation(&operation.id).await.expect("cancel");

        let finished = wait_for_terminal(&manager, &operation.id).await;
        assert_eq!(finished.status, OperationStatus::Cancelled);
        assert_eq!(finished.progress.succeeded, 0);
        assert_eq!(finished.progress.failed, 0);
        assert_eq!(finished.progress.skipped, 3);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_ignored_after_finish() {
        let executor = Arc::new(ScriptedExecutor::default());
        let manager = manager_with(executor, BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Message, BulkAction::Delete, ids(&["m1"]), None)
            .await
            .expect("create");
        manager.cancel_operation(&operation.id).await.expect("first cancel");
        manager.cancel_operation(&operation.id).await.expect("second cancel");
        let cancelled = wait_for_terminal(&manager, &operation.id).await;
        assert_eq!(cancelled.status, OperationStatus::Cancelled);

        manager
            .cancel_operation(&operation.id)
            .await
            .expect("cancel after finish");
        let after = manager.get_operation(&operation.id).await.expect("get");
        assert_eq!(after.status, OperationStatus::Cancelled);
        assert_eq!(after.progress, cancelled.progress);
        assert_eq!(after.updated_at, cancelled.updated_at);

        let completed = manager
            .create_operation(EntityType::Message, BulkAction::Delete, ids(&["m2"]), None)
            .await
            .expect("create");
        let completed = wait_for_terminal(&manager, &completed.id).await;
        manager
            .cancel_operation(&completed.id)
            .await
            .expect("cancel completed");
        let after = manager.get_operation(&completed.id).await.expect("get");
        assert_eq!(after.status, OperationStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_mid_flight_lets_in_flight_units_finish() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(ScriptedExecutor {
            gate: Some(gate.clone()),
            ..ScriptedExecutor::default()
        });
        let config = BulkConfig {
            worker_count: 2,
            ..BulkConfig::default()
        };
        let manager = manager_with(executor.clone(), config);
        let entity_ids: Vec<String> = (0..10).map(|index| format!("b-{index}")).collect();

        let operation = manager
            .create_operation(EntityType::Beneficiary, BulkAction::Delete, entity_ids, None)
            .await
            .expect("create");

        while executor.calls.load(Ordering::SeqCst) < 2 {
            sleep(Duration::from_millis(1)).await;
        }
        manager.cancel_operation(&operation.id).await.expect("cancel");
        gate.add_permits(100);

        let finished = wait_for_terminal(&manager, &operation.id).await;
        assert_eq!(finished.status, OperationStatus::Cancelled);
        assert_eq!(finished.progress.succeeded, 2);
        assert_eq!(finished.progress.skipped, 8);
        assert_eq!(finished.progress.processed(), finished.progress.total);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn executor_panic_is_isolated_to_its_id() {
        let executor = Arc::new(ScriptedExecutor {
            panic_ids: HashSet::from(["boom".to_owned()]),
            ..ScriptedExecutor::default()
        });
        let manager = manager_with(executor, BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Document, BulkAction::Archive, ids(&["ok-1", "boom", "ok-2"]), None)
            .await
            .expect("create");
        let finished = wait_for_terminal(&manager, &operation.id).await;

        assert_eq!(finished.status, OperationStatus::Failed);
        assert_eq!(finished.progress.succeeded, 2);
        assert_eq!(finished.progress.failed, 1);
        assert!(finished.errors[0].reason.contains("executor panicked"));
        assert_eq!(finished.errors[0].code.as_deref(), Some("internal"));
    }

    #[tokio::test]
    async fn duplicate_ids_are_processed_once() {
        let executor = Arc::new(ScriptedExecutor::default());
        let manager = manager_with(executor.clone(), BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Task, BulkAction::Archive, ids(&["t1", "t1", "t2"]), None)
            .await
            .expect("create");
        let finished = wait_for_terminal(&manager, &operation.id).await;

        assert_eq!(finished.status, OperationStatus::Completed);
        assert_eq!(finished.progress.total, 3);
        assert_eq!(finished.progress.succeeded, 2);
        assert_eq!(finished.progress.skipped, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded_and_reads_stay_consistent() {
        let executor = Arc::new(ScriptedExecutor {
            delay_ms: 2,
            ..ScriptedExecutor::failing(&["n-5", "n-50"])
        });
        let config = BulkConfig {
            worker_count: 3,
            ..BulkConfig::default()
        };
        let manager = manager_with(executor.clone(), config);
        let entity_ids: Vec<String> = (0..120).map(|index| format!("n-{index}")).collect();

        let operation = manager
            .create_operation(EntityType::User, BulkAction::Activate, entity_ids, None)
            .await
            .expect("create");

        let reader = {
            let manager = manager.clone();
            let id = operation.id.clone();
            tokio::spawn(async move {
                let mut last_processed = 0;
                loop {
                    let snapshot = manager.get_operation(&id).await.expect("get");
                    let processed = snapshot.progress.processed();
                    assert!(processed <= snapshot.progress.total);
                    assert!(processed >= last_processed, "progress went backwards");
                    last_processed = processed;
                    if snapshot.is_terminal() {
                        return snapshot;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let finished = reader.await.expect("reader task");
        assert_eq!(finished.status, OperationStatus::Failed);
        assert_eq!(finished.progress.succeeded, 118);
        assert_eq!(finished.progress.failed, 2);
        assert!(executor.peak_active.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn export_attaches_csv_of_fetched_documents() {
        let executor = Arc::new(ScriptedExecutor::default());
        let manager = manager_with(executor, BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Donation, BulkAction::Export, ids(&["d1", "d2"]), None)
            .await
            .expect("create");
        let finished = wait_for_terminal(&manager, &operation.id).await;

        assert_eq!(finished.status, OperationStatus::Completed);
        let export = finished.result.expect("export file");
        assert_eq!(export.rows, 2);
        assert!(export.filename.starts_with("donations-export-"));
        assert!(export.content.starts_with("amount,id"));
    }

    #[tokio::test]
    async fn publishes_progress_events_until_terminal() {
        let executor = Arc::new(ScriptedExecutor::default());
        let manager = manager_with(executor, BulkConfig::default());
        let mut events = manager.events.subscribe();

        let operation = manager
            .create_operation(EntityType::Meeting, BulkAction::Archive, ids(&["x", "y"]), None)
            .await
            .expect("create");

        let mut statuses = Vec::new();
        let mut last_updated = operation.updated_at;
        loop {
            match events.recv().await.expect("event") {
                Event::OperationUpdated(snapshot) if snapshot.id == operation.id => {
                    assert!(snapshot.updated_at >= last_updated);
                    last_updated = snapshot.updated_at;
                    statuses.push((snapshot.status, snapshot.progress.processed()));
                    if snapshot.is_terminal() {
                        break;
                    }
                }
                _ => {}
            }
        }

        assert_eq!(statuses.first(), Some(&(OperationStatus::Running, 0)));
        assert_eq!(statuses.last(), Some(&(OperationStatus::Completed, 2)));
        assert!(statuses.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[tokio::test]
    async fn unknown_operation_is_not_found() {
        let manager = manager_with(Arc::new(ScriptedExecutor::default()), BulkConfig::default());

        let error = manager.get_operation("missing").await.expect_err("missing");
        assert!(matches!(error, Error::NotFound(_)));
        let error = manager
            .cancel_operation("missing")
            .await
            .expect_err("missing cancel");
        assert!(error.to_string().contains("bulk operation 'missing'"));
    }

    #[tokio::test]
    async fn purges_only_finished_operations_past_cutoff() {
        let manager = manager_with(Arc::new(ScriptedExecutor::default()), BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Task, BulkAction::Delete, ids(&["t1"]), None)
            .await
            .expect("create");
        wait_for_terminal(&manager, &operation.id).await;

        assert_eq!(manager.purge_expired().await.expect("purge"), 0);
        let removed = manager
            .purge_finished_before(Utc::now() + TimeDelta::seconds(1))
            .await
            .expect("purge");
        assert_eq!(removed, 1);
        assert!(manager.list_operations().await.expect("list").is_empty());
    }

    /// Holds each inserted record visible in the store until the gate opens.
    struct GatedInsertStore {
        inner: InMemoryOperationStore,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl OperationStore for GatedInsertStore {
        async fn insert(&self, operation: BulkOperation) -> Result<()> {
            self.inner.insert(operation).await?;
            let _permit = self.gate.acquire().await.expect("gate open");
            Ok(())
        }

        async fn update(&self, operation: BulkOperation) -> Result<()> {
            self.inner.update(operation).await
        }

        async fn get(&self, id: &str) -> Result<Option<BulkOperation>> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<BulkOperation>> {
            self.inner.list().await
        }

        async fn remove(&self, id: &str) -> Result<bool> {
            self.inner.remove(id).await
        }
    }

    #[tokio::test]
    async fn cancel_reaches_operation_as_soon_as_it_is_listed() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(ScriptedExecutor::default());
        let manager = BulkOperationManager::new(
            Arc::new(GatedInsertStore {
                inner: InMemoryOperationStore::new(),
                gate: gate.clone(),
            }),
            executor.clone(),
            EventBus::default(),
            BulkConfig::default(),
        );

        let creating = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .create_operation(EntityType::Task, BulkAction::Archive, ids(&["t1", "t2"]), None)
                    .await
            })
        };

        let listed = loop {
            if let Some(operation) = manager.list_operations().await.expect("list").pop() {
                break operation;
            }
            tokio::task::yield_now().await;
        };
        manager.cancel_operation(&listed.id).await.expect("cancel");
        gate.add_permits(1);
        creating.await.expect("create task").expect("create");

        let finished = wait_for_terminal(&manager, &listed.id).await;
        assert_eq!(finished.status, OperationStatus::Cancelled);
        assert_eq!(finished.progress.skipped, 2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_after_every_id_started_still_ends_cancelled() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(ScriptedExecutor {
            gate: Some(gate.clone()),
            ..ScriptedExecutor::default()
        });
        let manager = manager_with(executor.clone(), BulkConfig::default());

        let operation = manager
            .create_operation(EntityType::Meeting, BulkAction::Archive, ids(&["m1", "m2"]), None)
            .await
            .expect("create");
        while executor.calls.load(Ordering::SeqCst) < 2 {
            sleep(Duration::from_millis(1)).await;
        }
        manager.cancel_operation(&operation.id).await.expect("cancel");
        gate.add_permits(10);

        let finished = wait_for_terminal(&manager, &operation.id).await;
        assert_eq!(finished.status, OperationStatus::Cancelled);
        assert_eq!(finished.progress.succeeded, 2);
        assert_eq!(finished.progress.skipped, 0);
    }

    #[tokio::test]
    async fn purge_expired_rejects_out_of_range_retention() {
        for retention_days in [200_000_000, i64::MAX] {
            let manager = manager_with(
                Arc::new(ScriptedExecutor::default()),
                BulkConfig {
                    retention_days,
                    ..BulkConfig::default()
                },
            );

            let error = manager.purge_expired().await.expect_err("retention out of range");
            assert!(matches!(error, Error::Config(_)));
            assert!(error.to_string().contains("out of range"));
        }
    }
}

use serde::{Deserialize, Serialize};

/// Hard ceiling on the number of entity ids a single bulk operation accepts.
pub const MAX_ENTITY_IDS_CEILING: usize = 1000;
pub const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub bulk: BulkConfig,
    pub workflows: WorkflowsConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    pub max_entity_ids: usize,
    /// Workers pulling ids for a single operation.
    pub worker_count: usize,
    /// Executor calls allowed in flight across every running operation.
    pub max_in_flight: usize,
    pub retention_days: i64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_entity_ids: MAX_ENTITY_IDS_CEILING,
            worker_count: 8,
            max_in_flight: 64,
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    pub history_limit: usize,
    pub wait_max_ms: u64,
    pub definitions_dir: Option<String>,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            history_limit: 200,
            wait_max_ms: 60_000,
            definitions_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

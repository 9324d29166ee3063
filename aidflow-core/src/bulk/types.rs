use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    User,
    Beneficiary,
    Donation,
    AidApplication,
    Meeting,
    Task,
    Document,
    Message,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::User,
        EntityType::Beneficiary,
        EntityType::Donation,
        EntityType::AidApplication,
        EntityType::Meeting,
        EntityType::Task,
        EntityType::Document,
        EntityType::Message,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Beneficiary => "beneficiary",
            EntityType::Donation => "donation",
            EntityType::AidApplication => "aid-application",
            EntityType::Meeting => "meeting",
            EntityType::Task => "task",
            EntityType::Document => "document",
            EntityType::Message => "message",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        EntityType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("unknown entity type '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Delete,
    Update,
    Export,
    Archive,
    Activate,
    Deactivate,
    Assign,
    Tag,
}

impl BulkAction {
    pub const ALL: [BulkAction; 8] = [
        BulkAction::Delete,
        BulkAction::Update,
        BulkAction::Export,
        BulkAction::Archive,
        BulkAction::Activate,
        BulkAction::Deactivate,
        BulkAction::Assign,
        BulkAction::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BulkAction::Delete => "delete",
            BulkAction::Update => "update",
            BulkAction::Export => "export",
            BulkAction::Archive => "archive",
            BulkAction::Activate => "activate",
            BulkAction::Deactivate => "deactivate",
            BulkAction::Assign => "assign",
            BulkAction::Tag => "tag",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkAction {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        BulkAction::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("unknown action '{value}'")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Validating,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            OperationStatus::Pending => 0,
            OperationStatus::Validating => 1,
            OperationStatus::Running => 2,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled => 3,
        }
    }

    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Validating => "validating",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BulkProgress {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl BulkProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed())
    }

    /// Whole-number completion percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let percent = self.processed().min(self.total) * 100 / self.total;
        percent as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkOperationError {
    pub entity_id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// CSV produced by an `export` operation from the documents fetched for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: String,
    pub rows: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    pub id: String,
    pub entity_type: EntityType,
    pub action: BulkAction,
    pub entity_ids: Vec<String>,
    pub payload: Option<Value>,
    pub status: OperationStatus,
    pub progress: BulkProgress,
    pub errors: Vec<BulkOperationError>,
    pub result: Option<ExportFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkOperation {
    pub fn new(
        entity_type: EntityType,
        action: BulkAction,
        entity_ids: Vec<String>,
        payload: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            action,
            progress: BulkProgress::new(entity_ids.len()),
            entity_ids,
            payload,
            status: OperationStatus::Pending,
            errors: Vec::new(),
            result: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn transition(&mut self, next: OperationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "bulk operation '{}' cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == OperationStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn record_success(&mut self) {
        self.progress.succeeded += 1;
        self.touch();
    }

    pub fn record_failure(&mut self, entity_id: &str, reason: String, code: Option<String>) {
        self.progress.failed += 1;
        self.errors.push(BulkOperationError {
            entity_id: entity_id.to_owned(),
            reason,
            code,
        });
        self.touch();
    }

    pub fn record_skipped(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.progress.skipped += count;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

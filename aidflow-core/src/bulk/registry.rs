use serde_json::{json, Value};
use std::collections::BTreeSet;

use super::types::{BulkAction, EntityType};

use super::types::BulkAction::{Activate, Archive, Assign, Deactivate, Delete, Export, Tag, Update};

/// Which bulk actions apply to which entity types, and what each action needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityActionRegistry;

impl EntityActionRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn actions_for(&self, entity_type: EntityType) -> &'static [BulkAction] {
        match entity_type {
            EntityType::User => &[Delete, Update, Export, Activate, Deactivate],
            EntityType::Beneficiary => &[Delete, Update, Export, Archive, Assign, Tag],
            EntityType::Donation => &[Delete, Update, Export, Archive],
            EntityType::AidApplication => {
                &[Delete, Update, Export, Archive, Activate, Deactivate]
            }
            EntityType::Meeting => &[Delete, Update, Export, Archive],
            EntityType::Task => &[Delete, Update, Export, Archive, Assign],
            EntityType::Document => &[Delete, Update, Export, Archive],
            EntityType::Message => &[Delete, Export, Archive],
        }
    }

    pub fn allows(&self, entity_type: EntityType, action: BulkAction) -> bool {
        self.actions_for(entity_type).contains(&action)
    }

    /// String-keyed lookup; unknown entity types or actions are never valid.
    pub fn is_valid(&self, entity_type: &str, action: &str) -> bool {
        match (entity_type.parse::<EntityType>(), action.parse::<BulkAction>()) {
            (Ok(entity_type), Ok(action)) => self.allows(entity_type, action),
            _ => false,
        }
    }

    pub fn required_fields(&self, entity_type: &str, action: &str) -> BTreeSet<&'static str> {
        match (entity_type.parse::<EntityType>(), action.parse::<BulkAction>()) {
            (Ok(entity_type), Ok(action)) => self.required_fields_for(entity_type, action),
            _ => BTreeSet::new(),
        }
    }

    pub fn required_fields_for(
        &self,
        entity_type: EntityType,
        action: BulkAction,
    ) -> BTreeSet<&'static str> {
        if !self.allows(entity_type, action) {
            return BTreeSet::new();
        }

        match action {
            Assign => BTreeSet::from(["assigneeId"]),
            Tag => BTreeSet::from(["tags"]),
            _ => BTreeSet::new(),
        }
    }

    /// Document patch handed to the entity executor for `action`.
    ///
    /// `delete` and `export` carry no patch. `update` forwards the caller payload as-is.
    pub fn document_patch(&self, action: BulkAction, payload: Option<&Value>) -> Option<Value> {
        match action {
            Delete | Export => None,
            Update => payload.cloned(),
            Archive => Some(json!({ "status": "archived" })),
            Activate => Some(json!({ "isActive": true })),
            Deactivate => Some(json!({ "isActive": false })),
            Assign => payload
                .and_then(|value| value.get("assigneeId"))
                .map(|assignee| json!({ "assignedTo": assignee })),
            Tag => payload
                .and_then(|value| value.get("tags"))
                .map(|tags| json!({ "tags": tags })),
        }
    }
}

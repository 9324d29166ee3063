use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::EntityActionRegistry;
use super::types::{BulkAction, EntityType};
use crate::config::schema::MAX_ENTITY_IDS_CEILING;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Rejects malformed bulk requests before any record exists.
#[derive(Debug, Clone)]
pub struct BulkOperationValidator {
    registry: EntityActionRegistry,
    max_entity_ids: usize,
}

impl Default for BulkOperationValidator {
    fn default() -> Self {
        Self::new(EntityActionRegistry::new(), MAX_ENTITY_IDS_CEILING)
    }
}

impl BulkOperationValidator {
    pub fn new(registry: EntityActionRegistry, max_entity_ids: usize) -> Self {
        Self {
            registry,
            max_entity_ids: max_entity_ids.clamp(1, MAX_ENTITY_IDS_CEILING),
        }
    }

    pub fn registry(&self) -> &EntityActionRegistry {
        &self.registry
    }

    pub fn max_entity_ids(&self) -> usize {
        self.max_entity_ids
    }

    pub fn validate(
        &self,
        entity_type: &str,
        action: &str,
        entity_ids: &[String],
        payload: Option<&Value>,
    ) -> ValidationReport {
        let mut errors = Vec::new();

        if entity_ids.is_empty() {
            errors.push("at least one entity must be selected".to_owned());
        }

        if entity_ids.len() > self.max_entity_ids {
            errors.push(format!(
                "maximum {} entities can be processed at once (got {})",
                self.max_entity_ids,
                entity_ids.len()
            ));
        }

        if entity_ids.iter().any(|id| id.trim().is_empty()) {
            errors.push("entity ids cannot be empty".to_owned());
        }

        let parsed_type = entity_type.parse::<EntityType>();
        let parsed_action = action.parse::<BulkAction>();
        if let Err(err) = &parsed_type {
            errors.push(err.unit_reason());
        }
        if let Err(err) = &parsed_action {
            errors.push(err.unit_reason());
        }

        if let (Ok(entity_type), Ok(action)) = (parsed_type, parsed_action) {
            if !self.registry.allows(entity_type, action) {
                errors.push(format!(
                    "action '{action}' is not valid for '{entity_type}'"
                ));
            }

            for field in self.registry.required_fields_for(entity_type, action) {
                let present = payload
                    .and_then(|value| value.get(field))
                    .is_some_and(is_non_empty);
                if !present {
                    errors.push(format!("field '{field}' is required for '{action}'"));
                }
            }

            if action == BulkAction::Update && !payload.is_some_and(is_non_empty_object) {
                errors.push("'update' requires a non-empty payload object".to_owned());
            }
        }

        ValidationReport::from_errors(errors)
    }

    /// Validates and returns the parsed entity type and action, or every violation at once.
    pub fn validate_request(
        &self,
        entity_type: &str,
        action: &str,
        entity_ids: &[String],
        payload: Option<&Value>,
    ) -> Result<(EntityType, BulkAction)> {
        let report = self.validate(entity_type, action, entity_ids, payload);
        if !report.valid {
            return Err(Error::Validation(report.errors.join("; ")));
        }

        Ok((entity_type.parse()?, action.parse()?))
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn is_non_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| !map.is_empty())
}

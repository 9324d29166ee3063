use serde_json::Value;

use super::types::{ConditionOperator, WorkflowCondition};

/// Resolves a dotted path (`$.donor.email`, `donor.email`, `items.0`) inside `value`.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.trim().is_empty() {
        return None;
    }

    let normalized = path.trim().strip_prefix('$').unwrap_or(path.trim());
    let normalized = normalized.strip_prefix('.').unwrap_or(normalized);
    if normalized.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in normalized.split('.') {
        if part.is_empty() {
            continue;
        }
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }
    Some(current)
}

pub fn evaluate_condition(condition: &WorkflowCondition, data: &Value) -> bool {
    let actual = extract_path(data, &condition.field).filter(|value| !value.is_null());
    let expected = condition.value.as_ref();

    match condition.operator {
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::Equals => actual.unwrap_or(&Value::Null) == expected.unwrap_or(&Value::Null),
        ConditionOperator::NotEquals => {
            actual.unwrap_or(&Value::Null) != expected.unwrap_or(&Value::Null)
        }
        ConditionOperator::GreaterThan => compare(actual, expected)
            .is_some_and(|ordering| ordering == std::cmp::Ordering::Greater),
        ConditionOperator::LessThan => compare(actual, expected)
            .is_some_and(|ordering| ordering == std::cmp::Ordering::Less),
        ConditionOperator::Contains => match (actual, expected) {
            (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
            (Some(haystack), Some(needle)) => as_text(haystack).contains(&as_text(needle)),
            _ => false,
        },
    }
}

/// Returns the first condition that does not hold, if any.
pub fn first_unmet<'a>(
    conditions: &'a [WorkflowCondition],
    data: &Value,
) -> Option<&'a WorkflowCondition> {
    conditions
        .iter()
        .find(|condition| !evaluate_condition(condition, data))
}

fn compare(actual: Option<&Value>, expected: Option<&Value>) -> Option<std::cmp::Ordering> {
    let (actual, expected) = (actual?, expected?);
    match (actual.as_f64(), expected.as_f64()) {
        (Some(left), Some(right)) => left.partial_cmp(&right),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(left), Some(right)) => Some(left.cmp(right)),
            _ => None,
        },
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

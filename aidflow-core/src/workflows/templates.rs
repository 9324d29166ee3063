use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

use super::conditions::extract_path;
use super::types::{
    ConditionOperator, NewWorkflow, WorkflowCondition, WorkflowStatus, WorkflowStep,
    WorkflowTrigger,
};

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_$.\-]+)\s*\}\}").ok())
        .as_ref()
}

/// Replaces `{{path}}` placeholders in every string of `value` using `context`.
///
/// A string that is exactly one placeholder takes the referenced value with its
/// JSON type; placeholders embedded in text are interpolated, with missing paths
/// rendered as empty text.
pub fn render_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(text) => render_text(text, context),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), render_value(item, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_text(text: &str, context: &Value) -> Value {
    let Some(pattern) = placeholder_pattern() else {
        return Value::String(text.to_owned());
    };

    if let Some(captures) = pattern.captures(text.trim()) {
        let whole = captures.get(0).map(|m| m.as_str().len()) == Some(text.trim().len());
        if whole {
            return extract_path(context, &captures[1])
                .cloned()
                .unwrap_or(Value::Null);
        }
    }

    let rendered = pattern.replace_all(text, |captures: &regex::Captures<'_>| {
        match extract_path(context, &captures[1]) {
            Some(Value::String(inner)) => inner.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    });
    Value::String(rendered.into_owned())
}

fn step(id: &str, step_type: &str, config: Value) -> WorkflowStep {
    WorkflowStep {
        id: id.to_owned(),
        step_type: step_type.to_owned(),
        config,
        continue_on_error: false,
    }
}

fn equals(field: &str, value: Value) -> WorkflowCondition {
    WorkflowCondition {
        field: field.to_owned(),
        operator: ConditionOperator::Equals,
        value: Some(value),
    }
}

/// Ready-made workflows for the common dashboard automations.
pub fn builtin_templates() -> Vec<NewWorkflow> {
    vec![
        NewWorkflow {
            id: Some("template-beneficiary-welcome".to_owned()),
            name: "New beneficiary welcome".to_owned(),
            description: "Schedule an intake interview when a beneficiary is registered".to_owned(),
            trigger: WorkflowTrigger::BeneficiaryCreated,
            status: WorkflowStatus::Active,
            conditions: vec![equals("status", json!("active"))],
            steps: vec![
                step(
                    "create-interview-task",
                    "create-task",
                    json!({
                        "title": "Interview new beneficiary {{name}}",
                        "description": "Plan the post-registration interview",
                        "priority": "normal"
                    }),
                ),
                step(
                    "notify-staff",
                    "send-notification",
                    json!({
                        "type": "beneficiary_registered",
                        "title": "New beneficiary",
                        "message": "{{name}} was registered"
                    }),
                ),
            ],
        },
        NewWorkflow {
            id: Some("template-donation-receipt".to_owned()),
            name: "Donation receipt".to_owned(),
            description: "Thank the donor once a donation is received".to_owned(),
            trigger: WorkflowTrigger::DonationReceived,
            status: WorkflowStatus::Active,
            conditions: vec![equals("status", json!("completed"))],
            steps: vec![
                WorkflowStep {
                    continue_on_error: true,
                    ..step(
                        "send-receipt",
                        "send-email",
                        json!({
                            "to": "{{donor_email}}",
                            "subject": "Thank you for your donation",
                            "template": "donation_receipt",
                            "data": {
                                "donorName": "{{donor_name}}",
                                "amount": "{{amount}}",
                                "date": "{{date}}"
                            }
                        }),
                    )
                },
                step(
                    "follow-up-task",
                    "create-task",
                    json!({
                        "title": "Donation follow-up",
                        "description": "Complete post-donation follow-up",
                        "priority": "low"
                    }),
                ),
            ],
        },
        NewWorkflow {
            id: Some("template-task-deadline-reminder".to_owned()),
            name: "Task deadline reminder".to_owned(),
            description: "Remind the assignee when a task deadline is close".to_owned(),
            trigger: WorkflowTrigger::DeadlineApproaching,
            status: WorkflowStatus::Active,
            conditions: vec![WorkflowCondition {
                field: "days_until_due".to_owned(),
                operator: ConditionOperator::LessThan,
                value: Some(json!(2)),
            }],
            steps: vec![
                step(
                    "notify-assignee",
                    "send-notification",
                    json!({
                        "type": "deadline_reminder",
                        "title": "Task deadline approaching",
                        "message": "{{title}} is due on {{due_date}}"
                    }),
                ),
                step(
                    "email-assignee",
                    "send-email",
                    json!({
                        "to": "{{assignee_email}}",
                        "subject": "Task reminder: {{title}}",
                        "template": "task_reminder",
                        "data": {
                            "title": "{{title}}",
                            "dueDate": "{{due_date}}",
                            "description": "{{description}}"
                        }
                    }),
                ),
            ],
        },
        NewWorkflow {
            id: Some("template-aid-application-review".to_owned()),
            name: "Aid application review".to_owned(),
            description: "Open a review task for newly submitted aid applications".to_owned(),
            trigger: WorkflowTrigger::AidApplicationSubmitted,
            status: WorkflowStatus::Active,
            conditions: vec![equals("stage", json!("draft"))],
            steps: vec![
                step(
                    "create-review-task",
                    "create-task",
                    json!({
                        "title": "Review aid application",
                        "description": "Review the application and record a decision",
                        "priority": "high"
                    }),
                ),
                step(
                    "move-to-review",
                    "move-to-stage",
                    json!({ "applicationId": "{{id}}", "stage": "under_review" }),
                ),
                step(
                    "notify-reviewers",
                    "send-notification",
                    json!({
                        "type": "aid_application",
                        "title": "New aid application",
                        "message": "Aid application {{id}} is waiting for review"
                    }),
                ),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::types::validate_definition;

    #[test]
    fn whole_placeholder_keeps_json_type() {
        let context = json!({"amount": 250, "donor": {"name": "Elif"}});
        assert_eq!(render_value(&json!("{{amount}}"), &context), json!(250));
        assert_eq!(
            render_value(&json!({"to": "{{ donor.name }}"}), &context),
            json!({"to": "Elif"})
        );
    }

    #[test]
    fn embedded_placeholders_interpolate_and_blank_missing_paths() {
        let context = json!({"title": "Food parcels", "count": 3});
        assert_eq!(
            render_value(&json!("{{title}} x{{count}} for {{missing}}"), &context),
            json!("Food parcels x3 for ")
        );
        assert_eq!(render_value(&json!(["{{missing}}"]), &context), json!([null]));
    }

    #[test]
    fn builtin_templates_are_valid_definitions() {
        let templates = builtin_templates();
        assert_eq!(templates.len(), 4);
        for template in &templates {
            validate_definition(&template.name, &template.steps).expect("template is valid");
            assert!(template.id.is_some());
        }
    }
}

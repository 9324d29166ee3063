use crate::cli::OutputFormat;
use aidflow_core::bulk::{BulkOperation, ValidationReport};
use aidflow_core::events::Event;
use aidflow_core::workflows::{NewWorkflow, WorkflowExecutionResult};
use serde::Serialize;
use serde_json::json;

pub struct Renderer {
    output_format: OutputFormat,
}

impl Renderer {
    pub fn new(output_format: OutputFormat) -> Self {
        Self { output_format }
    }

    pub fn render_event(&self, event: &Event) {
        match self.output_format {
            OutputFormat::Text => self.render_text(event),
            OutputFormat::Json => self.render_json(event),
        }
    }

    fn render_text(&self, event: &Event) {
        match event {
            Event::OperationUpdated(operation) => {
                let progress = &operation.progress;
                println!(
                    "[bulk:{}] {} {}% ({} ok, {} failed, {} skipped of {})",
                    short_id(&operation.id),
                    operation.status,
                    progress.percent(),
                    progress.succeeded,
                    progress.failed,
                    progress.skipped,
                    progress.total
                );
            }
            Event::WorkflowStarted { workflow_id, .. } => {
                println!("[workflow:{workflow_id}] started");
            }
            Event::WorkflowStepFinished {
                workflow_id,
                step_id,
                status,
                ..
            } => println!("[workflow:{workflow_id}] step {step_id}: {status}"),
            Event::WorkflowFinished {
                workflow_id,
                status,
                ..
            } => println!("[workflow:{workflow_id}] finished: {status}"),
        }
    }

    fn render_json(&self, event: &Event) {
        let value = match event {
            Event::OperationUpdated(operation) => json!({
                "type": "operation_updated",
                "operation": operation,
            }),
            Event::WorkflowStarted {
                execution_id,
                workflow_id,
            } => json!({
                "type": "workflow_started",
                "execution_id": execution_id,
                "workflow_id": workflow_id,
            }),
            Event::WorkflowStepFinished {
                execution_id,
                workflow_id,
                step_id,
                status,
            } => json!({
                "type": "workflow_step_finished",
                "execution_id": execution_id,
                "workflow_id": workflow_id,
                "step_id": step_id,
                "status": status,
            }),
            Event::WorkflowFinished {
                execution_id,
                workflow_id,
                status,
            } => json!({
                "type": "workflow_finished",
                "execution_id": execution_id,
                "workflow_id": workflow_id,
                "status": status,
            }),
        };
        println!("{value}");
    }

    pub fn render_report(&self, report: &ValidationReport) {
        match self.output_format {
            OutputFormat::Json => print_json(report),
            OutputFormat::Text if report.valid => println!("Request is valid."),
            OutputFormat::Text => {
                println!("Request is invalid:");
                for error in &report.errors {
                    println!("- {error}");
                }
            }
        }
    }

    pub fn render_operation(&self, operation: &BulkOperation) {
        match self.output_format {
            OutputFormat::Json => print_json(operation),
            OutputFormat::Text => {
                println!(
                    "Operation {} {} {}: {}",
                    operation.id, operation.action, operation.entity_type, operation.status
                );
                for error in &operation.errors {
                    match &error.code {
                        Some(code) => println!("- {}: {} [{code}]", error.entity_id, error.reason),
                        None => println!("- {}: {}", error.entity_id, error.reason),
                    }
                }
            }
        }
    }

    pub fn render_execution(&self, execution: &WorkflowExecutionResult) {
        match self.output_format {
            OutputFormat::Json => print_json(execution),
            OutputFormat::Text => {
                println!(
                    "Workflow {} run {}: {}",
                    execution.workflow_id, execution.execution_id, execution.status
                );
                for step in &execution.step_results {
                    match &step.error {
                        Some(error) => println!("- {} {} ({error})", step.step_id, step.status),
                        None => println!("- {} {}", step.step_id, step.status),
                    }
                }
            }
        }
    }

    pub fn render_templates(&self, templates: &[NewWorkflow]) {
        match self.output_format {
            OutputFormat::Json => print_json(&templates),
            OutputFormat::Text => {
                for template in templates {
                    println!(
                        "{} - {} ({} steps)",
                        template.id.as_deref().unwrap_or("-"),
                        template.name,
                        template.steps.len()
                    );
                    if !template.description.is_empty() {
                        println!("  {}", template.description);
                    }
                }
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to serialize output: {err}"),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

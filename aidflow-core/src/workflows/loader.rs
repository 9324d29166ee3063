use jsonschema::JSONSchema;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::types::{validate_definition, NewWorkflow};
use crate::error::{Error, Result};

/// Reads workflow definitions from `.json`, `.yaml` and `.yml` files.
pub struct WorkflowLoader;

impl WorkflowLoader {
    fn workflow_schema() -> Result<&'static JSONSchema> {
        static SCHEMA: OnceLock<std::result::Result<JSONSchema, String>> = OnceLock::new();
        let compiled = SCHEMA.get_or_init(|| {
            let raw = include_str!("../../../docs/workflow.definition.schema.json");
            let schema_value = serde_json::from_str::<Value>(raw)
                .map_err(|err| format!("invalid embedded workflow schema json: {err}"))?;
            JSONSchema::compile(&schema_value)
                .map_err(|err| format!("failed compiling embedded workflow schema: {err}"))
        });

        match compiled {
            Ok(schema) => Ok(schema),
            Err(err) => Err(Error::Config(err.clone())),
        }
    }

    fn is_definition_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|value| value.to_str()),
            Some("json" | "yaml" | "yml")
        )
    }

    /// Parses raw definition text; `source` only names the origin in errors
    /// and selects yaml parsing by its extension.
    pub fn parse_str(source: &Path, raw: &str) -> Result<NewWorkflow> {
        let is_yaml = matches!(
            source.extension().and_then(|value| value.to_str()),
            Some("yaml" | "yml")
        );

        let value = if is_yaml {
            let yaml_value = serde_yaml::from_str::<serde_yaml::Value>(raw).map_err(|err| {
                Error::Config(format!(
                    "failed parsing workflow yaml '{}': {err}",
                    source.display()
                ))
            })?;
            serde_json::to_value(yaml_value).map_err(|err| {
                Error::Config(format!(
                    "failed converting workflow yaml '{}' to json: {err}",
                    source.display()
                ))
            })?
        } else {
            serde_json::from_str::<Value>(raw).map_err(|err| {
                Error::Config(format!(
                    "failed parsing workflow json '{}': {err}",
                    source.display()
                ))
            })?
        };

        Self::validate_against_schema(source, &value)?;
        let workflow = serde_json::from_value::<NewWorkflow>(value).map_err(|err| {
            Error::Config(format!(
                "failed parsing workflow definition '{}': {err}",
                source.display()
            ))
        })?;
        validate_definition(&workflow.name, &workflow.steps)?;
        Ok(workflow)
    }

    fn validate_against_schema(source: &Path, value: &Value) -> Result<()> {
        let schema = Self::workflow_schema()?;
        if let Err(errors) = schema.validate(value) {
            let details = errors
                .map(|err| format!("{}: {}", err.instance_path, err))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::Validation(format!(
                "workflow '{}' failed schema validation: {}",
                source.display(),
                details
            )));
        }
        Ok(())
    }

    pub fn load_file(path: &Path) -> Result<NewWorkflow> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            Error::Config(format!(
                "failed reading workflow file '{}': {err}",
                path.display()
            ))
        })?;
        Self::parse_str(path, &raw)
    }

    /// Loads every definition file directly inside `dir`, in file name order.
    pub fn load_dir(dir: &Path) -> Result<Vec<NewWorkflow>> {
        let entries = std::fs::read_dir(dir).map_err(|err| {
            Error::Config(format!(
                "failed reading workflow directory '{}': {err}",
                dir.display()
            ))
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::is_definition_file(path))
            .collect();
        files.sort();

        let mut workflows = Vec::with_capacity(files.len());
        for file in files {
            let workflow = Self::load_file(&file)?;
            tracing::debug!(path = %file.display(), name = %workflow.name, "loaded workflow definition");
            workflows.push(workflow);
        }
        Ok(workflows)
    }
}

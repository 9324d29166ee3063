use std::path::Path;

use crate::config::schema::Config;
use crate::config::validation::validate_config;
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "AIDFLOW_";

pub fn load_from_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        Error::Config(format!("failed to read config '{}': {err}", path.display()))
    })?;

    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or_default();

    if ext == "json" {
        serde_json::from_str(&content).map_err(|err| {
            Error::Config(format!(
                "failed to parse config '{}': {err}",
                path.display()
            ))
        })
    } else {
        toml::from_str(&content).map_err(|err| {
            Error::Config(format!(
                "failed to parse config '{}': {err}",
                path.display()
            ))
        })
    }
}

/// Applies `AIDFLOW_*` overrides from the process environment on top of `config`.
pub fn load_from_env(config: Config) -> Result<Config> {
    merge(config, std::env::vars())
}

/// Applies `AIDFLOW_*` style key/value overrides on top of `config`.
pub fn merge<I>(mut config: Config, vars: I) -> Result<Config>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match name {
            "BULK_MAX_ENTITY_IDS" => config.bulk.max_entity_ids = parse_number(&key, &value)?,
            "BULK_WORKER_COUNT" => config.bulk.worker_count = parse_number(&key, &value)?,
            "BULK_MAX_IN_FLIGHT" => config.bulk.max_in_flight = parse_number(&key, &value)?,
            "BULK_RETENTION_DAYS" => config.bulk.retention_days = parse_number(&key, &value)?,
            "WORKFLOWS_HISTORY_LIMIT" => {
                config.workflows.history_limit = parse_number(&key, &value)?
            }
            "WORKFLOWS_WAIT_MAX_MS" => config.workflows.wait_max_ms = parse_number(&key, &value)?,
            "WORKFLOWS_DEFINITIONS_DIR" => config.workflows.definitions_dir = Some(value),
            "EVENTS_BUFFER_SIZE" => config.events.buffer_size = parse_number(&key, &value)?,
            "LOG_LEVEL" => config.logging.level = value,
            _ => tracing::debug!(key = %key, "ignoring unknown environment override"),
        }
    }

    Ok(config)
}

/// Loads the file (when given), applies environment overrides and validates the result.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => load_from_file(path)?,
        None => Config::default(),
    };
    let config = load_from_env(config)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| Error::Config(format!("invalid value '{value}' for {key}: {err}")))
}

use crate::config::schema::{Config, MAX_ENTITY_IDS_CEILING, MAX_RETENTION_DAYS};
use crate::error::{Error, Result};

pub fn validate_config(config: &Config) -> Result<()> {
    if config.bulk.max_entity_ids == 0 {
        return Err(Error::Validation(
            "bulk.max_entity_ids must be at least 1".to_owned(),
        ));
    }

    if config.bulk.max_entity_ids > MAX_ENTITY_IDS_CEILING {
        return Err(Error::Validation(format!(
            "bulk.max_entity_ids cannot exceed {MAX_ENTITY_IDS_CEILING}"
        )));
    }

    if config.bulk.worker_count == 0 {
        return Err(Error::Validation(
            "bulk.worker_count must be at least 1".to_owned(),
        ));
    }

    if config.bulk.max_in_flight < config.bulk.worker_count {
        return Err(Error::Validation(format!(
            "bulk.max_in_flight ({}) must be at least bulk.worker_count ({})",
            config.bulk.max_in_flight, config.bulk.worker_count
        )));
    }

    if config.bulk.retention_days < 0 {
        return Err(Error::Validation(
            "bulk.retention_days cannot be negative".to_owned(),
        ));
    }

    if config.bulk.retention_days > MAX_RETENTION_DAYS {
        return Err(Error::Validation(format!(
            "bulk.retention_days cannot exceed {MAX_RETENTION_DAYS}"
        )));
    }

    if config.events.buffer_size == 0 {
        return Err(Error::Validation(
            "events.buffer_size must be at least 1".to_owned(),
        ));
    }

    if config.logging.level.trim().is_empty() {
        return Err(Error::Validation("logging.level cannot be empty".to_owned()));
    }

    Ok(())
}

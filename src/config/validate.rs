// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AutobuilderError, Result};
use crate::registry::TaskRegistry;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AutobuilderError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.autobuilder, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_commands(cfg)?;
    // Dependency references and cycles are the registry's invariants.
    TaskRegistry::from_sections(&cfg.config, &cfg.task)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(AutobuilderError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_concurrent == Some(0) {
        return Err(AutobuilderError::ConfigError(
            "[config].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.autobuilder.interval_secs == 0 {
        return Err(AutobuilderError::ConfigError(
            "[autobuilder].interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_commands(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.effective_command(&cfg.config.task_command).is_empty() {
            return Err(AutobuilderError::ConfigError(format!(
                "task '{}' has an empty command",
                name
            )));
        }
    }
    Ok(())
}

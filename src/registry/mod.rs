// src/registry/mod.rs

//! The catalog of task definitions.
//!
//! Built once at startup and handed to the scheduler; read-only afterwards.

mod definition;
pub mod validate;

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

pub use definition::TaskDefinition;

use crate::config::model::{ConfigFile, ConfigSection, TaskConfig};
use crate::errors::{AutobuilderError, Result};
use crate::types::TaskName;

/// Registered task definitions, in registration order, plus a reverse
/// `after` index.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    definitions: Vec<TaskDefinition>,
    by_name: HashMap<TaskName, usize>,
    /// For each task, the tasks that list it in `after`, in registration order.
    successors: HashMap<TaskName, Vec<TaskName>>,
}

impl TaskRegistry {
    /// Build a registry from definitions in registration order.
    ///
    /// Duplicate names, unknown or self `after` references and cycles are
    /// rejected here.
    pub fn new(definitions: Vec<TaskDefinition>) -> Result<Self> {
        validate::validate_definitions(&definitions)?;

        let by_name = definitions
            .iter()
            .enumerate()
            .map(|(idx, def)| (def.name.clone(), idx))
            .collect();

        let mut successors: HashMap<TaskName, Vec<TaskName>> = HashMap::new();
        for def in definitions.iter() {
            for dep in def.after.iter() {
                let entry = successors.entry(dep.clone()).or_default();
                if !entry.contains(&def.name) {
                    entry.push(def.name.clone());
                }
            }
        }

        debug!(tasks = definitions.len(), "task registry built");

        Ok(Self {
            definitions,
            by_name,
            successors,
        })
    }

    /// Build from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::from_sections(&cfg.config, &cfg.task)
    }

    pub(crate) fn from_sections(
        global: &ConfigSection,
        tasks: &IndexMap<String, TaskConfig>,
    ) -> Result<Self> {
        let defs = tasks
            .iter()
            .map(|(name, tc)| TaskDefinition::from_config(name.clone(), tc, &global.task_command))
            .collect();
        Self::new(defs)
    }

    /// Look up a definition by name.
    pub fn definition(&self, name: &str) -> Result<&TaskDefinition> {
        self.by_name
            .get(name)
            .map(|&idx| &self.definitions[idx])
            .ok_or_else(|| AutobuilderError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Every task whose `after` contains `name`, in registration order.
    pub fn tasks_triggered_after(&self, name: &str) -> &[TaskName] {
        self.successors
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

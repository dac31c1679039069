#![allow(dead_code)]

use std::sync::Arc;

use indexmap::IndexMap;

use autobuilder::config::{AutobuilderSection, ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use autobuilder::registry::{TaskDefinition, TaskRegistry};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                autobuilder: AutobuilderSection::default(),
                task: IndexMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.config.max_concurrent = Some(n);
        self
    }

    pub fn task_command(mut self, argv: &[&str]) -> Self {
        self.config.config.task_command = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn schedule_min_secs(mut self, secs: u64) -> Self {
        self.task.schedule_min_secs = secs;
        self
    }

    pub fn preserve_stdout(mut self, val: bool) -> Self {
        self.task.preserve_stdout = val;
        self
    }

    pub fn command(mut self, argv: &[&str]) -> Self {
        self.task.command = Some(argv.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for an in-memory `TaskRegistry` whose tasks run `true`.
pub struct RegistryBuilder {
    definitions: Vec<TaskDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    pub fn task(self, name: &str) -> Self {
        self.task_after(name, &[])
    }

    pub fn task_after(mut self, name: &str, after: &[&str]) -> Self {
        let mut def = TaskDefinition::new(name, vec!["true".to_string()]);
        def.after = after.iter().map(|s| s.to_string()).collect();
        self.definitions.push(def);
        self
    }

    /// Set the cool-down of the most recently added task.
    pub fn rate_limited(mut self, secs: u64) -> Self {
        if let Some(def) = self.definitions.last_mut() {
            def.schedule_min_secs = secs;
        }
        self
    }

    pub fn definition(mut self, def: TaskDefinition) -> Self {
        self.definitions.push(def);
        self
    }

    pub fn build(self) -> Arc<TaskRegistry> {
        Arc::new(TaskRegistry::new(self.definitions).expect("Failed to build valid registry"))
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

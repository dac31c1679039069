// src/registry/validate.rs

//! Startup-time checks over the task graph.

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{AutobuilderError, Result};
use crate::registry::TaskDefinition;

pub fn validate_definitions(defs: &[TaskDefinition]) -> Result<()> {
    validate_task_names(defs)?;
    validate_unique_names(defs)?;
    validate_task_dependencies(defs)?;
    validate_dag(defs)?;
    Ok(())
}

/// Task names become path components (`tasks/<name>`, `<build>/<name>`), so
/// they must name a single entry inside the parent directory.
fn validate_task_names(defs: &[TaskDefinition]) -> Result<()> {
    for def in defs {
        let name = def.name.as_str();
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(AutobuilderError::ConfigError(format!(
                "task name {:?} is not a valid directory name",
                name
            )));
        }
    }
    Ok(())
}

fn validate_unique_names(defs: &[TaskDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for def in defs {
        if !seen.insert(def.name.as_str()) {
            return Err(AutobuilderError::ConfigError(format!(
                "task '{}' is registered more than once",
                def.name
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(defs: &[TaskDefinition]) -> Result<()> {
    let names: HashSet<&str> = defs.iter().map(|d| d.name.as_str()).collect();
    for def in defs {
        for dep in def.after.iter() {
            if dep == &def.name {
                return Err(AutobuilderError::ConfigError(format!(
                    "task '{}' cannot run after itself",
                    def.name
                )));
            }
            if !names.contains(dep.as_str()) {
                return Err(AutobuilderError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    def.name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(defs: &[TaskDefinition]) -> Result<()> {
    // Edge direction: predecessor -> task. For `after = ["resolve"]` on
    // `build` we add resolve -> build.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for def in defs {
        graph.add_node(def.name.as_str());
    }

    for def in defs {
        for dep in def.after.iter() {
            graph.add_edge(dep.as_str(), def.name.as_str(), ());
        }
    }

    // A cascade loop would re-trigger itself forever on every change.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(AutobuilderError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                node
            )))
        }
    }
}

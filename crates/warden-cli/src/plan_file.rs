//! `plan.toml` on-disk format for the `warden plan` commands.
//!
//! Mirrors the teacher's `gator_core::plan::toml_format` shape (a
//! `[plan]` table plus `[[tasks]]` entries referencing each other by
//! name rather than id) but trimmed to the fields `warden-core`'s plan
//! graph (C4) actually models: no gate/invariant/harness-preset concerns,
//! since those belong to the repository-analyzer and gate-evaluation
//! collaborators this core explicitly leaves out of scope.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use warden_core::plan::{AddTaskOptions, Priority};

#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    pub plan: PlanMeta,
    #[serde(default)]
    pub tasks: Vec<TaskFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_branch: Option<String>,
    /// Optional total dollar budget, checked by the orchestrator's
    /// budget-aware loop (SPEC_FULL.md "Budget-aware orchestration loop").
    #[serde(default)]
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub target_files: Option<Vec<String>>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub parallel_group: Option<String>,
}

fn default_priority() -> String {
    "normal".to_string()
}

pub fn load(path: &Path) -> Result<PlanFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan file at {}", path.display()))?;
    let file: PlanFile =
        toml::from_str(&contents).with_context(|| format!("failed to parse plan file at {}", path.display()))?;
    Ok(file)
}

fn parse_priority(s: &str) -> Result<Priority> {
    Ok(match s {
        "low" => Priority::Low,
        "normal" => Priority::Normal,
        "high" => Priority::High,
        "critical" => Priority::Critical,
        other => bail!("invalid priority {other:?}; expected low|normal|high|critical"),
    })
}

/// Build [`AddTaskOptions`] for each task in `file`, resolving
/// `depends_on` task-name references to the real [`warden_core::plan::TaskId`]
/// values minted by [`warden_core::plan::PlanManager::add_task`].
///
/// Tasks must be declared in dependency order (a task may only name an
/// earlier task in `depends_on`) -- the plan graph has no forward
/// reference resolution of its own, matching the teacher's plan-file
/// loader.
pub fn resolve_tasks(file: &PlanFile) -> Result<Vec<(String, AddTaskOptions)>> {
    let mut name_to_id = HashMap::new();
    let mut resolved = Vec::with_capacity(file.tasks.len());

    for task in &file.tasks {
        if name_to_id.contains_key(&task.name) {
            bail!("duplicate task name {:?} in plan file", task.name);
        }
        let id = uuid::Uuid::new_v4();
        name_to_id.insert(task.name.clone(), id);
    }

    for task in &file.tasks {
        let mut dependencies = std::collections::HashSet::new();
        for dep_name in &task.depends_on {
            let dep_id = name_to_id.get(dep_name).with_context(|| {
                format!(
                    "task {:?} depends_on unknown task {:?} (declare it earlier in the file)",
                    task.name, dep_name
                )
            })?;
            dependencies.insert(*dep_id);
        }

        let opts = AddTaskOptions {
            name: Some(task.name.clone()),
            agent: task.agent.clone(),
            dependencies,
            target_files: task
                .target_files
                .clone()
                .map(|files| files.into_iter().collect()),
            priority: parse_priority(&task.priority)?,
            parallel_group: task.parallel_group.clone(),
        };
        resolved.push((task.name.clone(), opts));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_plan() {
        let toml_str = r#"
[plan]
name = "Demo plan"

[[tasks]]
name = "one"
description = "do a thing"

[[tasks]]
name = "two"
description = "do another thing"
depends_on = ["one"]
priority = "high"
"#;
        let file: PlanFile = toml::from_str(toml_str).expect("should parse");
        assert_eq!(file.plan.name, "Demo plan");
        assert_eq!(file.tasks.len(), 2);

        let resolved = resolve_tasks(&file).expect("should resolve");
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].1.priority, Priority::High);
        assert_eq!(resolved[1].1.dependencies.len(), 1);
    }

    #[test]
    fn resolves_dependency_declared_later_in_the_file() {
        // Every task's id is pre-minted before dependency lookups run, so
        // a dependency on a task declared later in the file still
        // resolves -- only an unknown name is rejected.
        let toml_str = r#"
[plan]
name = "Demo plan"

[[tasks]]
name = "one"
description = "do a thing"
depends_on = ["two"]

[[tasks]]
name = "two"
description = "do another thing"
"#;
        let file: PlanFile = toml::from_str(toml_str).expect("should parse");
        assert!(resolve_tasks(&file).is_ok());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let toml_str = r#"
[plan]
name = "Demo plan"

[[tasks]]
name = "one"
description = "do a thing"
depends_on = ["ghost"]
"#;
        let file: PlanFile = toml::from_str(toml_str).expect("should parse");
        assert!(resolve_tasks(&file).is_err());
    }
}

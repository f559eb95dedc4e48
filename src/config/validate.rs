// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::model::{PipelineFile, RawPipelineFile, TaskConfig};
use crate::engine::MAX_ROLLBACK_RETRIES_LIMIT;
use crate::errors::{Result, TaskchainError};

/// Task and group ids: no whitespace, no `:` (reserved for namespacing).
static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s:]+$").expect("static regex"));

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = TaskchainError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(PipelineFile::new_unchecked(raw))
    }
}

pub fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_options(cfg)?;
    validate_tasks(cfg)?;
    validate_groups(cfg)?;
    Ok(())
}

fn config_error(msg: String) -> TaskchainError {
    TaskchainError::ConfigError(msg)
}

fn ensure_has_tasks(cfg: &RawPipelineFile) -> Result<()> {
    let grouped = cfg.group.iter().any(|g| !g.task.is_empty());
    if cfg.task.is_empty() && !grouped {
        return Err(config_error(
            "pipeline must contain at least one [task.<id>] or [[group.task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_options(cfg: &RawPipelineFile) -> Result<()> {
    let opts = &cfg.options;
    if opts.max_rollback_retries > MAX_ROLLBACK_RETRIES_LIMIT {
        return Err(config_error(format!(
            "[options].max_rollback_retries must be <= {MAX_ROLLBACK_RETRIES_LIMIT} (got {})",
            opts.max_rollback_retries
        )));
    }
    if opts.enabled_features.iter().any(|f| f.trim().is_empty()) {
        return Err(config_error(
            "[options].enabled_features must not contain empty names".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(cfg: &RawPipelineFile) -> Result<()> {
    for (id, task) in &cfg.task {
        validate_id("task", id)?;
        validate_task_spec(id, task)?;
    }
    Ok(())
}

fn validate_groups(cfg: &RawPipelineFile) -> Result<()> {
    let mut group_ids = HashSet::new();
    for group in &cfg.group {
        validate_id("group", &group.id)?;
        if !group_ids.insert(group.id.as_str()) {
            return Err(config_error(format!("duplicate group id '{}'", group.id)));
        }
        if let Some(var) = &group.skip_if_env {
            validate_env_var(&group.id, var)?;
        }

        let mut task_ids = HashSet::new();
        for entry in &group.task {
            validate_id("task", &entry.id)?;
            if !task_ids.insert(entry.id.as_str()) {
                return Err(config_error(format!(
                    "duplicate task id '{}' in group '{}'",
                    entry.id, group.id
                )));
            }
            validate_task_spec(&format!("{}:{}", group.id, entry.id), &entry.spec)?;
        }
    }
    Ok(())
}

fn validate_id(kind: &str, id: &str) -> Result<()> {
    if !ID_RE.is_match(id) {
        return Err(config_error(format!(
            "invalid {kind} id '{id}': ids must be non-empty and contain no whitespace or ':'"
        )));
    }
    Ok(())
}

fn validate_task_spec(id: &str, task: &TaskConfig) -> Result<()> {
    if task.cmd.trim().is_empty() {
        return Err(config_error(format!("task '{id}' has an empty `cmd`")));
    }
    for (field, cmd) in [("undo", &task.undo), ("compensate", &task.compensate)] {
        if cmd.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(config_error(format!("task '{id}' has an empty `{field}`")));
        }
    }
    if task.features.iter().any(|f| f.trim().is_empty()) {
        return Err(config_error(format!(
            "task '{id}' lists an empty feature name"
        )));
    }
    if let Some(var) = &task.skip_if_env {
        validate_env_var(id, var)?;
    }
    Ok(())
}

fn validate_env_var(owner: &str, var: &str) -> Result<()> {
    if !ENV_VAR_RE.is_match(var) {
        return Err(config_error(format!(
            "'{owner}' has invalid `skip_if_env` variable name '{var}'"
        )));
    }
    Ok(())
}

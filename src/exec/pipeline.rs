// src/exec/pipeline.rs

//! Turn a validated [`PipelineFile`] into engine tasks, groups and
//! compensations.

use crate::config::{GroupConfig, PipelineFile, TaskConfig};
use crate::engine::{Orchestrator, OrchestratorOptions};
use crate::exec::command::{run_command, stdout_key};
use crate::task::group::namespaced;
use crate::task::{SkipDecision, Task, TaskGroup};

fn env_is_set(var: &str) -> bool {
    std::env::var_os(var).is_some_and(|v| !v.is_empty())
}

/// Build the engine task for one `[task.<id>]` entry.
///
/// The forward body forks the command's trimmed stdout into
/// `"<id>.stdout"`.
pub fn shell_task(id: &str, spec: &TaskConfig) -> Task {
    build_shell_task(id, id, spec)
}

/// `id` is the id the task is created with (bare inside a group, the
/// expander namespaces it); `output_id` is the id used for logging and the
/// stdout key.
fn build_shell_task(id: &str, output_id: &str, spec: &TaskConfig) -> Task {
    let task_id = output_id.to_string();
    let cmd = spec.cmd.clone();

    let mut task = Task::new(id, move |ctx| {
        let task_id = task_id.clone();
        let cmd = cmd.clone();
        async move {
            let stdout = run_command(&task_id, &cmd, &ctx).await?;
            if ctx.is_dry_run() {
                return Ok(ctx);
            }
            Ok(ctx.fork(stdout_key(&task_id), stdout))
        }
    })
    .with_dependencies(spec.after.iter().cloned())
    .record_when_skipped(spec.record_when_skipped);

    for feature in &spec.features {
        task = task.requires_feature(feature.clone());
    }
    if let Some(description) = &spec.description {
        task = task.with_description(description.clone());
    }
    if let Some(undo) = &spec.undo {
        let task_id = output_id.to_string();
        let undo = undo.clone();
        task = task.with_undo(move |ctx| {
            let task_id = task_id.clone();
            let undo = undo.clone();
            async move {
                run_command(&task_id, &undo, &ctx).await?;
                Ok(())
            }
        });
    }
    if let Some(var) = &spec.skip_if_env {
        let var = var.clone();
        task = task.with_should_skip(move |_| {
            if env_is_set(&var) {
                SkipDecision::skip(format!("${var} is set"))
            } else {
                SkipDecision::proceed()
            }
        });
    }
    task
}

/// Compensation task running `cmd` on behalf of `task_id`.
pub fn compensation_task(task_id: &str, cmd: &str) -> Task {
    let owner = task_id.to_string();
    let cmd = cmd.to_string();
    Task::new(format!("compensate-{task_id}"), move |ctx| {
        let owner = owner.clone();
        let cmd = cmd.clone();
        async move {
            run_command(&owner, &cmd, &ctx).await?;
            Ok(ctx)
        }
    })
}

fn shell_group(cfg: &GroupConfig) -> TaskGroup {
    let mut group = TaskGroup::new(cfg.id.clone());
    for dep in &cfg.depends_on_groups {
        group = group.depends_on_group(dep.clone());
    }

    let always = cfg.skip_when;
    let env_var = cfg.skip_if_env.clone();
    if always || env_var.is_some() {
        group = group
            .skip_condition(move |_| always || env_var.as_deref().is_some_and(env_is_set));
    }
    if let Some(reason) = &cfg.skip_reason {
        group = group.skip_reason(reason.clone());
    }

    for entry in &cfg.task {
        let output_id = namespaced(&cfg.id, &entry.id);
        group = group.task(build_shell_task(&entry.id, &output_id, &entry.spec));
    }
    group
}

/// Orchestrator running every task and group of `pipeline` with `options`.
pub fn build_orchestrator(pipeline: &PipelineFile, options: OrchestratorOptions) -> Orchestrator {
    let mut orch = Orchestrator::new(options).with_config(pipeline.config.clone());

    for (id, spec) in &pipeline.task {
        orch.add_task(shell_task(id, spec));
        if let Some(cmd) = &spec.compensate {
            orch.register_compensation(id.clone(), compensation_task(id, cmd));
        }
    }

    for group in &pipeline.group {
        orch.add_group(shell_group(group));
        for entry in &group.task {
            if let Some(cmd) = &entry.spec.compensate {
                let id = namespaced(&group.id, &entry.id);
                let compensation = compensation_task(&id, cmd);
                orch.register_compensation(id, compensation);
            }
        }
    }

    orch
}

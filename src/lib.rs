// src/lib.rs

//! Dependency-ordered task orchestration with rollback.
//!
//! The engine ([`engine::Orchestrator`]) runs [`task::Task`]s one at a time
//! in dependency order, threading an immutable [`context::WorkflowContext`]
//! from task to task, and undoes completed work when a later task fails.
//! [`config`] and [`exec`] add a TOML pipeline format with shell-command
//! tasks; [`run`] is the entry point used by the `taskchain` binary.

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;
pub mod types;

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::{PipelineFile, load_and_validate};
use crate::engine::{ExecutionPlan, OrchestratorOptions, RunOutput};
use crate::exec::build_orchestrator;

pub use crate::context::WorkflowContext;
pub use crate::engine::Orchestrator;
pub use crate::errors::TaskchainError;
pub use crate::task::{SkipDecision, Task, TaskGroup};
pub use crate::types::RollbackStrategy;

/// High-level entry point used by `main.rs`.
///
/// Loads the pipeline file, applies CLI overrides and either prints the plan
/// or runs it. Returns whether the run succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let pipeline = load_and_validate(&args.config)
        .with_context(|| format!("loading pipeline file '{}'", args.config))?;
    let options = options_from(&pipeline, &args);

    let mut orchestrator = build_orchestrator(&pipeline, options);

    if args.plan {
        let plan = orchestrator.plan()?;
        print_plan(&plan);
        return Ok(true);
    }

    let output = orchestrator.run().await?;
    print_summary(&output);
    Ok(output.success)
}

/// Merge `[options]` with CLI flags. Boolean flags can only switch a setting
/// on, except `--no-rollback`.
pub fn options_from(pipeline: &PipelineFile, args: &CliArgs) -> OrchestratorOptions {
    let mut options = OrchestratorOptions::from(&pipeline.options);
    options.dry_run |= args.dry_run;
    options.continue_on_error |= args.continue_on_error;
    if args.no_rollback {
        options.enable_rollback = false;
    }
    if let Some(strategy) = args.strategy {
        options.rollback_strategy = strategy;
    }
    options
        .enabled_features
        .extend(args.features.iter().cloned());
    options
}

fn print_plan(plan: &ExecutionPlan) {
    println!("taskchain plan ({} tasks):", plan.tasks.len());
    for (idx, task) in plan.tasks.iter().enumerate() {
        println!("  {:>2}. {}", idx + 1, task.id());
        if let Some(description) = task.description() {
            println!("      {description}");
        }
        if !task.dependencies().is_empty() {
            println!("      after: {:?}", task.dependencies());
        }
        if task.has_undo() {
            println!("      undo: yes");
        }
    }
    if !plan.disabled_task_ids.is_empty() {
        println!();
        println!("disabled ({}):", plan.disabled_task_ids.len());
        for id in &plan.disabled_task_ids {
            println!("  - {id}");
        }
    }
    debug!("plan printed (no execution)");
}

fn print_summary(output: &RunOutput) {
    let status = if output.success { "succeeded" } else { "failed" };
    println!(
        "taskchain run {} {status} in {} ms",
        output.execution_id, output.duration_ms
    );
    println!("  executed: {}", output.executed_task_ids.join(", "));
    for skipped in &output.skipped_tasks {
        match &skipped.reason {
            Some(reason) => println!("  skipped: {} ({reason})", skipped.task_id),
            None => println!("  skipped: {}", skipped.task_id),
        }
    }
    if !output.disabled_task_ids.is_empty() {
        println!("  disabled: {}", output.disabled_task_ids.join(", "));
    }
    if !output.success {
        println!("  failed: {}", output.failed_tasks.join(", "));
        println!("  rolled back: {}", output.rolled_back_tasks.join(", "));
        for err in &output.errors {
            println!("  error: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_str;
    use clap::Parser;

    #[test]
    fn cli_flags_override_file_options() {
        let pipeline = PipelineFile::try_from(
            parse_str(
                r#"
[options]
rollback_strategy = "custom"
enabled_features = ["changelog"]

[task.a]
cmd = "true"
"#,
            )
            .unwrap(),
        )
        .unwrap();
        let args = CliArgs::try_parse_from([
            "taskchain",
            "--feature",
            "npm",
            "--strategy",
            "none",
            "--no-rollback",
            "--dry-run",
        ])
        .unwrap();

        let opts = options_from(&pipeline, &args);
        assert_eq!(opts.rollback_strategy, RollbackStrategy::None);
        assert!(!opts.enable_rollback);
        assert!(opts.dry_run);
        assert!(opts.enabled_features.contains("changelog"));
        assert!(opts.enabled_features.contains("npm"));
    }
}

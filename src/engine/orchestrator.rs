// src/engine/orchestrator.rs

//! Top-level run driver.
//!
//! A run goes `Created -> Resolving -> Filtering -> Executing`, then either
//! `Completed` or `RollingBack`, and always ends in `Done`:
//!
//! 1. options are validated and groups are expanded into namespaced tasks;
//! 2. every task is registered and resolved into dependency order;
//! 3. tasks whose required features are not all enabled are dropped;
//! 4. the remaining tasks run one at a time, each receiving the context the
//!    previous one produced;
//! 5. on the first failure the rollback manager undoes what already ran.
//!
//! Validation problems surface as `Err` before any task runs. Task failures
//! never do: they are reported in the returned [`RunOutput`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{ContextMap, WorkflowContext};
use crate::dag::TaskRegistry;
use crate::engine::executor::TaskExecutor;
use crate::engine::rollback::{RollbackEntry, RollbackManager, RollbackResult};
use crate::engine::{OrchestratorOptions, OrchestratorState, RunOutput, SkippedTask};
use crate::errors::{Result, TaskchainError};
use crate::task::{Task, TaskGroup, expand_groups};

#[derive(Debug)]
enum PlanItem {
    Task(Task),
    Group(TaskGroup),
}

/// Resolved, feature-filtered execution order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub tasks: Vec<Arc<Task>>,
    pub disabled_task_ids: Vec<String>,
}

impl ExecutionPlan {
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id())
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    options: OrchestratorOptions,
    items: Vec<PlanItem>,
    compensations: BTreeMap<String, Arc<Task>>,
    config: ContextMap,
    initial_data: ContextMap,
    state: OrchestratorState,
    history: Vec<OrchestratorState>,
    rollback: RollbackManager,
}

/// Forward-phase bookkeeping for one run.
struct Progress {
    context: WorkflowContext,
    executed: Vec<String>,
    skipped: Vec<SkippedTask>,
    failure: Option<(String, TaskchainError)>,
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions) -> Self {
        let rollback = new_rollback_manager(&options);
        Self {
            options,
            items: Vec::new(),
            compensations: BTreeMap::new(),
            config: ContextMap::new(),
            initial_data: ContextMap::new(),
            state: OrchestratorState::Created,
            history: vec![OrchestratorState::Created],
            rollback,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn add_task(&mut self, task: Task) -> &mut Self {
        self.items.push(PlanItem::Task(task));
        self
    }

    pub fn add_group(&mut self, group: TaskGroup) -> &mut Self {
        self.items.push(PlanItem::Group(group));
        self
    }

    /// Use `compensation` instead of `task_id`'s undo under the
    /// compensation strategy. Grouped tasks are addressed by their
    /// namespaced id (`group:task`).
    pub fn register_compensation(
        &mut self,
        task_id: impl Into<String>,
        compensation: impl Into<Arc<Task>>,
    ) -> &mut Self {
        self.compensations
            .insert(task_id.into(), compensation.into());
        self
    }

    /// Read-only config visible to every task.
    pub fn with_config(mut self, config: ContextMap) -> Self {
        self.config = config;
        self
    }

    /// Data the root context starts with.
    pub fn with_initial_data(mut self, data: ContextMap) -> Self {
        self.initial_data = data;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// States visited by the most recent run, starting at `Created`.
    pub fn history(&self) -> &[OrchestratorState] {
        &self.history
    }

    /// Entries currently on the rollback stack. Empty after a successful run.
    pub fn rollback_entries(&self) -> &[RollbackEntry] {
        self.rollback.entries()
    }

    /// Resolve and filter without running anything.
    pub fn plan(&self) -> Result<ExecutionPlan> {
        self.options.validate()?;
        let registry = self.build_registry()?;
        let resolved = registry.resolve_all()?;
        Ok(self.filter_by_features(resolved))
    }

    /// Run every task in dependency order, rolling back on failure.
    ///
    /// Each call is a fresh run: the rollback stack, the registry and the
    /// state machine are rebuilt from the added tasks and groups.
    pub async fn run(&mut self) -> Result<RunOutput> {
        let started = Instant::now();
        self.state = OrchestratorState::Created;
        self.history = vec![OrchestratorState::Created];

        self.options.validate()?;
        self.rollback = new_rollback_manager(&self.options);

        let execution_id = self
            .options
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.transition(OrchestratorState::Resolving);
        let registry = self.build_registry()?;
        for (task_id, compensation) in &self.compensations {
            self.rollback
                .register_compensation(task_id.clone(), Arc::clone(compensation));
        }
        let resolved = registry.resolve_all()?;

        self.transition(OrchestratorState::Filtering);
        let plan = self.filter_by_features(resolved);

        info!(
            execution_id = %execution_id,
            tasks = plan.tasks.len(),
            disabled = plan.disabled_task_ids.len(),
            dry_run = self.options.dry_run,
            "starting run"
        );

        self.transition(OrchestratorState::Executing);
        let root = WorkflowContext::new(execution_id.clone(), self.config.clone())
            .with_data(self.initial_data.clone())
            .with_dry_run(self.options.dry_run);
        let progress = self.execute_plan(&plan, root).await;

        let mut failed_tasks = Vec::new();
        let mut errors = Vec::new();
        let mut rolled_back_tasks = Vec::new();

        let success = match progress.failure {
            None => {
                self.transition(OrchestratorState::Completed);
                self.rollback.reset();
                true
            }
            Some((task_id, err)) => {
                warn!(task = %task_id, error = %err, "task failed");
                failed_tasks.push(task_id);
                errors.push(err);

                let rollback = if self.options.enable_rollback {
                    self.transition(OrchestratorState::RollingBack);
                    self.rollback.rollback().await
                } else {
                    debug!("rollback disabled; leaving executed tasks in place");
                    RollbackResult::default()
                };
                rolled_back_tasks = rollback.rolled_back_tasks;
                failed_tasks.extend(rollback.failed_tasks);
                errors.extend(rollback.errors);
                false
            }
        };

        self.transition(OrchestratorState::Done);

        let output = RunOutput {
            execution_id,
            success,
            executed_task_ids: progress.executed,
            skipped_tasks: progress.skipped,
            disabled_task_ids: plan.disabled_task_ids,
            rolled_back_tasks,
            failed_tasks,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
            context: progress.context,
        };

        info!(
            execution_id = %output.execution_id,
            success = output.success,
            executed = output.executed_task_ids.len(),
            skipped = output.skipped_tasks.len(),
            rolled_back = output.rolled_back_tasks.len(),
            duration_ms = output.duration_ms,
            "run finished"
        );
        Ok(output)
    }

    async fn execute_plan(&mut self, plan: &ExecutionPlan, root: WorkflowContext) -> Progress {
        let executor = TaskExecutor::new(self.options.max_rollback_retries);
        let mut progress = Progress {
            context: root,
            executed: Vec::new(),
            skipped: Vec::new(),
            failure: None,
        };

        let mut idx = 0;
        while idx < plan.tasks.len() {
            let task = &plan.tasks[idx];
            let decision = task.skip_decision(&progress.context);

            if decision.skip {
                if task.records_when_skipped() {
                    self.rollback
                        .record(Arc::clone(task), progress.context.clone());
                }

                if !decision.is_skip_through() {
                    debug!(task = %task.id(), reason = ?decision.reason, "skipping task");
                    progress.skipped.push(SkippedTask {
                        task_id: task.id().to_string(),
                        reason: decision.reason,
                    });
                    idx += 1;
                    continue;
                }

                let Some(target) = find_target(plan, idx + 1, &decision.skip_to_tasks) else {
                    warn!(
                        task = %task.id(),
                        targets = ?decision.skip_to_tasks,
                        "no skip-through target ahead in the plan"
                    );
                    progress.failure = Some((
                        task.id().to_string(),
                        TaskchainError::TaskNotFound(decision.skip_to_tasks.join(", ")),
                    ));
                    break;
                };

                let target_id = plan.tasks[target].id();
                let through = format!("skipped through to '{target_id}'");
                debug!(task = %task.id(), target = %target_id, "skipping through");

                progress.skipped.push(SkippedTask {
                    task_id: task.id().to_string(),
                    reason: Some(decision.reason.unwrap_or_else(|| through.clone())),
                });
                for passed in &plan.tasks[idx + 1..target] {
                    progress.skipped.push(SkippedTask {
                        task_id: passed.id().to_string(),
                        reason: Some(through.clone()),
                    });
                }
                idx = target;
                continue;
            }

            match executor.execute(task, progress.context.clone()).await {
                Ok(next) => {
                    progress.executed.push(task.id().to_string());
                    self.rollback.record(Arc::clone(task), next.clone());
                    progress.context = next;
                }
                Err(err) => {
                    progress.failure = Some((task.id().to_string(), err));
                    break;
                }
            }
            idx += 1;
        }

        progress
    }

    fn build_registry(&self) -> Result<TaskRegistry> {
        let groups: Vec<TaskGroup> = self
            .items
            .iter()
            .filter_map(|item| match item {
                PlanItem::Group(group) => Some(group.clone()),
                PlanItem::Task(_) => None,
            })
            .collect();
        let mut expanded = expand_groups(&groups)?.into_iter();

        let mut registry = TaskRegistry::new();
        for item in &self.items {
            match item {
                PlanItem::Task(task) => registry.register(task.clone())?,
                PlanItem::Group(_) => {
                    if let Some(group) = expanded.next() {
                        for task in group.tasks {
                            registry.register(task)?;
                        }
                    }
                }
            }
        }

        // Compensations must target a task the run can actually push.
        if let Some(task_id) = self.compensations.keys().find(|id| !registry.contains(id)) {
            return Err(TaskchainError::Validation(format!(
                "compensation registered for unknown task '{task_id}'"
            )));
        }
        Ok(registry)
    }

    fn filter_by_features(&self, resolved: Vec<Arc<Task>>) -> ExecutionPlan {
        let enabled = &self.options.enabled_features;
        let (tasks, disabled): (Vec<_>, Vec<_>) = resolved
            .into_iter()
            .partition(|task| task.required_features().iter().all(|f| enabled.contains(f)));

        let disabled_task_ids = disabled
            .iter()
            .map(|task| {
                info!(
                    task = %task.id(),
                    features = ?task.required_features(),
                    "task disabled by features"
                );
                task.id().to_string()
            })
            .collect();

        ExecutionPlan {
            tasks,
            disabled_task_ids,
        }
    }

    fn transition(&mut self, next: OrchestratorState) {
        debug!(from = %self.state, to = %next, "orchestrator state");
        self.state = next;
        self.history.push(next);
    }
}

fn new_rollback_manager(options: &OrchestratorOptions) -> RollbackManager {
    RollbackManager::new(
        options.rollback_strategy,
        options.continue_on_error,
        TaskExecutor::new(options.max_rollback_retries),
    )
}

/// Earliest index at or after `from` whose task id is one of `targets`.
fn find_target(plan: &ExecutionPlan, from: usize, targets: &[String]) -> Option<usize> {
    plan.tasks
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, task)| targets.iter().any(|t| t == task.id()))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SkipDecision;
    use crate::types::RollbackStrategy;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorOptions::default().with_execution_id("test-run"))
    }

    #[tokio::test]
    async fn happy_path_threads_context_and_clears_stack() {
        let mut orch = orchestrator();
        orch.add_task(Task::new("init", |ctx| async move { Ok(ctx.fork("n", 1)) }))
            .add_task(
                Task::new("bump", |ctx| async move {
                    let n: i64 = ctx.get_as("n")?;
                    Ok(ctx.fork("n", n + 1))
                })
                .depends_on("init"),
            );

        let out = orch.run().await.unwrap();

        assert!(out.success);
        assert_eq!(out.execution_id, "test-run");
        assert_eq!(out.executed_task_ids, vec!["init", "bump"]);
        assert_eq!(out.context.get_as::<i64>("n").unwrap(), 2);
        assert!(orch.rollback_entries().is_empty());
        assert_eq!(
            orch.history(),
            [
                OrchestratorState::Created,
                OrchestratorState::Resolving,
                OrchestratorState::Filtering,
                OrchestratorState::Executing,
                OrchestratorState::Completed,
                OrchestratorState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn validation_errors_abort_before_execution() {
        let mut orch = orchestrator();
        orch.add_task(Task::noop("a").depends_on("missing"));

        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, TaskchainError::UnknownDependency { .. }));
        assert_eq!(orch.state(), OrchestratorState::Resolving);
    }

    #[tokio::test]
    async fn generated_execution_id_is_a_uuid() {
        let mut orch = Orchestrator::new(OrchestratorOptions::default());
        orch.add_task(Task::noop("a"));

        let out = orch.run().await.unwrap();
        assert!(Uuid::parse_str(&out.execution_id).is_ok());
    }

    #[tokio::test]
    async fn feature_filtering_drops_tasks() {
        let mut orch =
            Orchestrator::new(OrchestratorOptions::default().enable_feature("changelog"));
        orch.add_task(Task::noop("changelog").requires_feature("changelog"))
            .add_task(Task::noop("publish").requires_feature("npm"));

        let plan = orch.plan().unwrap();
        assert_eq!(plan.task_ids().collect::<Vec<_>>(), vec!["changelog"]);
        assert_eq!(plan.disabled_task_ids, vec!["publish"]);

        let out = orch.run().await.unwrap();
        assert_eq!(out.executed_task_ids, vec!["changelog"]);
        assert_eq!(out.disabled_task_ids, vec!["publish"]);
    }

    #[tokio::test]
    async fn skip_through_to_missing_target_fails_and_rolls_back() {
        let mut orch = orchestrator();
        orch.add_task(Task::noop("init"))
            .add_task(
                Task::noop("gate")
                    .depends_on("init")
                    .with_should_skip(|_| SkipDecision::proceed().resume_at(["nowhere"])),
            );

        let out = orch.run().await.unwrap();
        assert!(!out.success);
        assert_eq!(out.failed_tasks, vec!["gate"]);
        assert_eq!(
            out.errors[0],
            TaskchainError::TaskNotFound("nowhere".into())
        );
        assert_eq!(out.rolled_back_tasks, vec!["init"]);
    }

    #[tokio::test]
    async fn disabled_rollback_leaves_stack_untouched() {
        let mut orch = Orchestrator::new(
            OrchestratorOptions::default()
                .with_execution_id("x")
                .enable_rollback(false),
        );
        orch.add_task(Task::noop("a"))
            .add_task(Task::new("b", |_| async { anyhow::bail!("boom") }));

        let out = orch.run().await.unwrap();
        assert!(!out.success);
        assert!(out.rolled_back_tasks.is_empty());
        assert!(!orch.history().contains(&OrchestratorState::RollingBack));
        assert_eq!(orch.rollback_entries().len(), 1);
    }

    #[tokio::test]
    async fn compensation_for_unknown_task_is_rejected() {
        let mut orch = Orchestrator::new(
            OrchestratorOptions::default().with_strategy(RollbackStrategy::Compensation),
        );
        orch.add_task(Task::noop("a"))
            .register_compensation("ghost", Task::noop("undo-ghost"));

        assert!(matches!(
            orch.run().await,
            Err(TaskchainError::Validation(_))
        ));
    }

    #[test]
    fn plan_rejects_compensation_for_unknown_task() {
        let mut orch = orchestrator();
        orch.add_task(Task::noop("a"))
            .register_compensation("ghost", Task::noop("undo-ghost"));

        match orch.plan() {
            Err(TaskchainError::Validation(msg)) => assert!(msg.contains("'ghost'"), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn plan_accepts_compensation_for_grouped_task() {
        let mut orch = orchestrator();
        orch.add_group(TaskGroup::new("release").task(Task::noop("tag")))
            .register_compensation("release:tag", Task::noop("untag"));

        let plan = orch.plan().unwrap();
        assert_eq!(plan.task_ids().collect::<Vec<_>>(), vec!["release:tag"]);
    }

    #[tokio::test]
    async fn dry_run_flag_reaches_tasks() {
        let mut orch = Orchestrator::new(OrchestratorOptions::default().dry_run(true));
        orch.add_task(Task::new("check-mode", |ctx| async move {
            let dry = ctx.is_dry_run();
            Ok(ctx.fork("dry", dry))
        }));

        let out = orch.run().await.unwrap();
        assert!(out.context.get_as::<bool>("dry").unwrap());
    }
}

// src/task/definition.rs

//! The task contract: identity, dependencies, forward/inverse bodies and
//! lifecycle hooks.
//!
//! Bodies and hooks are stored as `Arc`'d closures returning boxed futures,
//! so a [`Task`] is cheap to clone, `Send + Sync`, and can be rewritten (new
//! id, new dependencies, wrapped skip predicate) by the group expander
//! without touching the closures themselves.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::WorkflowContext;
use crate::errors::TaskchainError;
use crate::task::skip::SkipDecision;
use crate::types::RollbackErrorAction;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Forward body: consumes a context and produces the next one.
pub type ExecuteFn =
    Arc<dyn Fn(WorkflowContext) -> BoxFuture<'static, anyhow::Result<WorkflowContext>> + Send + Sync>;

/// Body or hook that only reports success/failure (validate, undo, before/after hooks).
pub type StepFn = Arc<dyn Fn(WorkflowContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// `on_execute_error` hook.
pub type ErrorHookFn = Arc<
    dyn Fn(WorkflowContext, TaskchainError) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

/// `on_rollback_error` hook; decides what happens to the failed undo.
pub type RollbackErrorHookFn = Arc<
    dyn Fn(WorkflowContext, TaskchainError) -> BoxFuture<'static, anyhow::Result<RollbackErrorAction>>
        + Send
        + Sync,
>;

/// Evaluated right before the task would run.
pub type SkipFn = Arc<dyn Fn(&WorkflowContext) -> SkipDecision + Send + Sync>;

fn step_fn<F, Fut>(f: F) -> StepFn
where
    F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: WorkflowContext| -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(f(ctx))
    })
}

/// Optional lifecycle hooks around `execute` and `undo`.
#[derive(Clone, Default)]
pub struct TaskHooks {
    pub(crate) before_execute: Option<StepFn>,
    pub(crate) after_execute: Option<StepFn>,
    pub(crate) on_execute_error: Option<ErrorHookFn>,
    pub(crate) before_rollback: Option<StepFn>,
    pub(crate) after_rollback: Option<StepFn>,
    pub(crate) on_rollback_error: Option<RollbackErrorHookFn>,
}

/// A single step of a workflow.
///
/// Built with [`Task::new`] and the `with_*` / `depends_on` combinators:
///
/// ```
/// use taskchain::task::Task;
///
/// let bump = Task::new("bump", |ctx| async move { Ok(ctx.fork("version", "1.2.0")) })
///     .with_description("Bump the package version")
///     .depends_on("init")
///     .with_undo(|_ctx| async move { Ok(()) });
///
/// assert_eq!(bump.dependencies(), ["init".to_string()]);
/// assert!(bump.has_undo());
/// ```
#[derive(Clone)]
pub struct Task {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) required_features: Vec<String>,
    pub(crate) record_when_skipped: bool,
    pub(crate) execute: ExecuteFn,
    pub(crate) validate: Option<StepFn>,
    pub(crate) undo: Option<StepFn>,
    pub(crate) should_skip: Option<SkipFn>,
    pub(crate) hooks: TaskHooks,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("required_features", &self.required_features)
            .field("has_undo", &self.undo.is_some())
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Create a task with the given id and forward body. The name defaults to the id.
    pub fn new<F, Fut>(id: impl Into<String>, execute: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<WorkflowContext>> + Send + 'static,
    {
        let id = id.into();
        let execute: ExecuteFn = Arc::new(
            move |ctx: WorkflowContext| -> BoxFuture<'static, anyhow::Result<WorkflowContext>> {
                Box::pin(execute(ctx))
            },
        );

        Self {
            name: id.clone(),
            id,
            description: None,
            dependencies: Vec::new(),
            required_features: Vec::new(),
            record_when_skipped: false,
            execute,
            validate: None,
            undo: None,
            should_skip: None,
            hooks: TaskHooks::default(),
        }
    }

    /// A task whose forward body passes the context through unchanged.
    pub fn noop(id: impl Into<String>) -> Self {
        Self::new(id, |ctx| async move { Ok(ctx) })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn required_features(&self) -> &[String] {
        &self.required_features
    }

    pub fn has_undo(&self) -> bool {
        self.undo.is_some()
    }

    pub fn records_when_skipped(&self) -> bool {
        self.record_when_skipped
    }

    /// Evaluate the skip predicate, if any.
    pub fn skip_decision(&self, ctx: &WorkflowContext) -> SkipDecision {
        match &self.should_skip {
            Some(pred) => pred(ctx),
            None => SkipDecision::proceed(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn requires_feature(mut self, feature: impl Into<String>) -> Self {
        self.required_features.push(feature.into());
        self
    }

    /// Keep this task on the rollback stack even when it is skipped.
    ///
    /// Used for preflight-style steps whose undo must run regardless.
    pub fn record_when_skipped(mut self, record: bool) -> Self {
        self.record_when_skipped = record;
        self
    }

    pub fn with_validate<F, Fut>(mut self, validate: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.validate = Some(step_fn(validate));
        self
    }

    pub fn with_undo<F, Fut>(mut self, undo: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.undo = Some(step_fn(undo));
        self
    }

    pub fn with_should_skip<F>(mut self, should_skip: F) -> Self
    where
        F: Fn(&WorkflowContext) -> SkipDecision + Send + Sync + 'static,
    {
        self.should_skip = Some(Arc::new(should_skip));
        self
    }

    pub fn with_before_execute<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.before_execute = Some(step_fn(hook));
        self
    }

    pub fn with_after_execute<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.after_execute = Some(step_fn(hook));
        self
    }

    pub fn with_on_execute_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(WorkflowContext, TaskchainError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.on_execute_error = Some(Arc::new(
            move |ctx: WorkflowContext,
                  err: TaskchainError|
                  -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(hook(ctx, err)) },
        ));
        self
    }

    pub fn with_before_rollback<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.before_rollback = Some(step_fn(hook));
        self
    }

    pub fn with_after_rollback<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.after_rollback = Some(step_fn(hook));
        self
    }

    pub fn with_on_rollback_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(WorkflowContext, TaskchainError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<RollbackErrorAction>> + Send + 'static,
    {
        self.hooks.on_rollback_error = Some(Arc::new(
            move |ctx: WorkflowContext,
                  err: TaskchainError|
                  -> BoxFuture<'static, anyhow::Result<RollbackErrorAction>> {
                Box::pin(hook(ctx, err))
            },
        ));
        self
    }
}

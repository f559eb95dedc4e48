// src/task/skip.rs

/// Outcome of a task's `should_skip` predicate.
///
/// - `skip == false`: run the task.
/// - `skip == true` with empty `skip_to_tasks`: skip only this task.
/// - `skip == true` with `skip_to_tasks`: skip this task and every task up to
///   the first of the named tasks in the execution order ("skip-through").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipDecision {
    pub skip: bool,
    pub reason: Option<String>,
    pub skip_to_tasks: Vec<String>,
}

impl SkipDecision {
    pub fn proceed() -> Self {
        Self::default()
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            skip: true,
            reason: Some(reason.into()),
            skip_to_tasks: Vec::new(),
        }
    }

    /// Resume execution at the first of `tasks` found later in the plan.
    pub fn resume_at<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip = true;
        self.skip_to_tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_skip_through(&self) -> bool {
        self.skip && !self.skip_to_tasks.is_empty()
    }
}

// src/dag/registry.rs

//! Task registry and dependency-ordered resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, TaskchainError};
use crate::task::Task;

/// Tasks keyed by id, remembering registration order.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<Task>>,
    index: HashMap<String, usize>,
}

/// Per-resolution DFS bookkeeping.
#[derive(Default)]
struct Resolution {
    /// Ids on the current DFS path, in visiting order.
    path: Vec<String>,
    resolving: HashSet<String>,
    resolved: HashSet<String>,
    ordered: Vec<Arc<Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Ids must be unique.
    pub fn register(&mut self, task: impl Into<Arc<Task>>) -> Result<()> {
        let task = task.into();
        if self.index.contains_key(task.id()) {
            return Err(TaskchainError::DuplicateTask(task.id().to_string()));
        }
        debug!(task = %task.id(), "registered task");
        self.index.insert(task.id().to_string(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Task>> {
        self.index
            .get(id)
            .map(|&idx| Arc::clone(&self.tasks[idx]))
            .ok_or_else(|| TaskchainError::TaskNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id())
    }

    /// Order `tasks` (and any registered dependencies they pull in) so that
    /// every dependency comes strictly before its dependents.
    ///
    /// Independent tasks keep the order in which they appear in `tasks`.
    /// Fails on unregistered tasks, unknown dependencies and cycles.
    pub fn resolve_dependencies(&self, tasks: &[Arc<Task>]) -> Result<Vec<Arc<Task>>> {
        let mut state = Resolution::default();
        for task in tasks {
            if !self.contains(task.id()) {
                return Err(TaskchainError::TaskNotFound(task.id().to_string()));
            }
            self.visit(task.id(), &mut state)?;
        }
        Ok(state.ordered)
    }

    /// Resolve every registered task, in registration order.
    pub fn resolve_all(&self) -> Result<Vec<Arc<Task>>> {
        self.resolve_dependencies(&self.tasks)
    }

    /// Depth-first visit of `root` over an explicit stack of
    /// `(task, next dependency index)` frames, so chain length is not
    /// bounded by the thread stack.
    fn visit(&self, root: &str, state: &mut Resolution) -> Result<()> {
        if state.resolved.contains(root) {
            return Ok(());
        }

        let mut stack = vec![self.enter(root, state)?];
        loop {
            let Some((task, next)) = stack.last_mut() else {
                return Ok(());
            };

            match task.dependencies().get(*next).cloned() {
                Some(dep) => {
                    *next += 1;
                    if !self.contains(&dep) {
                        return Err(TaskchainError::UnknownDependency {
                            task: task.id().to_string(),
                            dependency: dep,
                        });
                    }
                    if state.resolved.contains(&dep) {
                        continue;
                    }
                    let frame = self.enter(&dep, state)?;
                    stack.push(frame);
                }
                None => {
                    let task = Arc::clone(task);
                    stack.pop();
                    state.path.pop();
                    state.resolving.remove(task.id());
                    state.resolved.insert(task.id().to_string());
                    state.ordered.push(task);
                }
            }
        }
    }

    /// Mark `id` as being resolved, failing if it is already on the path.
    fn enter(&self, id: &str, state: &mut Resolution) -> Result<(Arc<Task>, usize)> {
        if state.resolving.contains(id) {
            let start = state
                .path
                .iter()
                .position(|p| p == id)
                .unwrap_or_default();
            let mut path: Vec<String> = state.path[start..].to_vec();
            path.push(id.to_string());
            return Err(TaskchainError::CircularDependency {
                task: id.to_string(),
                path,
            });
        }

        let task = self.get(id)?;

        state.resolving.insert(id.to_string());
        state.path.push(id.to_string());
        Ok((task, 0))
    }
}

// src/task/group.rs

//! Task groups and their expansion into flat, namespaced tasks.
//!
//! A group `git` with tasks `stage` and `commit` expands into `git:stage` and
//! `git:commit`. Ordering between groups is expressed by wiring the *first*
//! task of a dependent group to the *last* task of each group it depends on,
//! so the registry never needs to know about groups at all.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::context::WorkflowContext;
use crate::errors::{Result, TaskchainError};
use crate::task::definition::{SkipFn, Task};
use crate::task::skip::SkipDecision;

pub const NAMESPACE_SEPARATOR: char = ':';

/// Group-level skip predicate.
pub type SkipPredicate = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct GroupMeta {
    pub id: String,
    pub depends_on_groups: Vec<String>,
}

#[derive(Clone, Default)]
pub struct GroupOptions {
    pub skip_condition: Option<SkipPredicate>,
    pub skip_reason: Option<String>,
}

impl fmt::Debug for GroupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupOptions")
            .field("has_skip_condition", &self.skip_condition.is_some())
            .field("skip_reason", &self.skip_reason)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TaskGroup {
    pub meta: GroupMeta,
    pub options: GroupOptions,
    pub tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            meta: GroupMeta {
                id: id.into(),
                depends_on_groups: Vec::new(),
            },
            options: GroupOptions::default(),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn depends_on_group(mut self, group: impl Into<String>) -> Self {
        self.meta.depends_on_groups.push(group.into());
        self
    }

    /// Skip every task of the group when `condition` holds.
    pub fn skip_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&WorkflowContext) -> bool + Send + Sync + 'static,
    {
        self.options.skip_condition = Some(Arc::new(condition));
        self
    }

    /// Constant form of [`TaskGroup::skip_condition`].
    pub fn skip_when(self, skip: bool) -> Self {
        self.skip_condition(move |_| skip)
    }

    pub fn skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.options.skip_reason = Some(reason.into());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Namespaced id of the group's last task, if it has any tasks.
    pub fn last_task_id(&self) -> Option<String> {
        self.tasks
            .last()
            .map(|t| namespaced(&self.meta.id, &t.id))
    }
}

/// Result of expanding one group.
#[derive(Debug, Clone)]
pub struct ExpandedGroup {
    pub group_id: String,
    pub tasks: Vec<Task>,
    /// Original task id -> namespaced id.
    pub id_mapping: BTreeMap<String, String>,
}

pub fn namespaced(group_id: &str, task_id: &str) -> String {
    format!("{group_id}{NAMESPACE_SEPARATOR}{task_id}")
}

fn is_namespaced(id: &str) -> bool {
    id.contains(NAMESPACE_SEPARATOR)
}

/// Rewrite a reference made from inside `group_id`.
///
/// Already-namespaced ids are cross-group references and stay as they are;
/// known bare ids use the mapping; unknown bare ids are assumed to be forward
/// references within the group.
fn resolve_reference(group_id: &str, mapping: &BTreeMap<String, String>, id: &str) -> String {
    if is_namespaced(id) {
        return id.to_string();
    }
    match mapping.get(id) {
        Some(mapped) => mapped.clone(),
        None => {
            debug!(group = %group_id, reference = %id, "namespacing forward reference");
            namespaced(group_id, id)
        }
    }
}

/// Expand a single group.
///
/// `last_task_by_group` maps already-known group ids to the namespaced id of
/// their last task; every group named in `depends_on_groups` must be in it.
pub fn expand(
    group: &TaskGroup,
    last_task_by_group: &HashMap<String, String>,
) -> Result<ExpandedGroup> {
    let group_id = group.meta.id.as_str();
    validate_group(group)?;

    let mut synthetic_deps = Vec::new();
    for dep_group in &group.meta.depends_on_groups {
        match last_task_by_group.get(dep_group) {
            Some(last) => synthetic_deps.push(last.clone()),
            None => {
                return Err(TaskchainError::Validation(format!(
                    "group '{group_id}' depends on unknown or empty group '{dep_group}'"
                )));
            }
        }
    }

    let mut id_mapping = BTreeMap::new();
    let mut tasks = Vec::with_capacity(group.tasks.len());

    for (idx, task) in group.tasks.iter().enumerate() {
        let new_id = namespaced(group_id, &task.id);

        let mut dependencies: Vec<String> = task
            .dependencies
            .iter()
            .map(|dep| resolve_reference(group_id, &id_mapping, dep))
            .collect();

        if idx == 0 {
            for dep in &synthetic_deps {
                if !dependencies.contains(dep) {
                    dependencies.push(dep.clone());
                }
            }
        }

        let mut expanded = task.clone();
        if expanded.name == task.id {
            expanded.name = new_id.clone();
        }
        expanded.id = new_id.clone();
        expanded.dependencies = dependencies;
        expanded.should_skip = merge_skip(group, task.should_skip.clone());

        id_mapping.insert(task.id.clone(), new_id);
        tasks.push(expanded);
    }

    debug!(
        group = %group_id,
        tasks = tasks.len(),
        "expanded task group"
    );

    Ok(ExpandedGroup {
        group_id: group_id.to_string(),
        tasks,
        id_mapping,
    })
}

fn validate_group(group: &TaskGroup) -> Result<()> {
    let group_id = group.meta.id.as_str();
    if group_id.trim().is_empty() {
        return Err(TaskchainError::Validation(
            "group id must not be empty".to_string(),
        ));
    }
    if is_namespaced(group_id) {
        return Err(TaskchainError::Validation(format!(
            "group id '{group_id}' must not contain '{NAMESPACE_SEPARATOR}'"
        )));
    }

    let mut seen = HashSet::new();
    for task in &group.tasks {
        if is_namespaced(&task.id) {
            return Err(TaskchainError::Validation(format!(
                "task id '{}' in group '{group_id}' must not contain '{NAMESPACE_SEPARATOR}'",
                task.id
            )));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(TaskchainError::DuplicateTask(namespaced(group_id, &task.id)));
        }
    }
    Ok(())
}

/// Combine the group's skip condition with a task's own predicate.
///
/// The group condition wins: when it says skip, the task predicate is not
/// evaluated at all. Skip-through targets named by the task predicate are
/// namespaced like dependencies.
fn merge_skip(group: &TaskGroup, own: Option<SkipFn>) -> Option<SkipFn> {
    let group_id = group.meta.id.clone();
    let condition = group.options.skip_condition.clone();

    if condition.is_none() && own.is_none() {
        return None;
    }

    let reason = group
        .options
        .skip_reason
        .clone()
        .unwrap_or_else(|| format!("group '{group_id}' skipped"));
    let mapping: BTreeMap<String, String> = group
        .tasks
        .iter()
        .map(|t| (t.id.clone(), namespaced(&group_id, &t.id)))
        .collect();

    Some(Arc::new(move |ctx: &WorkflowContext| {
        if let Some(cond) = &condition {
            if cond(ctx) {
                return SkipDecision::skip(reason.clone());
            }
        }
        match &own {
            Some(pred) => {
                let mut decision = pred(ctx);
                decision.skip_to_tasks = decision
                    .skip_to_tasks
                    .iter()
                    .map(|t| resolve_reference(&group_id, &mapping, t))
                    .collect();
                decision
            }
            None => SkipDecision::proceed(),
        }
    }))
}

/// Expand a set of groups, validating the group-level dependency graph.
///
/// Groups may reference each other in any declaration order; the result keeps
/// declaration order. Unknown group references, duplicate group ids and
/// cycles between groups are rejected before anything is expanded.
pub fn expand_groups(groups: &[TaskGroup]) -> Result<Vec<ExpandedGroup>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for group in groups {
        if graph.contains_node(group.id()) {
            return Err(TaskchainError::Validation(format!(
                "duplicate group id '{}'",
                group.id()
            )));
        }
        graph.add_node(group.id());
    }

    // Edge direction: dependency group -> dependent group.
    for group in groups {
        for dep in &group.meta.depends_on_groups {
            if !graph.contains_node(dep.as_str()) {
                return Err(TaskchainError::Validation(format!(
                    "group '{}' depends on unknown group '{}'",
                    group.id(),
                    dep
                )));
            }
            graph.add_edge(dep.as_str(), group.id(), ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let node = cycle.node_id();
        return Err(TaskchainError::CircularDependency {
            task: node.to_string(),
            path: group_cycle_path(&graph, node),
        });
    }

    let last_task_by_group: HashMap<String, String> = groups
        .iter()
        .filter_map(|g| g.last_task_id().map(|last| (g.id().to_string(), last)))
        .collect();

    groups
        .iter()
        .map(|group| expand(group, &last_task_by_group))
        .collect()
}

/// Group ids forming the cycle through `start`, in depends-on order
/// (`a -> b -> a` when `a` depends on `b`).
///
/// Breadth-first over incoming edges (dependency groups), so the shortest
/// cycle is reported.
fn group_cycle_path(graph: &DiGraphMap<&str, ()>, start: &str) -> Vec<String> {
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for dep in graph.neighbors_directed(node, Direction::Incoming) {
            if dep == start {
                let mut path = vec![start.to_string()];
                let mut chain = vec![node];
                let mut cur = node;
                while cur != start {
                    match parent.get(cur) {
                        Some(&prev) => {
                            chain.push(prev);
                            cur = prev;
                        }
                        None => break,
                    }
                }
                // `chain` runs node -> ... -> start; drop `start` and flip.
                chain.pop();
                path.extend(chain.into_iter().rev().map(str::to_string));
                path.push(start.to_string());
                return path;
            }
            if !parent.contains_key(dep) {
                parent.insert(dep, node);
                queue.push_back(dep);
            }
        }
    }

    vec![start.to_string()]
}

// src/context.rs

//! Immutable workflow state threaded from task to task.
//!
//! A [`WorkflowContext`] is never mutated in place. Tasks call
//! [`WorkflowContext::fork`] (or [`WorkflowContext::fork_multiple`]) to get a
//! *new* context with some keys replaced, and return it to the orchestrator,
//! which hands it to the next task. The parent context stays valid and
//! unchanged, which is what makes rollback replay safe.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{Result, TaskchainError};

/// Data and config maps keyed by string.
pub type ContextMap = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct WorkflowContext {
    execution_id: String,
    start_time: SystemTime,
    dry_run: bool,
    config: Arc<ContextMap>,
    data: Arc<ContextMap>,
}

impl WorkflowContext {
    pub fn new(execution_id: impl Into<String>, config: ContextMap) -> Self {
        Self {
            execution_id: execution_id.into(),
            start_time: SystemTime::now(),
            dry_run: false,
            config: Arc::new(config),
            data: Arc::new(ContextMap::new()),
        }
    }

    /// Seed the initial data map. Only meant for building the root context.
    pub fn with_data(mut self, data: ContextMap) -> Self {
        self.data = Arc::new(data);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed().unwrap_or(Duration::ZERO)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Look up a data value. Missing keys are an error, never a default.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.data
            .get(key)
            .ok_or_else(|| TaskchainError::ContextKeyNotFound(key.to_string()))
    }

    /// Look up a data value and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            TaskchainError::Validation(format!("context key '{key}' has unexpected type: {e}"))
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|k| k.as_str())
    }

    /// Look up a read-only config value.
    pub fn config_value(&self, key: &str) -> Result<&Value> {
        self.config
            .get(key)
            .ok_or_else(|| TaskchainError::ContextKeyNotFound(format!("config.{key}")))
    }

    pub fn config(&self) -> &ContextMap {
        &self.config
    }

    /// Return a new context with `key` set to `value`.
    pub fn fork(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fork_multiple([(key.into(), value.into())])
    }

    /// Return a new context with every `(key, value)` in `updates` applied.
    pub fn fork_multiple<K, V, I>(&self, updates: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut data = Arc::clone(&self.data);
        // `make_mut` clones the map because `self` still holds a reference.
        let map = Arc::make_mut(&mut data);
        for (key, value) in updates {
            map.insert(key.into(), value.into());
        }

        Self {
            execution_id: self.execution_id.clone(),
            start_time: self.start_time,
            dry_run: self.dry_run,
            config: Arc::clone(&self.config),
            data,
        }
    }

    /// Frozen copy of the data map.
    pub fn snapshot(&self) -> ContextMap {
        (*self.data).clone()
    }
}

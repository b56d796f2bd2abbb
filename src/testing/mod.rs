//! Testing utilities for users of the Convoy library.
//!
//! This module provides helpers for testing pipelines without touching real
//! hosts:
//!
//! - [`ScriptedTask`]: A leaf that sleeps, optionally fails, and records calls
//! - [`CallLog`]: A shared, ordered record of executes and rollbacks
//! - [`RecordingHandler`]: An event handler that keeps every event it sees
//! - [`test_env`]: An execution environment wired to a fresh event bus
//! - [`FakeBackend`]: An in-memory [`ClusterBackend`] for manager tests
//!
//! The rehearsal plans loaded by [`crate::config`] are built from
//! [`ScriptedTask`]s as well.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::OperatorOptions;
use crate::core::env::ExecEnv;
use crate::core::task::{Task, TaskError};
use crate::core::types::ClusterName;
use crate::events::{Event, EventBus, EventHandler};
use crate::manager::{ClusterBackend, ManagerError};

/// Ordered record of task calls, shared between tasks and the test.
///
/// Entries look like `"exec:<name>"` and `"rollback:<name>"`.
///
/// # Example
///
/// ```
/// use convoy::testing::CallLog;
///
/// let log = CallLog::new();
/// log.push("exec:copy");
/// assert_eq!(log.entries(), vec!["exec:copy"]);
/// assert_eq!(log.count("exec:copy"), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Entries with the given prefix, with the prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    /// Names of executed tasks, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.with_prefix("exec:")
    }

    /// Names of rolled back tasks, in call order.
    pub fn rolled_back(&self) -> Vec<String> {
        self.with_prefix("rollback:")
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a [`ScriptedTask`] answers a rollback request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMode {
    /// Rollback succeeds.
    #[default]
    Ok,
    /// Rollback reports [`TaskError::RollbackUnsupported`].
    Unsupported,
    /// Rollback fails with an execution error.
    Fail,
}

/// A leaf task whose behavior is scripted up front.
///
/// On execute it records `exec:<name>`, reports 50% progress, sleeps for its
/// delay and then either succeeds or fails with the configured message.
///
/// # Example
///
/// ```
/// use convoy::testing::{CallLog, ScriptedTask};
/// use std::time::Duration;
///
/// let log = CallLog::new();
/// let task = ScriptedTask::new("copy")
///     .with_delay(Duration::from_millis(10))
///     .failing("disk full")
///     .with_log(log.clone());
/// assert_eq!(task.name(), "copy");
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedTask {
    name: String,
    delay: Duration,
    failure: Option<String>,
    rollback: RollbackMode,
    log: CallLog,
}

impl ScriptedTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            failure: None,
            rollback: RollbackMode::Ok,
            log: CallLog::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make execute fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn with_rollback(mut self, mode: RollbackMode) -> Self {
        self.rollback = mode;
        self
    }

    /// Record calls into a shared log.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl Task for ScriptedTask {
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        self.log.push(format!("exec:{}", self.name));
        env.report_progress(50);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.failure {
            Some(message) => Err(TaskError::failed(message)),
            None => Ok(()),
        }
    }

    async fn rollback(&self, _env: &mut ExecEnv) -> Result<(), TaskError> {
        self.log.push(format!("rollback:{}", self.name));
        match self.rollback {
            RollbackMode::Ok => Ok(()),
            RollbackMode::Unsupported => Err(TaskError::RollbackUnsupported),
            RollbackMode::Fail => Err(TaskError::failed(format!(
                "rollback of {} failed",
                self.name
            ))),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Event handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: AsyncMutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Descriptions carried by `TaskBegin` events, in arrival order.
    pub async fn begun(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                Event::TaskBegin { task, .. } => Some(task.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(description, error)` pairs carried by `TaskFinish` events.
    pub async fn finished(&self) -> Vec<(String, Option<String>)> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                Event::TaskFinish { task, error, .. } => Some((task.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// Create an execution environment whose events land in the returned handler.
pub async fn test_env() -> (ExecEnv, Arc<RecordingHandler>) {
    let bus = Arc::new(EventBus::new());
    let handler = Arc::new(RecordingHandler::new());
    bus.register(handler.clone()).await;
    (ExecEnv::new(bus), handler)
}

/// In-memory cluster backend.
///
/// Connection tasks are [`ScriptedTask`]s named after each host; operator
/// calls are recorded as `"<operation>:<cluster>"` (`"enable:<cluster>:<bool>"`
/// for enable) in the same [`CallLog`].
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    clusters: HashMap<String, Vec<String>>,
    unreachable: HashSet<String>,
    operator_failure: Option<String>,
    connect_delay: Duration,
    log: CallLog,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(mut self, name: &str, hosts: &[&str]) -> Self {
        self.clusters.insert(
            name.to_string(),
            hosts.iter().map(|h| h.to_string()).collect(),
        );
        self
    }

    /// Make connecting to `host` fail.
    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// Make every operator call fail with `message`.
    pub fn failing_operator(mut self, message: impl Into<String>) -> Self {
        self.operator_failure = Some(message.into());
        self
    }

    /// Delay each connection task.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    fn operator(&self, entry: String) -> Result<(), TaskError> {
        self.log.push(entry);
        match &self.operator_failure {
            Some(message) => Err(TaskError::failed(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterBackend for FakeBackend {
    async fn exists(&self, cluster: &ClusterName) -> bool {
        self.clusters.contains_key(cluster.as_str())
    }

    fn connection_tasks(
        &self,
        cluster: &ClusterName,
        _options: &OperatorOptions,
    ) -> Result<Vec<Box<dyn Task>>, ManagerError> {
        let hosts = self
            .clusters
            .get(cluster.as_str())
            .ok_or_else(|| ManagerError::ClusterNotFound(cluster.clone()))?;

        Ok(hosts
            .iter()
            .map(|host| {
                let task = ScriptedTask::new(host.as_str())
                    .with_delay(self.connect_delay)
                    .with_log(self.log.clone());
                let task = if self.unreachable.contains(host) {
                    task.failing(format!("connect to {} refused", host))
                } else {
                    task
                };
                Box::new(task) as Box<dyn Task>
            })
            .collect())
    }

    async fn start(&self, cluster: &ClusterName, _options: &OperatorOptions) -> Result<(), TaskError> {
        self.operator(format!("start:{}", cluster))
    }

    async fn stop(&self, cluster: &ClusterName, _options: &OperatorOptions) -> Result<(), TaskError> {
        self.operator(format!("stop:{}", cluster))
    }

    async fn restart(
        &self,
        cluster: &ClusterName,
        _options: &OperatorOptions,
    ) -> Result<(), TaskError> {
        self.operator(format!("restart:{}", cluster))
    }

    async fn enable(
        &self,
        cluster: &ClusterName,
        _options: &OperatorOptions,
        enable: bool,
    ) -> Result<(), TaskError> {
        self.operator(format!("enable:{}:{}", cluster, enable))
    }
}

//! Rehearsal plans.
//!
//! A plan describes a pipeline made of scripted leaves, so the engine's
//! ordering, failure and rollback behavior can be exercised without any
//! hosts. Each step is tagged by `type`:
//!
//! ```yaml
//! name: rehearse-start
//! rollback_on_failure: true
//! steps:
//!   - name: Download components
//!     type: step
//!     delay_ms: 100
//!   - name: Start instances
//!     type: parallel
//!     hosts:
//!       - 10.0.0.1
//!       - host: 10.0.0.2
//!         fail: timeout
//!   - name: StartCluster
//!     type: func
//! ```

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::task::Task;
use crate::execution::{Builder, Serial};
use crate::testing::{CallLog, RollbackMode, ScriptedTask};

/// A rehearsal plan loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Plan name, used in log lines.
    pub name: String,
    /// Keep running after a failing step.
    #[serde(default)]
    pub ignore_error: bool,
    /// Suppress per-leaf log lines.
    #[serde(default)]
    pub hide_detail_display: bool,
    /// Roll the pipeline back when it fails.
    #[serde(default)]
    pub rollback_on_failure: bool,
    /// Steps in execution order.
    pub steps: Vec<StepConfig>,
}

/// One step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within the plan.
    pub name: String,
    /// Step shape.
    #[serde(flatten)]
    pub kind: StepKind,
    /// How long the scripted leaf takes.
    #[serde(default)]
    pub delay_ms: u64,
    /// Make the scripted leaf fail with this message.
    pub fail: Option<String>,
    /// How the scripted leaf answers rollback.
    #[serde(default)]
    pub rollback: RollbackMode,
}

/// Step shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// One leaf shown as a progress step.
    Step,
    /// One leaf per host, run concurrently under a group header.
    Parallel {
        hosts: Vec<HostConfig>,
        #[serde(default)]
        ignore_error: bool,
    },
    /// An inline function task. Cannot be rolled back.
    Func,
}

/// A host in a parallel step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostConfig {
    /// Just the host; inherits the step's leaf settings.
    Simple(String),
    /// Host with its own leaf settings.
    Full {
        host: String,
        delay_ms: Option<u64>,
        fail: Option<String>,
        rollback: Option<RollbackMode>,
    },
}

impl HostConfig {
    pub fn host(&self) -> &str {
        match self {
            HostConfig::Simple(host) => host,
            HostConfig::Full { host, .. } => host,
        }
    }

    fn leaf(&self, step: &StepConfig, log: &CallLog) -> ScriptedTask {
        let mut delay_ms = step.delay_ms;
        let mut fail = step.fail.clone();
        let mut rollback = step.rollback;
        if let HostConfig::Full {
            delay_ms: d,
            fail: f,
            rollback: r,
            ..
        } = self
        {
            delay_ms = d.unwrap_or(delay_ms);
            fail = f.clone().or(fail);
            rollback = r.unwrap_or(rollback);
        }
        scripted(self.host(), delay_ms, fail, rollback, log)
    }
}

impl StepConfig {
    fn leaf(&self, log: &CallLog) -> ScriptedTask {
        scripted(&self.name, self.delay_ms, self.fail.clone(), self.rollback, log)
    }
}

fn scripted(
    name: &str,
    delay_ms: u64,
    fail: Option<String>,
    rollback: RollbackMode,
    log: &CallLog,
) -> ScriptedTask {
    let task = ScriptedTask::new(name)
        .with_delay(Duration::from_millis(delay_ms))
        .with_rollback(rollback)
        .with_log(log.clone());
    match fail {
        Some(message) => task.failing(message),
        None => task,
    }
}

impl PlanConfig {
    /// Build the plan's pipeline.
    pub fn build(&self) -> Serial {
        self.build_with_log(CallLog::new())
    }

    /// Build the plan's pipeline, recording every leaf call into `log`.
    pub fn build_with_log(&self, log: CallLog) -> Serial {
        let builder = self.steps.iter().fold(Builder::new(), |builder, step| match &step.kind {
            StepKind::Step => builder.step(step.name.clone(), Box::new(step.leaf(&log))),
            StepKind::Parallel {
                hosts,
                ignore_error,
            } => {
                let leaves = hosts
                    .iter()
                    .map(|h| Box::new(h.leaf(step, &log)) as Box<dyn Task>)
                    .collect();
                builder.parallel_step(step.name.clone(), *ignore_error, leaves)
            }
            StepKind::Func => {
                let leaf = step.leaf(&log);
                builder.func(step.name.clone(), move |env| {
                    let leaf = leaf.clone();
                    async move { leaf.execute(env).await }.boxed()
                })
            }
        });

        builder
            .ignore_error(self.ignore_error)
            .hide_detail_display(self.hide_detail_display)
            .build()
    }

    /// Number of leaves the plan runs.
    pub fn leaf_count(&self) -> usize {
        self.steps
            .iter()
            .map(|s| match &s.kind {
                StepKind::Parallel { hosts, .. } => hosts.len(),
                _ => 1,
            })
            .sum()
    }
}

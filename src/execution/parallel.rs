//! Concurrent composite.
//!
//! A [`Parallel`] spawns one tokio task per child, each with its own forked
//! [`ExecEnv`], and waits for all of them before returning. A failing child
//! never stops its siblings; the first error to arrive is kept and later ones
//! are dropped.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tracing::{Instrument, debug, info, info_span, warn};

use super::traced::{execute_child, rollback_child};
use crate::core::env::ExecEnv;
use crate::core::task::{Task, TaskError, TaskKind};

/// Executes its children concurrently.
pub struct Parallel {
    children: Vec<Arc<dyn Task>>,
    ignore_error: bool,
    hide_detail_display: bool,
}

impl Parallel {
    pub fn new(children: Vec<Arc<dyn Task>>) -> Self {
        Self {
            children,
            ignore_error: false,
            hide_detail_display: false,
        }
    }

    /// Report success even if some children fail.
    pub fn with_ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }

    /// Suppress the per-child `+ [Parallel]` log line.
    pub fn with_hide_detail_display(mut self, hide: bool) -> Self {
        self.hide_detail_display = hide;
        self
    }

    pub fn children(&self) -> &[Arc<dyn Task>] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Run `op` once per child on its own worker and return the first error.
    async fn fan_out(&self, env: &ExecEnv, op: BranchOp) -> Option<TaskError> {
        let first_error = FirstError::default();

        let handles: Vec<_> = self
            .children
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let child = Arc::clone(child);
                let mut branch = env.fork();
                let first_error = first_error.clone();
                let announce = op == BranchOp::Execute
                    && child.kind().is_leaf()
                    && !self.hide_detail_display;

                let span = info_span!(
                    "parallel_branch",
                    branch = %branch.checkpoint().branch(),
                    index = index,
                );

                tokio::spawn(
                    async move {
                        if announce {
                            info!("+ [Parallel] - {}", child.describe());
                        }
                        let result = match op {
                            BranchOp::Execute => execute_child(child.as_ref(), &mut branch).await,
                            BranchOp::Rollback => rollback_child(child.as_ref(), &mut branch).await,
                        };
                        if let Err(e) = result {
                            debug!(error = %e, "branch failed");
                            first_error.offer(e);
                        }
                    }
                    .instrument(span),
                )
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                first_error.offer(TaskError::WorkerPanicked(e.to_string()));
            }
        }

        first_error.take()
    }
}

#[async_trait]
impl Task for Parallel {
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        match self.fan_out(env, BranchOp::Execute).await {
            Some(e) if self.ignore_error => {
                warn!(error = %e, "ignoring parallel failure");
                Ok(())
            }
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rolls back every child concurrently, whether or not its execute
    /// succeeded.
    async fn rollback(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        match self.fan_out(env, BranchOp::Rollback).await {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        self.children
            .iter()
            .map(|c| c.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Parallel
    }

    fn reset_progress(&self) {
        for child in &self.children {
            child.reset_progress();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchOp {
    Execute,
    Rollback,
}

/// Slot keeping only the first error offered to it.
#[derive(Clone, Default)]
struct FirstError(Arc<Mutex<Option<TaskError>>>);

impl FirstError {
    fn offer(&self, err: TaskError) {
        let mut slot = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take(&self) -> Option<TaskError> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

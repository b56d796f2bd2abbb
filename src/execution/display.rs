//! Progress-reporting decorators.
//!
//! [`StepDisplay`] and [`ParallelStepDisplay`] are inert with respect to
//! execution: they forward execute and rollback untouched and only expose a
//! [`ProgressView`] for [`Serial::compute_progress`](super::Serial::compute_progress).

use async_trait::async_trait;
use std::sync::Arc;

use super::parallel::Parallel;
use crate::core::env::{ExecEnv, ProgressCell};
use crate::core::task::{ProgressView, StepProgress, Task, TaskError, TaskKind};

/// Wraps one task with a prefix and a 0-100 progress counter.
///
/// While the wrapped task runs, the counter is installed as the environment's
/// progress sink, so leaves can call [`ExecEnv::report_progress`]. The step
/// reads 1% once started and 100% once the wrapped task succeeds.
pub struct StepDisplay {
    prefix: String,
    inner: Box<dyn Task>,
    progress: ProgressCell,
}

impl StepDisplay {
    pub fn new(prefix: impl Into<String>, inner: Box<dyn Task>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
            progress: ProgressCell::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn progress(&self) -> u8 {
        self.progress.get()
    }

    /// Handle to the counter, for readers on other threads.
    pub fn progress_cell(&self) -> ProgressCell {
        self.progress.clone()
    }

    pub fn inner(&self) -> &dyn Task {
        self.inner.as_ref()
    }
}

#[async_trait]
impl Task for StepDisplay {
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        self.progress.reset();
        self.progress.advance(1);

        let outer = env.swap_progress(Some(self.progress.clone()));
        let result = self.inner.execute(env).await;
        env.swap_progress(outer);

        if result.is_ok() {
            self.progress.complete();
        }
        result
    }

    async fn rollback(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        self.inner.rollback(env).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Display
    }

    fn progress_view(&self) -> Option<ProgressView> {
        Some(ProgressView::Step(StepProgress {
            prefix: self.prefix.clone(),
            progress: self.progress.get(),
        }))
    }

    fn reset_progress(&self) {
        self.progress.reset();
        self.inner.reset_progress();
    }
}

/// Wraps a [`Parallel`] whose children are [`StepDisplay`]s under a header.
pub struct ParallelStepDisplay {
    prefix: String,
    inner: Parallel,
}

impl ParallelStepDisplay {
    pub fn new(prefix: impl Into<String>, inner: Parallel) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &Parallel {
        &self.inner
    }

    /// Progress of each child step. Children without a step view are skipped.
    pub fn steps(&self) -> Vec<StepProgress> {
        self.inner
            .children()
            .iter()
            .filter_map(|child| match child.progress_view() {
                Some(ProgressView::Step(step)) => Some(step),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Task for ParallelStepDisplay {
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        self.inner.execute(env).await
    }

    async fn rollback(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        self.inner.rollback(env).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Display
    }

    fn progress_view(&self) -> Option<ProgressView> {
        Some(ProgressView::Group {
            prefix: self.prefix.clone(),
            steps: self.steps(),
        })
    }

    fn reset_progress(&self) {
        self.inner.reset_progress();
    }
}

/// Wrap every task in a [`StepDisplay`] prefixed with its first description line.
pub(crate) fn wrap_steps(tasks: Vec<Box<dyn Task>>) -> Vec<Arc<dyn Task>> {
    tasks
        .into_iter()
        .map(|task| {
            let prefix = crate::core::env::task_label(task.as_ref());
            Arc::new(StepDisplay::new(prefix, task)) as Arc<dyn Task>
        })
        .collect()
}

//! Fluent pipeline assembly.

use futures::future::BoxFuture;
use std::sync::Arc;

use super::display::{ParallelStepDisplay, StepDisplay, wrap_steps};
use super::func::FnTask;
use super::parallel::Parallel;
use super::serial::Serial;
use crate::core::env::ExecEnv;
use crate::core::task::{Task, TaskError};

/// Accumulates tasks and materializes them as one root [`Serial`].
///
/// The builder holds no execution state. `build` consumes it, so a pipeline
/// is materialized at most once per builder:
///
/// ```compile_fail
/// use convoy::Builder;
///
/// let builder = Builder::new();
/// let first = builder.build();
/// let second = builder.build(); // builder was moved
/// ```
///
/// # Example
///
/// ```
/// use convoy::{Builder, Task};
/// use convoy::testing::ScriptedTask;
/// use futures::FutureExt;
///
/// let pipeline = Builder::new()
///     .parallel_step(
///         "Connect hosts",
///         false,
///         vec![
///             Box::new(ScriptedTask::new("10.0.0.1")) as Box<dyn Task>,
///             Box::new(ScriptedTask::new("10.0.0.2")),
///         ],
///     )
///     .func("StartCluster", |_env| async { Ok(()) }.boxed())
///     .build();
///
/// assert_eq!(pipeline.len(), 2);
/// assert_eq!(pipeline.describe(), "10.0.0.1\n10.0.0.2\nStartCluster");
/// ```
#[derive(Default)]
pub struct Builder {
    tasks: Vec<Box<dyn Task>>,
    ignore_error: bool,
    hide_detail_display: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named async function.
    pub fn func<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut ExecEnv) -> BoxFuture<'a, Result<(), TaskError>>
            + Send
            + Sync
            + 'static,
    {
        self.tasks.push(Box::new(FnTask::new(name, func)));
        self
    }

    /// Append an existing task.
    pub fn task<T: Task + 'static>(mut self, task: T) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    /// Append an already boxed task.
    pub fn boxed(mut self, task: Box<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Append a nested serial group.
    pub fn serial(mut self, tasks: Vec<Box<dyn Task>>) -> Self {
        self.tasks.push(Box::new(Serial::new(tasks)));
        self
    }

    /// Append a concurrent group.
    pub fn parallel(mut self, ignore_error: bool, tasks: Vec<Box<dyn Task>>) -> Self {
        let children = tasks.into_iter().map(Arc::from).collect();
        self.tasks
            .push(Box::new(Parallel::new(children).with_ignore_error(ignore_error)));
        self
    }

    /// Append a task wrapped in a progress-reporting step.
    pub fn step(mut self, prefix: impl Into<String>, task: Box<dyn Task>) -> Self {
        self.tasks.push(Box::new(StepDisplay::new(prefix, task)));
        self
    }

    /// Append a concurrent group shown under `prefix`, one step per task.
    ///
    /// Each step is labelled with the first line of its task's description.
    pub fn parallel_step(
        mut self,
        prefix: impl Into<String>,
        ignore_error: bool,
        tasks: Vec<Box<dyn Task>>,
    ) -> Self {
        let group = Parallel::new(wrap_steps(tasks)).with_ignore_error(ignore_error);
        self.tasks
            .push(Box::new(ParallelStepDisplay::new(prefix, group)));
        self
    }

    /// Make the root group keep going after failures.
    pub fn ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }

    /// Suppress per-child log lines of the root group.
    pub fn hide_detail_display(mut self, hide: bool) -> Self {
        self.hide_detail_display = hide;
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Materialize everything appended so far, in append order.
    pub fn build(self) -> Serial {
        Serial::new(self.tasks)
            .with_ignore_error(self.ignore_error)
            .with_hide_detail_display(self.hide_detail_display)
    }

    /// Materialize the pipeline as a single display step.
    pub fn build_as_step(self, prefix: impl Into<String>) -> StepDisplay {
        StepDisplay::new(prefix, Box::new(self.build()))
    }
}

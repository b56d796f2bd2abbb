//! Task trait and error types.
//!
//! The `Task` trait is the fundamental unit of orchestration work. Leaf
//! implementations (remote commands, file copies, health checks) live outside
//! the engine; the composites in [`crate::execution`] only rely on this
//! contract.

use async_trait::async_trait;
use thiserror::Error;

use super::env::ExecEnv;

/// Errors that can occur while executing or rolling back a task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The task cannot undo the work it performed.
    #[error("unsupported rollback")]
    RollbackUnsupported,

    /// The leaf could not acquire an executor for its host.
    #[error("no executor")]
    NoExecutor,

    /// The leaf could not read the output of its host.
    #[error("no outputs available")]
    NoOutput,

    /// The execution environment was cancelled before the task started.
    #[error("cancelled")]
    Cancelled,

    /// A concurrent worker panicked before reporting a result.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// Opaque leaf error, passed through unchanged.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Shorthand for [`TaskError::ExecutionFailed`].
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::ExecutionFailed(message.into())
    }

    /// Wrap any leaf error without changing its message.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TaskError::Other(Box::new(err))
    }

    /// Check whether this error only signals that rollback is not possible.
    pub fn is_rollback_unsupported(&self) -> bool {
        matches!(self, TaskError::RollbackUnsupported)
    }
}

/// Capability tag describing what a task is.
///
/// Composites and display decorators declare their tag explicitly; everything
/// else is a leaf. Only leaves get their own `+ [ Serial ]` / `+ [Parallel]`
/// log line, since composites log their children instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskKind {
    #[default]
    Leaf,
    Serial,
    Parallel,
    Display,
}

impl TaskKind {
    pub fn is_leaf(&self) -> bool {
        matches!(self, TaskKind::Leaf)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Leaf => "leaf",
            TaskKind::Serial => "serial",
            TaskKind::Parallel => "parallel",
            TaskKind::Display => "display",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single display step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    pub prefix: String,
    /// 0-100.
    pub progress: u8,
}

impl StepProgress {
    pub fn is_finished(&self) -> bool {
        self.progress >= 100
    }

    /// Render as `"<prefix> ... NN%"`, or `None` while the step has not begun.
    pub fn status_line(&self) -> Option<String> {
        (self.progress > 0).then(|| format!("{} ... {}%", self.prefix, self.progress))
    }
}

/// What a display decorator exposes to the progress aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressView {
    /// A single step.
    Step(StepProgress),
    /// A section header followed by the steps of a parallel group.
    Group {
        prefix: String,
        steps: Vec<StepProgress>,
    },
}

/// The core trait for orchestration work.
///
/// # Example
///
/// ```ignore
/// use convoy::{ExecEnv, Task, TaskError};
/// use async_trait::async_trait;
///
/// struct CopyConfig {
///     host: String,
/// }
///
/// #[async_trait]
/// impl Task for CopyConfig {
///     async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
///         // push the file over the host's executor
///         env.report_progress(50);
///         Ok(())
///     }
///
///     async fn rollback(&self, _env: &mut ExecEnv) -> Result<(), TaskError> {
///         // remove the file again
///         Ok(())
///     }
///
///     fn describe(&self) -> String {
///         format!("CopyConfig: host={}", self.host)
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    /// Run the task.
    ///
    /// # Returns
    /// * `Ok(())` - Task completed successfully
    /// * `Err(TaskError)` - Task failed; the error is surfaced unchanged
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError>;

    /// Undo the work done by [`execute`](Self::execute).
    ///
    /// Default implementation reports [`TaskError::RollbackUnsupported`].
    async fn rollback(&self, _env: &mut ExecEnv) -> Result<(), TaskError> {
        Err(TaskError::RollbackUnsupported)
    }

    /// Human-readable, possibly multi-line, description.
    fn describe(&self) -> String;

    /// Capability tag. Default implementation returns [`TaskKind::Leaf`].
    fn kind(&self) -> TaskKind {
        TaskKind::Leaf
    }

    /// Progress exposed to the aggregator; only display decorators return one.
    fn progress_view(&self) -> Option<ProgressView> {
        None
    }

    /// Clear display progress left over from a previous run.
    ///
    /// Composites and decorators forward this to what they wrap.
    fn reset_progress(&self) {}
}

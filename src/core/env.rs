//! Execution environment threaded through every task call.
//!
//! [`ExecEnv`] bundles the capabilities a task may use while it runs:
//!
//! - a cancellation token (shared by every branch of a run)
//! - the [`EventBus`] that receives begin/finish events
//! - a [`Checkpoint`] trace handle, forked per concurrent branch
//! - an optional progress cell installed by the enclosing display step
//!
//! Composites hand `&mut ExecEnv` down to their children. Concurrent workers
//! never share an environment; they each receive one built by
//! [`ExecEnv::fork`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::checkpoint::{Checkpoint, Journal};
use super::task::{Task, TaskError};
use crate::events::{Event, EventBus};

/// Shared 0-100 progress counter.
///
/// Writes only ever move the value forward, so readers polling from another
/// thread may see a stale value but never a regression.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell(Arc<AtomicU8>);

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the value to `percent` (clamped to 100). Lower values are ignored.
    pub fn advance(&self, percent: u8) {
        self.0.fetch_max(percent.min(100), Ordering::AcqRel);
    }

    /// Clear the value before a new run.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn complete(&self) {
        self.advance(100);
    }

    pub fn is_complete(&self) -> bool {
        self.get() >= 100
    }
}

/// Execution environment for one logical line of execution.
pub struct ExecEnv {
    cancel: CancellationToken,
    events: Arc<EventBus>,
    checkpoint: Checkpoint,
    progress: Option<ProgressCell>,
}

impl ExecEnv {
    /// Create a root environment publishing to `events`.
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            cancel: CancellationToken::new(),
            events,
            checkpoint: Checkpoint::new(),
            progress: None,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Record finished tasks into an existing journal.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.checkpoint = Checkpoint::with_journal(journal);
        self
    }

    /// Derive the environment for a new concurrent branch.
    ///
    /// Cancellation, events and the progress sink are shared; the checkpoint
    /// handle is forked.
    pub fn fork(&self) -> Self {
        Self {
            cancel: self.cancel.clone(),
            events: Arc::clone(&self.events),
            checkpoint: self.checkpoint.fork(),
            progress: self.progress.clone(),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled. Leaves select on this during
    /// blocking I/O.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn checkpoint_mut(&mut self) -> &mut Checkpoint {
        &mut self.checkpoint
    }

    /// Report progress of the innermost display step. No-op outside one.
    pub fn report_progress(&self, percent: u8) {
        if let Some(cell) = &self.progress {
            cell.advance(percent);
        }
    }

    pub(crate) fn swap_progress(&mut self, cell: Option<ProgressCell>) -> Option<ProgressCell> {
        std::mem::replace(&mut self.progress, cell)
    }

    pub async fn publish_begin(&self, task: &dyn Task) {
        self.events
            .emit(Event::task_begin(
                task.describe(),
                task.kind(),
                self.checkpoint.branch(),
            ))
            .await;
    }

    pub async fn publish_finish(&self, task: &dyn Task, error: Option<&TaskError>, duration: Duration) {
        self.events
            .emit(Event::task_finish(
                task.describe(),
                task.kind(),
                self.checkpoint.branch(),
                error.map(|e| e.to_string()),
                duration,
            ))
            .await;
    }
}

impl Default for ExecEnv {
    fn default() -> Self {
        Self::new(Arc::new(EventBus::new()))
    }
}

/// First non-blank line of a task's description, used as its checkpoint label.
pub(crate) fn task_label(task: &dyn Task) -> String {
    task.describe()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("<unnamed>")
        .to_string()
}

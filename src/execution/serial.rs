//! Sequential composite.
//!
//! A [`Serial`] runs its children one at a time in insertion order and stops
//! at the first failure unless it ignores errors. While it runs it keeps:
//!
//! - a provisional percentage, bumped half a child ahead of each start
//! - the status lines of the child in flight (`- <line> ... Starting`)
//! - the step log of finished children (`- <line> ... Done`)
//!
//! Both are readable from other threads while `execute` is in progress.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, info, warn};

use super::progress::ProgressSnapshot;
use super::traced::{execute_child, rollback_child};
use crate::core::env::ExecEnv;
use crate::core::task::{Task, TaskError, TaskKind};

/// Status tag attached to a child's step lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Starting,
    Error,
    Done,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Starting => "Starting",
            StepStatus::Error => "Error",
            StepStatus::Done => "Done",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct StepState {
    started: usize,
    current: Vec<String>,
    completed: Vec<String>,
}

/// Executes its children in order.
pub struct Serial {
    children: Vec<Box<dyn Task>>,
    ignore_error: bool,
    hide_detail_display: bool,
    progress: AtomicU8,
    steps: Mutex<StepState>,
}

impl Serial {
    pub fn new(children: Vec<Box<dyn Task>>) -> Self {
        Self {
            children,
            ignore_error: false,
            hide_detail_display: false,
            progress: AtomicU8::new(0),
            steps: Mutex::new(StepState::default()),
        }
    }

    /// Keep going after a failing child and report success at the end.
    pub fn with_ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }

    /// Suppress the per-child `+ [ Serial ]` log line.
    pub fn with_hide_detail_display(mut self, hide: bool) -> Self {
        self.hide_detail_display = hide;
        self
    }

    pub fn children(&self) -> &[Box<dyn Task>] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Aggregate progress, 0-100. Reaches 100 only after every child succeeded.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    /// Number of children started during the last (or current) execute.
    pub fn started(&self) -> usize {
        self.with_steps(|s| s.started)
    }

    /// Lines of children that finished.
    pub fn completed_steps(&self) -> Vec<String> {
        self.with_steps(|s| s.completed.clone())
    }

    /// Lines of the child in flight, or of the child that failed last.
    pub fn current_steps(&self) -> Vec<String> {
        self.with_steps(|s| s.current.clone())
    }

    /// Completed lines followed by the current child's lines.
    pub fn step_log(&self) -> Vec<String> {
        self.with_steps(|s| s.completed.iter().chain(&s.current).cloned().collect())
    }

    /// Progress of the display steps among the direct children.
    ///
    /// Steps nested one level inside a parallel group are counted too. Safe to
    /// call while `execute` runs; values may be slightly stale.
    pub fn compute_progress(&self) -> ProgressSnapshot {
        ProgressSnapshot::from_views(self.children.iter().filter_map(|c| c.progress_view()))
    }

    fn with_steps<T>(&self, f: impl FnOnce(&mut StepState) -> T) -> T {
        let mut state = self.steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn reset(&self) {
        self.reset_progress();
        self.with_steps(|s| *s = StepState::default());
    }

    /// Count a child as started and move progress half a child ahead.
    fn begin_child(&self) {
        let total = self.children.len();
        let half_step = ((100 / total) / 2).max(1);
        let started = self.with_steps(|s| {
            let started = s.started;
            s.started += 1;
            started
        });
        let provisional = (started * 100 / total + half_step).min(99) as u8;
        self.progress.fetch_max(provisional, Ordering::AcqRel);
        debug!(progress = provisional, started = started + 1, total, "serial progress");
    }

    /// Tag every non-blank description line of `child` with `status`.
    ///
    /// Only `Done` moves the lines into the step log. Any other status just
    /// replaces the current lines, so an error ignored under `ignore_error`
    /// shows until the next child starts.
    fn save_steps(&self, child: &dyn Task, status: StepStatus) {
        let lines: Vec<String> = child
            .describe()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| format!("- {} ... {}", l, status))
            .collect();

        self.with_steps(|s| match status {
            StepStatus::Done => {
                s.completed.extend(lines);
                s.current.clear();
            }
            _ => s.current = lines,
        });
    }
}

#[async_trait]
impl Task for Serial {
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        self.reset();

        for child in &self.children {
            let child = child.as_ref();
            if env.is_cancelled() {
                debug!(task = %child.describe(), "cancelled before start");
                return Err(TaskError::Cancelled);
            }

            if child.kind().is_leaf() && !self.hide_detail_display {
                info!("+ [ Serial ] - {}", child.describe());
            }

            self.begin_child();
            self.save_steps(child, StepStatus::Starting);

            match execute_child(child, env).await {
                Ok(()) => self.save_steps(child, StepStatus::Done),
                Err(e) if self.ignore_error => {
                    warn!(error = %e, "ignoring serial failure");
                    self.save_steps(child, StepStatus::Error);
                }
                Err(e) => {
                    self.save_steps(child, StepStatus::Error);
                    return Err(e);
                }
            }
        }

        self.progress.store(100, Ordering::Release);
        Ok(())
    }

    /// Rolls every child back in reverse order, stopping at the first failure.
    ///
    /// Children that never started are rolled back as well, so leaves must
    /// tolerate undoing work they did not do.
    async fn rollback(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        for child in self.children.iter().rev() {
            rollback_child(child.as_ref(), env).await?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.children
            .iter()
            .map(|c| c.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Serial
    }

    fn reset_progress(&self) {
        self.progress.store(0, Ordering::Release);
        for child in &self.children {
            child.reset_progress();
        }
    }
}

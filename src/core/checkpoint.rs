//! Checkpoint/trace handles.
//!
//! A [`Checkpoint`] tracks the path of tasks currently being executed on one
//! logical line of execution, like a call stack. It is deliberately not
//! `Clone` and not shareable: every concurrent worker must take its own
//! handle via [`Checkpoint::fork`], which copies the parent's path into a new
//! branch. Finished tasks are recorded in a [`Journal`] shared by all
//! branches of one run, which can be dumped as JSON for post-mortems.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::task::TaskError;
use super::types::BranchId;

/// How a task on a checkpoint path ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    RolledBack,
    RollbackFailed,
}

/// One finished task as seen from its branch.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointRecord {
    pub branch: BranchId,
    pub parent: Option<BranchId>,
    /// Labels from the root of the tree down to the finished task.
    pub path: Vec<String>,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append-only record of finished tasks, shared by every branch of a run.
#[derive(Debug)]
pub struct Journal {
    next_branch: AtomicU64,
    records: RwLock<Vec<CheckpointRecord>>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            // 0 is the root branch
            next_branch: AtomicU64::new(1),
            records: RwLock::new(Vec::new()),
        }
    }

    fn allocate_branch(&self) -> BranchId {
        BranchId::new(self.next_branch.fetch_add(1, Ordering::SeqCst))
    }

    fn push(&self, record: CheckpointRecord) {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// Snapshot of all records in the order they were written.
    pub fn records(&self) -> Vec<CheckpointRecord> {
        self.records
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Records written by one branch.
    pub fn branch_records(&self, branch: BranchId) -> Vec<CheckpointRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.branch == branch)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .map(|r| r.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize all records as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.records())
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-branch trace handle.
#[derive(Debug)]
pub struct Checkpoint {
    branch: BranchId,
    parent: Option<BranchId>,
    path: Vec<String>,
    journal: Arc<Journal>,
}

impl Checkpoint {
    /// Create a root handle with a fresh journal.
    pub fn new() -> Self {
        Self::with_journal(Arc::new(Journal::new()))
    }

    /// Create a root handle writing into an existing journal.
    pub fn with_journal(journal: Arc<Journal>) -> Self {
        Self {
            branch: BranchId::ROOT,
            parent: None,
            path: Vec::new(),
            journal,
        }
    }

    /// Open a new branch for a concurrent worker.
    ///
    /// The new handle starts with a copy of this handle's path and shares the
    /// journal, but its path evolves independently.
    pub fn fork(&self) -> Self {
        Self {
            branch: self.journal.allocate_branch(),
            parent: Some(self.branch),
            path: self.path.clone(),
            journal: Arc::clone(&self.journal),
        }
    }

    /// Push a task label onto the path.
    pub fn enter(&mut self, label: impl Into<String>) {
        self.path.push(label.into());
    }

    /// Pop the innermost label.
    pub fn leave(&mut self) -> Option<String> {
        self.path.pop()
    }

    /// Record the innermost task as finished.
    pub fn record(&self, outcome: Outcome, error: Option<&TaskError>) {
        self.journal.push(CheckpointRecord {
            branch: self.branch,
            parent: self.parent,
            path: self.path.clone(),
            outcome,
            error: error.map(|e| e.to_string()),
            at: Utc::now(),
        });
    }

    pub fn branch(&self) -> BranchId {
        self.branch
    }

    pub fn parent(&self) -> Option<BranchId> {
        self.parent
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

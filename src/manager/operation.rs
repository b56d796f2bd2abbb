//! Operation reports and the in-flight operation store.
//!
//! Every launched operation gets its own slot in an [`OperationStore`], keyed
//! by [`OperationId`]. Callers poll through the [`OperationHandle`] returned at
//! launch, or through the store when they only kept the id.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::ManagerError;
use crate::core::task::TaskError;
use crate::core::types::{ClusterName, OperationId};
use crate::execution::{ProgressSnapshot, Serial};

/// Cluster lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl OperationKind {
    /// Name of the inline function task that calls the operator.
    pub fn task_name(&self) -> &'static str {
        match self {
            OperationKind::Start => "StartCluster",
            OperationKind::Stop => "StopCluster",
            OperationKind::Restart => "RestartCluster",
            OperationKind::Enable => "EnableCluster",
            OperationKind::Disable => "DisableCluster",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Start => "start",
            OperationKind::Stop => "stop",
            OperationKind::Restart => "restart",
            OperationKind::Enable => "enable",
            OperationKind::Disable => "disable",
        }
    }

    pub(crate) fn progressive(&self) -> &'static str {
        match self {
            OperationKind::Start => "Starting",
            OperationKind::Stop => "Stopping",
            OperationKind::Restart => "Restarting",
            OperationKind::Enable => "Enabling",
            OperationKind::Disable => "Disabling",
        }
    }

    pub(crate) fn past(&self) -> &'static str {
        match self {
            OperationKind::Start => "Started",
            OperationKind::Stop => "Stopped",
            OperationKind::Restart => "Restarted",
            OperationKind::Enable => "Enabled",
            OperationKind::Disable => "Disabled",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Running,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }
}

/// Outcome of one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation_id: OperationId,
    pub operation: OperationKind,
    pub cluster: ClusterName,
    /// Terminal error, `None` on success.
    pub error: Option<String>,
    /// Step log of the root pipeline.
    pub steps: Vec<String>,
    /// Display-step progress at the end of the run.
    pub progress: ProgressSnapshot,
    pub duration: Duration,
}

impl OperationReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> OperationStatus {
        if self.is_success() {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        }
    }

    /// Turn a failed report into [`ManagerError::OperationFailed`].
    pub fn into_result(self) -> Result<Self, ManagerError> {
        match &self.error {
            None => Ok(self),
            Some(message) => Err(ManagerError::OperationFailed {
                operation: self.operation,
                cluster: self.cluster.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// One row of [`OperationStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSummary {
    pub id: OperationId,
    pub operation: OperationKind,
    pub cluster: ClusterName,
    pub status: OperationStatus,
}

struct Slot {
    operation: OperationKind,
    cluster: ClusterName,
    pipeline: Arc<Serial>,
    report: Option<OperationReport>,
}

impl Slot {
    fn status(&self) -> OperationStatus {
        self.report
            .as_ref()
            .map(OperationReport::status)
            .unwrap_or(OperationStatus::Running)
    }
}

/// Status slots for launched operations, one per [`OperationId`].
#[derive(Clone, Default)]
pub struct OperationStore {
    slots: Arc<RwLock<HashMap<OperationId, Slot>>>,
}

impl OperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(
        &self,
        id: OperationId,
        operation: OperationKind,
        cluster: ClusterName,
        pipeline: Arc<Serial>,
    ) {
        self.slots.write().await.insert(
            id,
            Slot {
                operation,
                cluster,
                pipeline,
                report: None,
            },
        );
    }

    pub(crate) async fn finish(&self, report: OperationReport) {
        if let Some(slot) = self.slots.write().await.get_mut(&report.operation_id) {
            slot.report = Some(report);
        }
    }

    pub async fn status(&self, id: &OperationId) -> Option<OperationStatus> {
        self.slots.read().await.get(id).map(Slot::status)
    }

    /// Live progress of the operation's pipeline.
    pub async fn progress(&self, id: &OperationId) -> Option<ProgressSnapshot> {
        self.slots
            .read()
            .await
            .get(id)
            .map(|slot| slot.pipeline.compute_progress())
    }

    /// Live step log of the operation's pipeline.
    pub async fn steps(&self, id: &OperationId) -> Option<Vec<String>> {
        self.slots
            .read()
            .await
            .get(id)
            .map(|slot| slot.pipeline.step_log())
    }

    /// Final report, once the operation finished.
    pub async fn report(&self, id: &OperationId) -> Option<OperationReport> {
        self.slots
            .read()
            .await
            .get(id)
            .and_then(|slot| slot.report.clone())
    }

    pub async fn list(&self) -> Vec<OperationSummary> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| OperationSummary {
                id: *id,
                operation: slot.operation,
                cluster: slot.cluster.clone(),
                status: slot.status(),
            })
            .collect()
    }

    /// Forget an operation. Returns whether it was known.
    pub async fn remove(&self, id: &OperationId) -> bool {
        self.slots.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Handle to an operation running in the background.
pub struct OperationHandle {
    id: OperationId,
    store: OperationStore,
    join: JoinHandle<OperationReport>,
}

impl OperationHandle {
    pub(crate) fn new(
        id: OperationId,
        store: OperationStore,
        join: JoinHandle<OperationReport>,
    ) -> Self {
        Self { id, store, join }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub async fn status(&self) -> Option<OperationStatus> {
        self.store.status(&self.id).await
    }

    pub async fn progress(&self) -> Option<ProgressSnapshot> {
        self.store.progress(&self.id).await
    }

    pub async fn steps(&self) -> Option<Vec<String>> {
        self.store.steps(&self.id).await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the operation to finish.
    pub async fn wait(self) -> Result<OperationReport, ManagerError> {
        self.join
            .await
            .map_err(|e| ManagerError::Task(TaskError::WorkerPanicked(e.to_string())))
    }
}

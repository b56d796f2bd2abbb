//! convoy - task execution engine for cluster lifecycle operations.
//!
//! Operations such as starting or stopping a cluster are expressed as trees of
//! [`Task`]s: leaves doing work on one host, composed with [`Serial`] and
//! [`Parallel`] groups and wrapped in [`StepDisplay`]s for progress reporting.
//! The [`Builder`] assembles those trees and the [`Manager`] drives them.

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod manager;
pub mod testing;

pub use config::{ConfigError, OperatorOptions, PlanConfig, YamlLoader};
pub use core::checkpoint::{Checkpoint, CheckpointRecord, Journal, Outcome};
pub use core::env::{ExecEnv, ProgressCell};
pub use core::task::{ProgressView, StepProgress, Task, TaskError, TaskKind};
pub use core::types::{BranchId, ClusterName, OperationId};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    Builder, FnTask, Parallel, ParallelStepDisplay, ProgressSnapshot, Serial, StepDisplay,
    StepStatus,
};
pub use manager::{
    ClusterBackend, Manager, ManagerError, OperationHandle, OperationKind, OperationReport,
    OperationStatus, OperationStore, OperationSummary,
};

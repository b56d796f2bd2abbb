//! Cluster lifecycle operations.
//!
//! The [`Manager`] turns start/stop/restart/enable requests into pipelines:
//! one display group preparing remote access to every host, followed by an
//! inline function calling the matching operator of the [`ClusterBackend`].
//! Topology, SSH transport and the operators themselves belong to the
//! backend.

mod operation;

pub use operation::{
    OperationHandle, OperationKind, OperationReport, OperationStatus, OperationStore,
    OperationSummary,
};

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{ConfigError, OperatorOptions};
use crate::core::env::ExecEnv;
use crate::core::task::{Task, TaskError};
use crate::core::types::{ClusterName, OperationId};
use crate::events::{Event, EventBus};
use crate::execution::{Builder, Serial};

/// Errors surfaced by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The backend has no cluster with this name.
    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterName),

    /// The pipeline ran and failed.
    #[error("{operation} cluster `{cluster}` failed: {message}")]
    OperationFailed {
        operation: OperationKind,
        cluster: ClusterName,
        message: String,
    },

    /// Invalid operator options.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The backend could not plan the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Task error outside of a pipeline run.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Topology, transport and operators of the managed clusters.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Whether a cluster with this name is known.
    async fn exists(&self, cluster: &ClusterName) -> bool;

    /// Leaf tasks preparing remote access to every host of the cluster.
    fn connection_tasks(
        &self,
        cluster: &ClusterName,
        options: &OperatorOptions,
    ) -> Result<Vec<Box<dyn Task>>, ManagerError>;

    async fn start(
        &self,
        cluster: &ClusterName,
        options: &OperatorOptions,
    ) -> Result<(), TaskError>;

    async fn stop(
        &self,
        cluster: &ClusterName,
        options: &OperatorOptions,
    ) -> Result<(), TaskError>;

    async fn restart(
        &self,
        cluster: &ClusterName,
        options: &OperatorOptions,
    ) -> Result<(), TaskError>;

    /// Enable (or disable) the cluster's services at boot.
    async fn enable(
        &self,
        cluster: &ClusterName,
        options: &OperatorOptions,
        enable: bool,
    ) -> Result<(), TaskError>;
}

const CONNECT_PREFIX: &str = "Connect to hosts";

/// Entry point for cluster lifecycle operations.
pub struct Manager {
    backend: Arc<dyn ClusterBackend>,
    events: Arc<EventBus>,
    operations: OperationStore,
}

impl Manager {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self {
            backend,
            events: Arc::new(EventBus::new()),
            operations: OperationStore::new(),
        }
    }

    /// Publish task and operation events into `events`.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Operations started with [`Manager::launch`].
    pub fn operations(&self) -> &OperationStore {
        &self.operations
    }

    pub async fn start_cluster(
        &self,
        name: &str,
        options: &OperatorOptions,
    ) -> Result<OperationReport, ManagerError> {
        self.start_cluster_with(name, options, |b| b).await
    }

    /// Start a cluster, letting `extend` append tasks after the operator call.
    pub async fn start_cluster_with<F>(
        &self,
        name: &str,
        options: &OperatorOptions,
        extend: F,
    ) -> Result<OperationReport, ManagerError>
    where
        F: FnOnce(Builder) -> Builder,
    {
        self.run(OperationKind::Start, name, options, extend).await
    }

    pub async fn stop_cluster(
        &self,
        name: &str,
        options: &OperatorOptions,
    ) -> Result<OperationReport, ManagerError> {
        self.run(OperationKind::Stop, name, options, |b| b).await
    }

    pub async fn restart_cluster(
        &self,
        name: &str,
        options: &OperatorOptions,
    ) -> Result<OperationReport, ManagerError> {
        self.run(OperationKind::Restart, name, options, |b| b).await
    }

    /// Enable or disable the cluster's services at boot.
    pub async fn enable_cluster(
        &self,
        name: &str,
        options: &OperatorOptions,
        enable: bool,
    ) -> Result<OperationReport, ManagerError> {
        let kind = if enable {
            OperationKind::Enable
        } else {
            OperationKind::Disable
        };
        self.run(kind, name, options, |b| b).await
    }

    /// Start an operation in the background.
    ///
    /// Planning errors are returned right away; the pipeline itself runs on a
    /// spawned task tracked in [`Manager::operations`].
    pub async fn launch(
        &self,
        kind: OperationKind,
        name: &str,
        options: &OperatorOptions,
    ) -> Result<OperationHandle, ManagerError> {
        let cluster = ClusterName::new(name);
        let pipeline = Arc::new(self.plan(kind, &cluster, options, |b| b).await?);
        let id = OperationId::new();

        self.operations
            .register(id, kind, cluster.clone(), Arc::clone(&pipeline))
            .await;

        let events = Arc::clone(&self.events);
        let store = self.operations.clone();
        let join = tokio::spawn(async move {
            let report = execute_pipeline(events, id, kind, cluster, &pipeline).await;
            store.finish(report.clone()).await;
            report
        });

        Ok(OperationHandle::new(id, self.operations.clone(), join))
    }

    async fn run<F>(
        &self,
        kind: OperationKind,
        name: &str,
        options: &OperatorOptions,
        extend: F,
    ) -> Result<OperationReport, ManagerError>
    where
        F: FnOnce(Builder) -> Builder,
    {
        let cluster = ClusterName::new(name);
        let pipeline = self.plan(kind, &cluster, options, extend).await?;
        let report = execute_pipeline(
            Arc::clone(&self.events),
            OperationId::new(),
            kind,
            cluster,
            &pipeline,
        )
        .await;
        Ok(report)
    }

    /// Assemble the pipeline for one operation.
    async fn plan<F>(
        &self,
        kind: OperationKind,
        cluster: &ClusterName,
        options: &OperatorOptions,
        extend: F,
    ) -> Result<Serial, ManagerError>
    where
        F: FnOnce(Builder) -> Builder,
    {
        options.validate()?;
        if !self.backend.exists(cluster).await {
            return Err(ManagerError::ClusterNotFound(cluster.clone()));
        }

        let connect = self.backend.connection_tasks(cluster, options)?;
        let backend = Arc::clone(&self.backend);
        let target = cluster.clone();
        let opts = options.clone();

        let builder = Builder::new()
            .parallel_step(CONNECT_PREFIX, false, connect)
            .func(kind.task_name(), move |_env| {
                let backend = Arc::clone(&backend);
                let cluster = target.clone();
                let options = opts.clone();
                async move {
                    match kind {
                        OperationKind::Start => backend.start(&cluster, &options).await,
                        OperationKind::Stop => backend.stop(&cluster, &options).await,
                        OperationKind::Restart => backend.restart(&cluster, &options).await,
                        OperationKind::Enable => backend.enable(&cluster, &options, true).await,
                        OperationKind::Disable => backend.enable(&cluster, &options, false).await,
                    }
                }
                .boxed()
            });

        Ok(extend(builder).build())
    }
}

async fn execute_pipeline(
    events: Arc<EventBus>,
    id: OperationId,
    kind: OperationKind,
    cluster: ClusterName,
    pipeline: &Serial,
) -> OperationReport {
    info!("{} cluster {}...", kind.progressive(), cluster);
    events
        .emit(Event::operation_started(id, kind, cluster.clone()))
        .await;

    let started = Instant::now();
    let mut env = ExecEnv::new(Arc::clone(&events));
    let result = pipeline.execute(&mut env).await;
    let duration = started.elapsed();

    events
        .emit(Event::operation_finished(
            id,
            kind,
            cluster.clone(),
            result.is_ok(),
            duration,
        ))
        .await;

    match &result {
        Ok(()) => info!("{} cluster `{}` successfully", kind.past(), cluster),
        Err(e) => error!(operation = %kind, cluster = %cluster, error = %e, "operation failed"),
    }

    OperationReport {
        operation_id: id,
        operation: kind,
        cluster,
        error: result.err().map(|e| e.to_string()),
        steps: pipeline.step_log(),
        progress: pipeline.compute_progress(),
        duration,
    }
}

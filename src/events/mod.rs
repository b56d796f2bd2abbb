//! Lifecycle events and event handling.
//!
//! This module provides the event sink the engine publishes into: one
//! begin/finish pair per child task run by a composite, plus operation-level
//! events emitted by the [`Manager`](crate::manager::Manager).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::task::TaskKind;
use crate::core::types::{BranchId, ClusterName, OperationId};
use crate::manager::OperationKind;

/// Lifecycle events emitted during execution.
#[derive(Debug, Clone)]
pub enum Event {
    /// A composite is about to run one of its children.
    TaskBegin {
        task: String,
        kind: TaskKind,
        branch: BranchId,
        timestamp: Instant,
    },

    /// A child finished, successfully when `error` is `None`.
    TaskFinish {
        task: String,
        kind: TaskKind,
        branch: BranchId,
        error: Option<String>,
        duration: Duration,
        timestamp: Instant,
    },

    /// A manager operation has started.
    OperationStarted {
        operation_id: OperationId,
        kind: OperationKind,
        cluster: ClusterName,
        timestamp: Instant,
    },

    /// A manager operation finished (successfully or not).
    OperationFinished {
        operation_id: OperationId,
        kind: OperationKind,
        cluster: ClusterName,
        success: bool,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TaskBegin { timestamp, .. } => *timestamp,
            Event::TaskFinish { timestamp, .. } => *timestamp,
            Event::OperationStarted { timestamp, .. } => *timestamp,
            Event::OperationFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Create a TaskBegin event.
    pub fn task_begin(task: String, kind: TaskKind, branch: BranchId) -> Self {
        Event::TaskBegin {
            task,
            kind,
            branch,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFinish event.
    pub fn task_finish(
        task: String,
        kind: TaskKind,
        branch: BranchId,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        Event::TaskFinish {
            task,
            kind,
            branch,
            error,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create an OperationStarted event.
    pub fn operation_started(
        operation_id: OperationId,
        kind: OperationKind,
        cluster: ClusterName,
    ) -> Self {
        Event::OperationStarted {
            operation_id,
            kind,
            cluster,
            timestamp: Instant::now(),
        }
    }

    /// Create an OperationFinished event.
    pub fn operation_finished(
        operation_id: OperationId,
        kind: OperationKind,
        cluster: ClusterName,
        success: bool,
        duration: Duration,
    ) -> Self {
        Event::OperationFinished {
            operation_id,
            kind,
            cluster,
            success,
            duration,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers, in registration order.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//! Child invocation shared by the composites.
//!
//! Every child run by a [`Serial`](super::Serial) or [`Parallel`](super::Parallel)
//! goes through here so that begin/finish events and checkpoint records are
//! written the same way for both.

use std::time::Instant;
use tracing::debug;

use crate::core::checkpoint::Outcome;
use crate::core::env::{ExecEnv, task_label};
use crate::core::task::{Task, TaskError};

/// Execute `child` with its label pushed on the checkpoint path, bracketed by
/// begin/finish events.
pub(crate) async fn execute_child(child: &dyn Task, env: &mut ExecEnv) -> Result<(), TaskError> {
    env.checkpoint_mut().enter(task_label(child));
    env.publish_begin(child).await;

    let started = Instant::now();
    let result = child.execute(env).await;

    env.publish_finish(child, result.as_ref().err(), started.elapsed())
        .await;
    let outcome = match &result {
        Ok(()) => Outcome::Succeeded,
        Err(_) => Outcome::Failed,
    };
    env.checkpoint().record(outcome, result.as_ref().err());
    env.checkpoint_mut().leave();

    result
}

/// Roll `child` back with its label pushed on the checkpoint path.
pub(crate) async fn rollback_child(child: &dyn Task, env: &mut ExecEnv) -> Result<(), TaskError> {
    let label = task_label(child);
    debug!(task = %label, branch = %env.checkpoint().branch(), "rolling back");
    env.checkpoint_mut().enter(label);

    let result = child.rollback(env).await;

    let outcome = match &result {
        Ok(()) => Outcome::RolledBack,
        Err(_) => Outcome::RollbackFailed,
    };
    env.checkpoint().record(outcome, result.as_ref().err());
    env.checkpoint_mut().leave();

    result
}

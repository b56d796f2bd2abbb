//! Inline function tasks.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::core::env::ExecEnv;
use crate::core::task::{Task, TaskError};

type TaskFn =
    dyn for<'a> Fn(&'a mut ExecEnv) -> BoxFuture<'a, Result<(), TaskError>> + Send + Sync;

/// A named async function run as a leaf task.
///
/// Used to splice domain calls ("stop then enable with these options") into a
/// pipeline without writing a dedicated task type. Function tasks cannot be
/// rolled back.
///
/// # Example
///
/// ```
/// use convoy::execution::FnTask;
/// use convoy::Task;
/// use futures::FutureExt;
///
/// let task = FnTask::new("StartCluster", |_env| async { Ok(()) }.boxed());
/// assert_eq!(task.describe(), "StartCluster");
/// ```
pub struct FnTask {
    name: String,
    func: Box<TaskFn>,
}

impl FnTask {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut ExecEnv) -> BoxFuture<'a, Result<(), TaskError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for FnTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Task for FnTask {
    async fn execute(&self, env: &mut ExecEnv) -> Result<(), TaskError> {
        (self.func)(env).await
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

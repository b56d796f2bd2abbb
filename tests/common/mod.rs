//! Common test utilities shared across integration tests.

use convoy::testing::{CallLog, ScriptedTask};
use convoy::{Serial, Task};
use std::time::Duration;

/// Box scripted tasks sharing `log`, for the builder APIs taking `Vec<Box<dyn Task>>`.
pub fn leaves(log: &CallLog, names: &[&str]) -> Vec<Box<dyn Task>> {
    names
        .iter()
        .map(|name| Box::new(ScriptedTask::new(*name).with_log(log.clone())) as Box<dyn Task>)
        .collect()
}

/// Wait until the pipeline's display progress reaches at least `percent`.
///
/// Polls every 5ms and panics once `timeout` elapses.
pub async fn wait_for_progress(pipeline: &Serial, percent: u8, timeout: Duration) {
    let start = tokio::time::Instant::now();
    loop {
        let snapshot = pipeline.compute_progress();
        if snapshot.percent >= percent {
            return;
        }
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for progress {}%, current: {:?}",
                percent, snapshot
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

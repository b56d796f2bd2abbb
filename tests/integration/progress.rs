//! Live progress integration tests.
//!
//! These run a pipeline on a spawned task and poll it from the test, the way
//! a progress renderer does.

use convoy::testing::{CallLog, ScriptedTask};
use convoy::{Builder, ExecEnv, Serial, Task};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{leaves, wait_for_progress};

fn spawn_run(pipeline: &Arc<Serial>) -> tokio::task::JoinHandle<Result<(), convoy::TaskError>> {
    let pipeline = Arc::clone(pipeline);
    tokio::spawn(async move {
        let mut env = ExecEnv::default();
        pipeline.execute(&mut env).await
    })
}

async fn wait_for_serial_progress(pipeline: &Serial, percent: u8, timeout: Duration) {
    let start = tokio::time::Instant::now();
    while pipeline.progress() < percent {
        if start.elapsed() > timeout {
            panic!(
                "Timeout waiting for serial progress {}%, current: {}%",
                percent,
                pipeline.progress()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_is_visible_while_running() {
    let pipeline = Arc::new(
        Builder::new()
            .step("Copy files", Box::new(ScriptedTask::new("copy")))
            .step(
                "Restart services",
                Box::new(ScriptedTask::new("restart").with_delay(Duration::from_millis(400))),
            )
            .build(),
    );

    let run = spawn_run(&pipeline);

    wait_for_progress(&pipeline, 50, Duration::from_secs(2)).await;
    wait_for_serial_progress(&pipeline, 75, Duration::from_secs(2)).await;
    while pipeline.current_steps().is_empty() {
        tokio::task::yield_now().await;
    }

    let snapshot = pipeline.compute_progress();
    assert_eq!(snapshot.percent, 50);
    assert_eq!(snapshot.lines[0], "Copy files ... 100%");
    assert!(pipeline.progress() < 100);
    assert_eq!(pipeline.current_steps(), vec!["- restart ... Starting"]);
    assert_eq!(pipeline.completed_steps(), vec!["- copy ... Done"]);

    run.await.unwrap().unwrap();

    let snapshot = pipeline.compute_progress();
    assert_eq!(snapshot.percent, 100);
    assert_eq!(
        snapshot.lines,
        vec!["Copy files ... 100%", "Restart services ... 100%"]
    );
    assert_eq!(pipeline.progress(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leaf_reports_into_enclosing_step() {
    let pipeline = Arc::new(
        Builder::new()
            .step(
                "Download",
                Box::new(ScriptedTask::new("download").with_delay(Duration::from_millis(300))),
            )
            .build(),
    );

    let run = spawn_run(&pipeline);

    let start = tokio::time::Instant::now();
    loop {
        let snapshot = pipeline.compute_progress();
        if snapshot.lines.first().map(String::as_str) == Some("Download ... 50%") {
            assert_eq!(snapshot.percent, 0);
            break;
        }
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "step never reported 50%: {:?}",
            snapshot
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    run.await.unwrap().unwrap();
    assert_eq!(pipeline.compute_progress().lines, vec!["Download ... 100%"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_group_lines_under_header() {
    let log = CallLog::new();
    let pipeline = Builder::new()
        .parallel_step("Connect to hosts", false, leaves(&log, &["h1", "h2", "h3"]))
        .step("Configure", Box::new(ScriptedTask::new("configure")))
        .build();

    let snapshot = pipeline.compute_progress();
    assert!(snapshot.lines.is_empty());
    assert_eq!(snapshot.percent, 0);

    let mut env = ExecEnv::default();
    pipeline.execute(&mut env).await.unwrap();

    let snapshot = pipeline.compute_progress();
    assert_eq!(
        snapshot.lines,
        vec![
            "Connect to hosts",
            "h1 ... 100%",
            "h2 ... 100%",
            "h3 ... 100%",
            "Configure ... 100%",
        ]
    );
    assert_eq!(snapshot.percent, 100);
}

#[tokio::test]
async fn test_failed_step_never_reaches_full_progress() {
    let pipeline = Builder::new()
        .step("Prepare", Box::new(ScriptedTask::new("prepare")))
        .step("Deploy", Box::new(ScriptedTask::new("deploy").failing("no space")))
        .step("Verify", Box::new(ScriptedTask::new("verify")))
        .build();
    let mut env = ExecEnv::default();

    assert!(pipeline.execute(&mut env).await.is_err());

    let snapshot = pipeline.compute_progress();
    assert_eq!(snapshot.lines, vec!["Prepare ... 100%", "Deploy ... 50%"]);
    assert_eq!(snapshot.percent, 33);
    assert!(pipeline.progress() < 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rerun_does_not_show_stale_step_progress() {
    let pipeline = Arc::new(
        Builder::new()
            .step("S1", Box::new(ScriptedTask::new("s1")))
            .step(
                "S2",
                Box::new(ScriptedTask::new("s2").with_delay(Duration::from_millis(300))),
            )
            .build(),
    );
    spawn_run(&pipeline).await.unwrap().unwrap();
    assert_eq!(pipeline.compute_progress().percent, 100);

    let rerun = spawn_run(&pipeline);
    wait_for_serial_progress(&pipeline, 75, Duration::from_secs(2)).await;

    let snapshot = pipeline.compute_progress();
    assert_eq!(snapshot.percent, 50);
    assert_eq!(snapshot.lines[0], "S1 ... 100%");
    assert!(!snapshot.lines.contains(&"S2 ... 100%".to_string()));
    assert!(pipeline.progress() < 100);

    rerun.await.unwrap().unwrap();
    assert_eq!(pipeline.compute_progress().percent, 100);
}

#[tokio::test]
async fn test_progress_resets_between_runs() {
    let log = CallLog::new();
    let pipeline = Serial::new(leaves(&log, &["a", "b", "c", "d"]));
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();
    assert_eq!(pipeline.progress(), 100);
    assert_eq!(pipeline.completed_steps().len(), 4);

    pipeline.execute(&mut env).await.unwrap();

    assert_eq!(pipeline.progress(), 100);
    assert_eq!(pipeline.completed_steps().len(), 4);
    assert_eq!(pipeline.started(), 4);
    assert_eq!(log.count("exec:a"), 2);
}

#[tokio::test]
async fn test_nested_build_as_step_reports_as_one_step() {
    let log = CallLog::new();
    let inner = Builder::new()
        .serial(leaves(&log, &["a", "b"]))
        .build_as_step("Inner pipeline");
    let pipeline = Builder::new().task(inner).build();
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();

    let snapshot = pipeline.compute_progress();
    assert_eq!(snapshot.lines, vec!["Inner pipeline ... 100%"]);
    assert_eq!(snapshot.percent, 100);
    assert_eq!(log.executed(), vec!["a", "b"]);
}

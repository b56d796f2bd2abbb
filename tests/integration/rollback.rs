//! Rollback integration tests.

use convoy::testing::{CallLog, RollbackMode, ScriptedTask, test_env};
use convoy::{Builder, ExecEnv, Outcome, Parallel, Task, TaskError};
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;

use crate::common::leaves;

#[tokio::test]
async fn test_rollback_after_partial_failure_runs_in_reverse() {
    let log = CallLog::new();
    let pipeline = Builder::new()
        .task(ScriptedTask::new("A").with_log(log.clone()))
        .task(ScriptedTask::new("B").failing("disk full").with_log(log.clone()))
        .task(ScriptedTask::new("C").with_log(log.clone()))
        .build();
    let mut env = ExecEnv::default();

    assert!(pipeline.execute(&mut env).await.is_err());
    pipeline.rollback(&mut env).await.unwrap();

    // C never ran but is still asked to undo its work
    assert_eq!(log.rolled_back(), vec!["C", "B", "A"]);
}

#[tokio::test]
async fn test_rollback_stops_at_first_failure() {
    let log = CallLog::new();
    let pipeline = Builder::new()
        .task(ScriptedTask::new("a").with_log(log.clone()))
        .task(
            ScriptedTask::new("b")
                .with_rollback(RollbackMode::Unsupported)
                .with_log(log.clone()),
        )
        .task(ScriptedTask::new("c").with_log(log.clone()))
        .build();
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();
    let err = pipeline.rollback(&mut env).await.unwrap_err();

    assert!(err.is_rollback_unsupported());
    assert_eq!(log.rolled_back(), vec!["c", "b"]);
}

#[tokio::test]
async fn test_func_tasks_cannot_be_rolled_back() {
    let log = CallLog::new();
    let pipeline = Builder::new()
        .task(ScriptedTask::new("before").with_log(log.clone()))
        .func("inline", |_env| async { Ok(()) }.boxed())
        .task(ScriptedTask::new("after").with_log(log.clone()))
        .build();
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();
    let err = pipeline.rollback(&mut env).await.unwrap_err();

    assert!(matches!(err, TaskError::RollbackUnsupported));
    assert_eq!(log.rolled_back(), vec!["after"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_rollback_reaches_every_child() {
    let log = CallLog::new();
    let parallel = Parallel::new(vec![
        Arc::new(ScriptedTask::new("h1").with_log(log.clone())) as Arc<dyn Task>,
        Arc::new(
            ScriptedTask::new("h2")
                .with_rollback(RollbackMode::Fail)
                .with_log(log.clone()),
        ),
        Arc::new(ScriptedTask::new("h3").with_log(log.clone())),
    ]);
    let mut env = ExecEnv::default();

    let err = parallel.rollback(&mut env).await.unwrap_err();

    assert!(err.to_string().contains("rollback of h2 failed"));
    let rolled: HashSet<String> = log.rolled_back().into_iter().collect();
    assert_eq!(rolled.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nested_rollback_order() {
    let log = CallLog::new();
    let pipeline = Builder::new()
        .task(ScriptedTask::new("first").with_log(log.clone()))
        .parallel_step("Hosts", false, leaves(&log, &["h1", "h2"]))
        .step("Last", Box::new(ScriptedTask::new("last").with_log(log.clone())))
        .build();
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();
    pipeline.rollback(&mut env).await.unwrap();

    let rolled = log.rolled_back();
    assert_eq!(rolled.len(), 4);
    assert_eq!(rolled[0], "last");
    let middle: HashSet<&str> = rolled[1..3].iter().map(String::as_str).collect();
    assert_eq!(middle, HashSet::from(["h1", "h2"]));
    assert_eq!(rolled[3], "first");
}

#[tokio::test]
async fn test_rollback_is_journaled_without_events() {
    let log = CallLog::new();
    let pipeline = Builder::new()
        .task(ScriptedTask::new("a").with_log(log.clone()))
        .task(
            ScriptedTask::new("b")
                .with_rollback(RollbackMode::Fail)
                .with_log(log.clone()),
        )
        .build();
    let (mut env, handler) = test_env().await;

    pipeline.execute(&mut env).await.unwrap();
    let events_after_execute = handler.events().await.len();
    assert!(pipeline.rollback(&mut env).await.is_err());

    assert_eq!(handler.events().await.len(), events_after_execute);

    let outcomes: Vec<(Vec<String>, Outcome)> = env
        .checkpoint()
        .journal()
        .records()
        .into_iter()
        .map(|r| (r.path, r.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (vec!["a".to_string()], Outcome::Succeeded),
            (vec!["b".to_string()], Outcome::Succeeded),
            (vec!["b".to_string()], Outcome::RollbackFailed),
        ]
    );
}

//! Manager integration tests against the in-memory backend.

use convoy::testing::{FakeBackend, RecordingHandler, ScriptedTask};
use convoy::{
    Event, EventBus, Manager, ManagerError, OperationKind, OperationStatus, OperatorOptions,
};
use std::sync::Arc;
use std::time::Duration;

fn options() -> OperatorOptions {
    OperatorOptions::default()
}

#[tokio::test]
async fn test_every_operation_calls_its_operator() {
    let backend = FakeBackend::new().with_cluster("prod", &["10.0.0.1", "10.0.0.2"]);
    let calls = backend.log().clone();
    let manager = Manager::new(Arc::new(backend));

    manager.start_cluster("prod", &options()).await.unwrap().into_result().unwrap();
    manager.stop_cluster("prod", &options()).await.unwrap().into_result().unwrap();
    manager.restart_cluster("prod", &options()).await.unwrap().into_result().unwrap();
    manager
        .enable_cluster("prod", &options(), true)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let operator_calls: Vec<String> = calls
        .entries()
        .into_iter()
        .filter(|e| !e.starts_with("exec:"))
        .collect();
    assert_eq!(
        operator_calls,
        vec!["start:prod", "stop:prod", "restart:prod", "enable:prod:true"]
    );
    // every operation connects to both hosts first
    assert_eq!(calls.count("exec:10.0.0.1"), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_host_fails_operation() {
    let backend = FakeBackend::new()
        .with_cluster("prod", &["h1", "h2", "h3"])
        .unreachable("h2");
    let calls = backend.log().clone();
    let manager = Manager::new(Arc::new(backend));

    let report = manager.start_cluster("prod", &options()).await.unwrap();

    assert_eq!(report.status(), OperationStatus::Failed);
    assert_eq!(calls.count("start:prod"), 0);
    // the other hosts still connected
    assert_eq!(calls.count("exec:h1"), 1);
    assert_eq!(calls.count("exec:h3"), 1);

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, ManagerError::OperationFailed { .. }));
    assert_eq!(
        err.to_string(),
        "start cluster `prod` failed: execution failed: connect to h2 refused"
    );
}

#[tokio::test]
async fn test_operation_events_bracket_task_events() {
    let events = Arc::new(EventBus::new());
    let handler = Arc::new(RecordingHandler::new());
    events.register(handler.clone()).await;
    let manager = Manager::new(Arc::new(FakeBackend::new().with_cluster("prod", &["h1"])))
        .with_event_bus(events);

    let report = manager.stop_cluster("prod", &options()).await.unwrap();

    let recorded = handler.events().await;
    assert!(matches!(
        recorded.first(),
        Some(Event::OperationStarted { kind: OperationKind::Stop, .. })
    ));
    match recorded.last() {
        Some(Event::OperationFinished {
            operation_id,
            success,
            ..
        }) => {
            assert!(*success);
            assert_eq!(*operation_id, report.operation_id);
        }
        other => panic!("unexpected last event: {:?}", other),
    }
    assert!(handler.begun().await.contains(&"StopCluster".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_launched_operation_is_tracked() {
    let backend = FakeBackend::new()
        .with_cluster("prod", &["h1", "h2"])
        .with_connect_delay(Duration::from_millis(200));
    let manager = Manager::new(Arc::new(backend));

    let handle = manager
        .launch(OperationKind::Restart, "prod", &options())
        .await
        .unwrap();
    let id = handle.id();

    assert_eq!(handle.status().await, Some(OperationStatus::Running));
    let listed = manager.operations().list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].operation, OperationKind::Restart);

    let report = handle.wait().await.unwrap();

    assert!(report.is_success());
    assert_eq!(
        manager.operations().status(&id).await,
        Some(OperationStatus::Succeeded)
    );
    let stored = manager.operations().report(&id).await.unwrap();
    assert_eq!(stored.steps, report.steps);
    assert_eq!(
        manager.operations().progress(&id).await.unwrap().percent,
        100
    );

    assert!(manager.operations().remove(&id).await);
    assert!(manager.operations().is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_launched_operations_keep_separate_state() {
    let backend = FakeBackend::new()
        .with_cluster("prod", &["h1"])
        .with_cluster("staging", &["s1"])
        .with_connect_delay(Duration::from_millis(20));
    let manager = Manager::new(Arc::new(backend));

    let first = manager
        .launch(OperationKind::Start, "prod", &options())
        .await
        .unwrap();
    let second = manager
        .launch(OperationKind::Stop, "staging", &options())
        .await
        .unwrap();
    assert_ne!(first.id(), second.id());

    let first = first.wait().await.unwrap();
    let second = second.wait().await.unwrap();

    assert_eq!(first.cluster.as_str(), "prod");
    assert_eq!(second.cluster.as_str(), "staging");
    assert!(first.steps.contains(&"- StartCluster ... Done".to_string()));
    assert!(second.steps.contains(&"- StopCluster ... Done".to_string()));
    assert_eq!(manager.operations().len().await, 2);
}

#[tokio::test]
async fn test_launch_rejects_unknown_cluster() {
    let manager = Manager::new(Arc::new(FakeBackend::new()));

    let err = manager
        .launch(OperationKind::Start, "ghost", &options())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ManagerError::ClusterNotFound(_)));
    assert!(manager.operations().is_empty().await);
}

#[tokio::test]
async fn test_extension_tasks_run_after_operator() {
    let backend = FakeBackend::new().with_cluster("prod", &["h1"]);
    let calls = backend.log().clone();
    let manager = Manager::new(Arc::new(backend));

    let report = manager
        .start_cluster_with("prod", &options(), |b| {
            b.task(ScriptedTask::new("wait-ready").with_log(calls.clone()))
        })
        .await
        .unwrap();

    assert!(report.is_success());
    let entries = calls.entries();
    let start = entries.iter().position(|e| e == "start:prod").unwrap();
    let ready = entries.iter().position(|e| e == "exec:wait-ready").unwrap();
    assert!(start < ready);
}

//! Rehearsal plan integration tests.
//!
//! Plans are parsed from YAML, built into pipelines and run end to end.

use convoy::testing::CallLog;
use convoy::{ConfigError, ExecEnv, Task, YamlLoader};
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

const START_PLAN: &str = r#"
name: rehearse-start
rollback_on_failure: true
steps:
  - name: Download components
    type: step
    delay_ms: 10
  - name: Start instances
    type: parallel
    hosts:
      - 10.0.0.1
      - host: 10.0.0.2
        delay_ms: 30
      - 10.0.0.3
  - name: StartCluster
    type: func
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_plan_runs_end_to_end() {
    let plan = YamlLoader::parse_plan(START_PLAN).unwrap();
    let log = CallLog::new();
    let pipeline = plan.build_with_log(log.clone());
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();

    assert_eq!(plan.leaf_count(), 5);
    assert_eq!(log.executed().len(), 5);
    assert_eq!(log.executed()[0], "Download components");
    assert_eq!(log.executed()[4], "StartCluster");

    let snapshot = pipeline.compute_progress();
    assert_eq!(snapshot.percent, 100);
    assert_eq!(
        snapshot.lines,
        vec![
            "Download components ... 100%",
            "Start instances",
            "10.0.0.1 ... 100%",
            "10.0.0.2 ... 100%",
            "10.0.0.3 ... 100%",
        ]
    );
    assert_eq!(pipeline.step_log().last().unwrap(), "- StartCluster ... Done");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_host_stops_plan_and_rolls_back() {
    let yaml = r#"
name: failing
rollback_on_failure: true
steps:
  - name: prepare
    type: step
  - name: hosts
    type: parallel
    hosts:
      - a
      - host: b
        fail: timeout
  - name: finish
    type: step
"#;
    let plan = YamlLoader::parse_plan(yaml).unwrap();
    let log = CallLog::new();
    let pipeline = plan.build_with_log(log.clone());
    let mut env = ExecEnv::default();

    let err = pipeline.execute(&mut env).await.unwrap_err();
    assert!(err.to_string().contains("timeout"));
    assert_eq!(log.count("exec:finish"), 0);
    assert!(plan.rollback_on_failure);

    pipeline.rollback(&mut env).await.unwrap();

    let rolled = log.rolled_back();
    assert_eq!(rolled[0], "finish");
    let hosts: HashSet<&str> = rolled[1..3].iter().map(String::as_str).collect();
    assert_eq!(hosts, HashSet::from(["a", "b"]));
    assert_eq!(rolled[3], "prepare");
}

#[tokio::test]
async fn test_plan_ignore_error_keeps_going() {
    let yaml = r#"
name: tolerant
ignore_error: true
hide_detail_display: true
steps:
  - name: flaky
    type: step
    fail: transient
  - name: steady
    type: step
"#;
    let plan = YamlLoader::parse_plan(yaml).unwrap();
    let log = CallLog::new();
    let pipeline = plan.build_with_log(log.clone());
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();

    assert_eq!(log.executed(), vec!["flaky", "steady"]);
    assert_eq!(pipeline.step_log(), vec!["- steady ... Done"]);
    assert_eq!(pipeline.completed_steps(), vec!["- steady ... Done"]);
    assert_eq!(pipeline.progress(), 100);
}

#[tokio::test]
async fn test_unsupported_rollback_in_plan() {
    let yaml = r#"
name: irreversible
steps:
  - name: wipe
    type: step
    rollback: unsupported
  - name: report
    type: step
"#;
    let plan = YamlLoader::parse_plan(yaml).unwrap();
    let log = CallLog::new();
    let pipeline = plan.build_with_log(log.clone());
    let mut env = ExecEnv::default();

    pipeline.execute(&mut env).await.unwrap();
    let err = pipeline.rollback(&mut env).await.unwrap_err();

    assert!(err.is_rollback_unsupported());
    assert_eq!(log.rolled_back(), vec!["report", "wipe"]);
}

#[test]
fn test_load_plan_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(START_PLAN.as_bytes()).unwrap();

    let plan = YamlLoader::load_plan(file.path()).unwrap();

    assert_eq!(plan.name, "rehearse-start");
    assert_eq!(plan.steps.len(), 3);
}

#[test]
fn test_invalid_plan_file_reports_path() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"name: broken\nsteps: [").unwrap();

    let err = YamlLoader::load_plan(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::YamlFileError { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn test_duplicate_hosts_rejected() {
    let yaml = r#"
name: dup
steps:
  - name: hosts
    type: parallel
    hosts: [a, a]
"#;

    let err = YamlLoader::parse_plan(yaml).unwrap_err();

    assert!(matches!(err, ConfigError::InvalidConfig(_)));
}

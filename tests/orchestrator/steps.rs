use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use dojo_models::{
    config::OrchestratorConfig,
    orchestrator::{AgentRecord, CrytonClient, OrchestratorPort, PollPolicy},
    templates::{FindData, StepBuilder},
};

use crate::fake_cryton::FakeCryton;

fn agent() -> AgentRecord {
    AgentRecord {
        label: "dojo-agent-1".to_string(),
        worker_id: 3,
        plan_id: 7,
        run_id: 11,
        stage_id: 9,
        stage_execution_id: 13,
    }
}

fn client_for(api_root: &str, poll: PollPolicy) -> CrytonClient {
    CrytonClient::new(&OrchestratorConfig {
        api_root: api_root.to_string(),
        ..Default::default()
    })
    .expect("client should build")
    .with_poll_policy(poll)
}

const REPORT: &str = r#"{
    "id": 34,
    "state": "FINISHED",
    "result": "OK",
    "output": "/home/developer/\n/home/developer/.bash_logout\n/home/developer/.bashrc",
    "serialized_output": {},
    "start_time": "2026-10-16T10:00:00.125000Z",
    "finish_time": "2026-10-16T10:00:04.900000Z"
}"#;

#[tokio::test]
async fn step_is_polled_until_finished_then_reported() {
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);
    let cryton = FakeCryton::spawn(move |method, target| match (method, target) {
        ("POST", "/api/steps/") => (201, r#"{"id": 21}"#.to_string()),
        ("POST", "/api/steps/21/execute/") => (200, r#"{"execution_id": 34}"#.to_string()),
        ("GET", "/api/step_executions/34/") => {
            let state = if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                "RUNNING"
            } else {
                "FINISHED"
            };
            (200, format!(r#"{{"id": 34, "state": "{}"}}"#, state))
        }
        ("GET", "/api/step_executions/34/report/") => (200, REPORT.to_string()),
        _ => (404, "{}".to_string()),
    })
    .await;
    let client = client_for(&cryton.api_root, PollPolicy::fixed(Duration::from_millis(5)));

    let builder = FindData {
        session: 1,
        directory: "/home/developer".to_string(),
    };
    let report = client
        .submit_and_await(&builder.build_template(6), &agent())
        .await
        .expect("step should complete");

    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert_eq!(report.terminal_state(), Some("OK"));
    assert_eq!(report.elapsed(), Duration::from_secs(4));
    assert_eq!(
        cryton.hits(),
        vec![
            "POST /api/steps/",
            "POST /api/steps/21/execute/",
            "GET /api/step_executions/34/",
            "GET /api/step_executions/34/",
            "GET /api/step_executions/34/",
            "GET /api/step_executions/34/report/",
        ]
    );
}

#[tokio::test]
async fn poll_timeout_abandons_only_the_local_wait() {
    let cryton = FakeCryton::spawn(|method, target| match (method, target) {
        ("POST", "/api/steps/") => (201, r#"{"id": 21}"#.to_string()),
        ("POST", "/api/steps/21/execute/") => (200, r#"{"execution_id": 34}"#.to_string()),
        ("GET", "/api/step_executions/34/") => (200, r#"{"state": "RUNNING"}"#.to_string()),
        _ => (404, "{}".to_string()),
    })
    .await;
    let client = client_for(
        &cryton.api_root,
        PollPolicy::fixed(Duration::from_millis(5)).with_timeout(Duration::from_millis(40)),
    );

    let builder = FindData {
        session: 1,
        directory: "/tmp".to_string(),
    };
    let err = client
        .submit_and_await(&builder.build_template(7), &agent())
        .await
        .expect_err("wait should be abandoned");

    assert!(err.message.contains("keeps running"), "{err}");
    assert!(err.message.contains("RUNNING"));
    assert_eq!(cryton.count("GET /api/step_executions/34/report/"), 0);
}

#[tokio::test]
async fn rejected_step_upload_propagates_backend_error() {
    let cryton = FakeCryton::spawn(|_, _| (400, r#"{"detail": "invalid yaml"}"#.to_string())).await;
    let client = client_for(&cryton.api_root, PollPolicy::default());

    let builder = FindData {
        session: 1,
        directory: "/".to_string(),
    };
    let err = client
        .submit_and_await(&builder.build_template(8), &agent())
        .await
        .expect_err("upload must fail");

    assert_eq!(err.http_status, Some(400));
    assert!(err.endpoint.ends_with("/api/steps/"));
}

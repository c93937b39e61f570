use dojo_models::{
    config::OrchestratorConfig,
    orchestrator::{AgentRecord, CrytonClient, OrchestratorPort, WORKER_DESCRIPTION},
};

use crate::fake_cryton::{FakeCryton, provisioning_route};

fn client_for(api_root: &str) -> CrytonClient {
    CrytonClient::new(&OrchestratorConfig {
        api_root: api_root.to_string(),
        request_timeout_ms: 5_000,
        ..Default::default()
    })
    .expect("client should build")
}

#[tokio::test]
async fn provisioning_walks_worker_plan_and_run() {
    let cryton = FakeCryton::spawn(|method, target| {
        provisioning_route(method, target).unwrap_or((404, r#"{"detail": "no route"}"#.to_string()))
    })
    .await;
    let client = client_for(&cryton.api_root);

    let record = client
        .provision_agent_plan("dojo-agent-1")
        .await
        .expect("provisioning should succeed");

    assert_eq!(
        record,
        AgentRecord {
            label: "dojo-agent-1".to_string(),
            worker_id: 3,
            plan_id: 7,
            run_id: 11,
            stage_id: 9,
            stage_execution_id: 13,
        }
    );
    assert_eq!(
        cryton.hits(),
        vec![
            "POST /api/workers/",
            "POST /api/workers/3/healthcheck/",
            "POST /api/templates/",
            "POST /api/plans/",
            "GET /api/stages/",
            "POST /api/runs/",
            "GET /api/runs/11/report/",
            "POST /api/runs/11/execute/",
        ]
    );
}

#[tokio::test]
async fn existing_worker_is_looked_up_by_name() {
    let cryton = FakeCryton::spawn(|method, target| match (method, target) {
        ("POST", "/api/workers/") => (400, r#"{"name": ["worker with this name already exists."]}"#.to_string()),
        ("GET", "/api/workers/?name=dojo-agent-2") => (
            200,
            r#"[{"id": 4, "name": "someone-else"}, {"id": 8, "name": "dojo-agent-2"}]"#.to_string(),
        ),
        _ => (404, "{}".to_string()),
    })
    .await;
    let client = client_for(&cryton.api_root);

    let worker_id = client
        .register_or_reuse_worker("dojo-agent-2", WORKER_DESCRIPTION)
        .await
        .expect("existing worker should be reused");

    assert_eq!(worker_id, 8);
    assert_eq!(cryton.count("GET /api/workers/"), 1);
}

#[tokio::test]
async fn unhealthy_worker_stops_provisioning() {
    let cryton = FakeCryton::spawn(|method, target| match (method, target) {
        ("POST", "/api/workers/3/healthcheck/") => (200, r#"{"detail": "DOWN"}"#.to_string()),
        _ => provisioning_route(method, target).unwrap_or((404, "{}".to_string())),
    })
    .await;
    let client = client_for(&cryton.api_root);

    let err = client
        .provision_agent_plan("dojo-agent-1")
        .await
        .expect_err("unhealthy worker must fail");

    assert!(err.message.contains("not healthy"), "{err}");
    assert_eq!(cryton.count("POST /api/templates/"), 0);
}

#[tokio::test]
async fn run_execution_must_answer_ok() {
    let cryton = FakeCryton::spawn(|method, target| match (method, target) {
        ("POST", "/api/runs/11/execute/") => (500, r#"{"detail": "scheduler offline"}"#.to_string()),
        _ => provisioning_route(method, target).unwrap_or((404, "{}".to_string())),
    })
    .await;
    let client = client_for(&cryton.api_root);

    let err = client
        .provision_agent_plan("dojo-agent-1")
        .await
        .expect_err("non-200 execute must fail");

    assert_eq!(err.http_status, Some(500));
    assert!(err.endpoint.ends_with("/api/runs/11/execute/"));
    assert!(err.message.contains("scheduler offline"));
}

#[tokio::test]
async fn closed_port_is_reported_as_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let address = listener.local_addr().expect("local addr should exist");
    drop(listener);

    let client = client_for(&format!("http://{}/api/", address));
    let err = client
        .check_connection()
        .await
        .expect_err("nothing listens on the port");

    assert!(err.http_status.is_none());
    assert!(err.message.starts_with("request failed"));
}

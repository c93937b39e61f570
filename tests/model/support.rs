use std::{
    net::Ipv4Addr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use dojo_models::{
    environment::Environment,
    model::CompositeActionManager,
    orchestrator::{AgentRecord, OrchestratorError, OrchestratorPort},
    templates::{CompletionReport, StepTemplate},
    types::{ActionRequest, Authorization, Session},
};

pub const ATTACKER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);

/// Orchestrator stand-in answering every step with the next queued report.
#[derive(Default)]
pub struct ScriptedOrchestrator {
    pub provisioned: AtomicUsize,
    pub submitted: Mutex<Vec<(String, StepTemplate)>>,
    reports: Mutex<Vec<Result<CompletionReport, OrchestratorError>>>,
}

impl ScriptedOrchestrator {
    pub fn answering(reports: Vec<Result<CompletionReport, OrchestratorError>>) -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(reports.into_iter().rev().collect()),
            ..Default::default()
        })
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.submitted
            .lock()
            .expect("submitted lock")
            .iter()
            .map(|(_, template)| template.name.clone())
            .collect()
    }

    pub fn last_template(&self) -> StepTemplate {
        self.submitted
            .lock()
            .expect("submitted lock")
            .last()
            .map(|(_, template)| template.clone())
            .expect("a step should have been submitted")
    }
}

#[async_trait]
impl OrchestratorPort for ScriptedOrchestrator {
    async fn check_connection(&self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn register_or_reuse_worker(
        &self,
        _name: &str,
        _description: &str,
    ) -> Result<u64, OrchestratorError> {
        Ok(1)
    }

    async fn health_check(&self, _worker_id: u64) -> Result<bool, OrchestratorError> {
        Ok(true)
    }

    async fn provision_agent_plan(&self, agent_label: &str) -> Result<AgentRecord, OrchestratorError> {
        let id = self.provisioned.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        Ok(AgentRecord {
            label: agent_label.to_string(),
            worker_id: id,
            plan_id: 10 + id,
            run_id: 20 + id,
            stage_id: 30 + id,
            stage_execution_id: 40 + id,
        })
    }

    async fn submit_and_await(
        &self,
        template: &StepTemplate,
        agent: &AgentRecord,
    ) -> Result<CompletionReport, OrchestratorError> {
        self.submitted
            .lock()
            .expect("submitted lock")
            .push((agent.label.clone(), template.clone()));
        self.reports
            .lock()
            .expect("reports lock")
            .pop()
            .unwrap_or_else(|| Ok(CompletionReport::default()))
    }
}

pub fn report(result: &str, output: &str) -> CompletionReport {
    CompletionReport {
        result: Some(result.to_string()),
        state: Some("FINISHED".to_string()),
        output: output.to_string(),
        start_time: Some("2026-10-16T08:00:00Z".to_string()),
        finish_time: Some("2026-10-16T08:00:03Z".to_string()),
        ..Default::default()
    }
}

/// Request from the scripted attacker with `parameters` bound.
pub fn request(
    environment: &Environment,
    action_id: &str,
    dst_ip: Ipv4Addr,
    dst_service: &str,
    parameters: &[(&str, &str)],
) -> ActionRequest {
    let mut action = environment
        .action(action_id)
        .unwrap_or_else(|err| panic!("{action_id} should be registered: {err}"));
    for (name, value) in parameters {
        action
            .bind(name, *value)
            .unwrap_or_else(|err| panic!("{name} should bind: {err}"));
    }

    ActionRequest {
        id: environment.next_request_id(),
        src_node: "attacker_node".to_string(),
        src_service: "scripted_attacker".to_string(),
        src_ip: Some(ATTACKER_IP),
        dst_ip,
        dst_service: dst_service.to_string(),
        action,
        session: None,
        auth: None,
        platform: environment.platform().clone(),
    }
}

pub fn session(id: u64) -> Option<Session> {
    Some(Session::new("scripted_attacker", id))
}

pub fn with_context(
    request: ActionRequest,
    session: Option<Session>,
    auth: Option<Authorization>,
) -> ActionRequest {
    request.with_session(session).with_auth(auth)
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::{
    config::OrchestratorConfig,
    orchestrator::{
        error::{OrchestratorError, malformed, rejected, unreachable},
        poll::PollPolicy,
        ports::OrchestratorPort,
        types::{
            AgentRecord, CreatedObject, HealthCheck, PlanTemplate, STEP_FINISHED_STATE,
            StepExecutionState, StepStarted, WORKER_DESCRIPTION, WorkerSummary,
            first_stage_execution_id,
        },
    },
    templates::{CompletionReport, StepTemplate},
};

/// HTTP client for the Cryton REST API. Stateless apart from the endpoint,
/// so one instance is shared by every agent.
#[derive(Clone)]
pub struct CrytonClient {
    client: Client,
    api_root: String,
    poll: PollPolicy,
}

impl CrytonClient {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| unreachable(config.api_root.clone(), err))?;

        let mut api_root = config.api_root.clone();
        if !api_root.ends_with('/') {
            api_root.push('/');
        }

        Ok(Self {
            client,
            api_root,
            poll: PollPolicy::from_config(config),
        })
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    async fn read_json<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, OrchestratorError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| unreachable(endpoint, err))?;
        if !status.is_success() {
            return Err(rejected(endpoint, status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|err| malformed(endpoint, format!("unexpected response body: {}", err)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, OrchestratorError> {
        let endpoint = self.endpoint(path);
        tracing::debug!(target: "orchestrator", endpoint = %endpoint, "cryton_get");

        let mut request = self.client.get(&endpoint);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request
            .send()
            .await
            .map_err(|err| unreachable(endpoint.as_str(), err))?;
        Self::read_json(&endpoint, response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, OrchestratorError> {
        let endpoint = self.endpoint(path);
        tracing::debug!(target: "orchestrator", endpoint = %endpoint, "cryton_post");

        let response = self
            .client
            .post(&endpoint)
            .form(form)
            .send()
            .await
            .map_err(|err| unreachable(endpoint.as_str(), err))?;
        Self::read_json(&endpoint, response).await
    }

    async fn post_yaml_file<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &[(&str, String)],
        file_name: &str,
        yaml: String,
    ) -> Result<T, OrchestratorError> {
        let endpoint = self.endpoint(path);
        tracing::debug!(
            target: "orchestrator",
            endpoint = %endpoint,
            file_name = file_name,
            "cryton_upload"
        );

        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value.clone());
        }
        let part = Part::text(yaml)
            .file_name(file_name.to_string())
            .mime_str("application/x-yaml")
            .map_err(|err| malformed(endpoint.as_str(), err.to_string()))?;
        form = form.part("file", part);

        let response = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| unreachable(endpoint.as_str(), err))?;
        Self::read_json(&endpoint, response).await
    }

    async fn create_template(&self, template: &PlanTemplate) -> Result<u64, OrchestratorError> {
        let yaml = serde_yaml::to_string(template).map_err(|err| {
            malformed(self.endpoint("templates/"), format!("template yaml: {}", err))
        })?;
        let created: CreatedObject = self
            .post_yaml_file("templates/", &[], "template.yaml", yaml)
            .await?;
        Ok(created.id)
    }

    async fn create_plan(&self, template_id: u64) -> Result<u64, OrchestratorError> {
        let created: CreatedObject = self
            .post_form("plans/", &[("template_id", template_id.to_string())])
            .await?;
        Ok(created.id)
    }

    async fn first_stage_id(&self, plan_id: u64) -> Result<u64, OrchestratorError> {
        let plan_id = plan_id.to_string();
        let stages: Vec<CreatedObject> = self
            .get_json("stages/", &[("plan_model_id", plan_id.as_str())])
            .await?;
        stages
            .first()
            .map(|stage| stage.id)
            .ok_or_else(|| malformed(self.endpoint("stages/"), format!("plan {} has no stage", plan_id)))
    }

    async fn create_run(&self, plan_id: u64, worker_id: u64) -> Result<u64, OrchestratorError> {
        let created: CreatedObject = self
            .post_form(
                "runs/",
                &[
                    ("plan_id", plan_id.to_string()),
                    ("worker_ids", worker_id.to_string()),
                ],
            )
            .await?;
        Ok(created.id)
    }

    async fn stage_execution_id(&self, run_id: u64) -> Result<u64, OrchestratorError> {
        let path = format!("runs/{}/report/", run_id);
        let report: Value = self.get_json(&path, &[]).await?;
        first_stage_execution_id(&report)
            .ok_or_else(|| malformed(self.endpoint(&path), "run report has no stage execution"))
    }

    async fn execute_run(&self, run_id: u64) -> Result<(), OrchestratorError> {
        let endpoint = self.endpoint(&format!("runs/{}/execute/", run_id));
        let response = self
            .client
            .post(&endpoint)
            .form(&[("run_id", run_id.to_string())])
            .send()
            .await
            .map_err(|err| unreachable(endpoint.as_str(), err))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(rejected(endpoint, status.as_u16(), &body));
        }
        Ok(())
    }

    async fn create_step(
        &self,
        template: &StepTemplate,
        stage_id: u64,
    ) -> Result<u64, OrchestratorError> {
        let yaml = serde_yaml::to_string(template)
            .map_err(|err| malformed(self.endpoint("steps/"), format!("step yaml: {}", err)))?;
        let created: CreatedObject = self
            .post_yaml_file(
                "steps/",
                &[("stage_id", stage_id.to_string())],
                "step.yaml",
                yaml,
            )
            .await?;
        Ok(created.id)
    }

    async fn execute_step(
        &self,
        step_id: u64,
        stage_execution_id: u64,
    ) -> Result<u64, OrchestratorError> {
        let started: StepStarted = self
            .post_form(
                &format!("steps/{}/execute/", step_id),
                &[("stage_execution_id", stage_execution_id.to_string())],
            )
            .await?;
        Ok(started.execution_id)
    }

    async fn wait_for_step(&self, step_execution_id: u64) -> Result<(), OrchestratorError> {
        let path = format!("step_executions/{}/", step_execution_id);
        let started = Instant::now();
        let mut delay = self.poll.first_delay();
        let mut polls: u64 = 0;

        loop {
            let execution: StepExecutionState = self.get_json(&path, &[]).await?;
            polls += 1;
            if execution.state == STEP_FINISHED_STATE {
                tracing::debug!(
                    target: "orchestrator",
                    step_execution_id = step_execution_id,
                    polls = polls,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "step_execution_finished"
                );
                return Ok(());
            }

            if self.poll.expired(started.elapsed()) {
                tracing::warn!(
                    target: "orchestrator",
                    step_execution_id = step_execution_id,
                    state = %execution.state,
                    polls = polls,
                    "step_execution_wait_abandoned"
                );
                return Err(malformed(
                    self.endpoint(&path),
                    format!(
                        "stopped waiting in state '{}' after {} ms; the step keeps running on the backend",
                        execution.state,
                        started.elapsed().as_millis()
                    ),
                ));
            }

            tokio::time::sleep(delay).await;
            delay = self.poll.next_delay(delay);
        }
    }

    async fn step_report(
        &self,
        step_execution_id: u64,
    ) -> Result<CompletionReport, OrchestratorError> {
        self.get_json(&format!("step_executions/{}/report/", step_execution_id), &[])
            .await
    }
}

#[async_trait]
impl OrchestratorPort for CrytonClient {
    async fn check_connection(&self) -> Result<(), OrchestratorError> {
        let response = self
            .client
            .get(&self.api_root)
            .send()
            .await
            .map_err(|err| unreachable(self.api_root.as_str(), err))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(rejected(self.api_root.as_str(), status.as_u16(), ""));
        }
        tracing::info!(target: "orchestrator", api_root = %self.api_root, "cryton_reachable");
        Ok(())
    }

    async fn register_or_reuse_worker(
        &self,
        name: &str,
        description: &str,
    ) -> Result<u64, OrchestratorError> {
        let endpoint = self.endpoint("workers/");
        let response = self
            .client
            .post(&endpoint)
            .form(&[("name", name), ("description", description)])
            .send()
            .await
            .map_err(|err| unreachable(endpoint.as_str(), err))?;

        if response.status() == StatusCode::CREATED {
            let created: CreatedObject = Self::read_json(&endpoint, response).await?;
            tracing::info!(
                target: "orchestrator",
                worker_id = created.id,
                worker_name = name,
                "worker_created"
            );
            return Ok(created.id);
        }

        let workers: Vec<WorkerSummary> = self.get_json("workers/", &[("name", name)]).await?;
        match workers.into_iter().find(|worker| worker.name == name) {
            Some(worker) => {
                tracing::info!(
                    target: "orchestrator",
                    worker_id = worker.id,
                    worker_name = name,
                    "worker_reused"
                );
                Ok(worker.id)
            }
            None => Err(malformed(
                endpoint,
                format!("unable to create or find worker '{}'", name),
            )),
        }
    }

    async fn health_check(&self, worker_id: u64) -> Result<bool, OrchestratorError> {
        let health: HealthCheck = self
            .post_form(&format!("workers/{}/healthcheck/", worker_id), &[])
            .await?;
        Ok(health.is_up())
    }

    async fn provision_agent_plan(
        &self,
        agent_label: &str,
    ) -> Result<AgentRecord, OrchestratorError> {
        let worker_id = self
            .register_or_reuse_worker(agent_label, WORKER_DESCRIPTION)
            .await?;
        if !self.health_check(worker_id).await? {
            return Err(malformed(
                self.endpoint(&format!("workers/{}/healthcheck/", worker_id)),
                format!("worker '{}' is not healthy", agent_label),
            ));
        }

        let template_id = self
            .create_template(&PlanTemplate::dynamic_for(agent_label))
            .await?;
        let plan_id = self.create_plan(template_id).await?;
        let stage_id = self.first_stage_id(plan_id).await?;
        let run_id = self.create_run(plan_id, worker_id).await?;
        let stage_execution_id = self.stage_execution_id(run_id).await?;
        self.execute_run(run_id).await?;

        tracing::info!(
            target: "orchestrator",
            agent_label = agent_label,
            worker_id = worker_id,
            plan_id = plan_id,
            run_id = run_id,
            stage_id = stage_id,
            stage_execution_id = stage_execution_id,
            "agent_provisioned"
        );

        Ok(AgentRecord {
            label: agent_label.to_string(),
            worker_id,
            plan_id,
            run_id,
            stage_id,
            stage_execution_id,
        })
    }

    async fn submit_and_await(
        &self,
        template: &StepTemplate,
        agent: &AgentRecord,
    ) -> Result<CompletionReport, OrchestratorError> {
        let step_id = self.create_step(template, agent.stage_id).await?;
        let step_execution_id = self
            .execute_step(step_id, agent.stage_execution_id)
            .await?;
        tracing::info!(
            target: "orchestrator",
            agent_label = %agent.label,
            step_name = %template.name,
            step_id = step_id,
            step_execution_id = step_execution_id,
            "step_submitted"
        );

        self.wait_for_step(step_execution_id).await?;
        self.step_report(step_execution_id).await
    }
}

//! Scripted attacker: drives an [`Environment`] one action at a time and
//! aborts as soon as an action ends outside its accepted statuses.

use std::{collections::BTreeMap, fs, io::Write, net::Ipv4Addr, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::{
    actions::Exploit,
    config::ScenarioConfig,
    environment::Environment,
    model::{CompositeActionManager, ExploitStore},
    types::{ActionRequest, Authorization, Content, Response, Session, Status},
};

/// One `execute_action` invocation.
#[derive(Debug, Clone)]
pub struct ActionCall {
    pub action_id: String,
    pub target: Ipv4Addr,
    pub ok_statuses: Vec<Status>,
    pub parameters: BTreeMap<String, String>,
    pub service: String,
    pub session: Option<Session>,
    pub auth: Option<Authorization>,
    pub exploit: Option<Exploit>,
}

impl ActionCall {
    pub fn new(action_id: impl Into<String>, target: Ipv4Addr, ok_statuses: Vec<Status>) -> Self {
        Self {
            action_id: action_id.into(),
            target,
            ok_statuses,
            parameters: BTreeMap::new(),
            service: String::new(),
            session: None,
            auth: None,
            exploit: None,
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn auth(mut self, auth: Option<Authorization>) -> Self {
        self.auth = auth;
        self
    }

    pub fn exploit(mut self, exploit: Option<Exploit>) -> Self {
        self.exploit = exploit;
        self
    }
}

fn default_accept() -> Vec<String> {
    vec!["service/success".to_string()]
}

/// Step of a scenario file. Session and authorization are carried over from
/// earlier responses, so steps only name what changes.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    pub action: String,
    pub target: Ipv4Addr,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Parameter that receives the previous response's text content.
    #[serde(default)]
    pub previous_content_as: Option<String>,
    #[serde(default = "default_accept")]
    pub accept: Vec<String>,
    #[serde(default)]
    pub exploit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub name: String,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        json5::from_str(&content)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }
}

pub struct Scenario<E: ExploitStore> {
    environment: Environment,
    attacker: ScenarioConfig,
    exploits: E,
}

impl<E: ExploitStore> Scenario<E> {
    pub fn new(environment: Environment, attacker: ScenarioConfig, exploits: E) -> Self {
        Self {
            environment,
            attacker,
            exploits,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Runs one action as the attacker and fails unless its status is accepted.
    pub async fn execute_action(&self, call: ActionCall) -> Result<Response> {
        let mut action = self
            .environment
            .action(&call.action_id)
            .with_context(|| format!("cannot prepare '{}'", call.action_id))?;
        for (name, value) in &call.parameters {
            action
                .bind(name, value.as_str())
                .with_context(|| format!("cannot bind '{}' of '{}'", name, call.action_id))?;
        }

        let request = ActionRequest {
            id: self.environment.next_request_id(),
            src_node: self.attacker.attacker_node.clone(),
            src_service: self.attacker.attacker_service.clone(),
            src_ip: self.attacker.attacker_ip,
            dst_ip: call.target,
            dst_service: call.service,
            action: action.with_exploit(call.exploit),
            session: call.session,
            auth: call.auth,
            platform: self.environment.platform().clone(),
        };
        let outcome = self
            .environment
            .execute(request)
            .await
            .with_context(|| format!("'{}' could not be executed", call.action_id))?;

        let status = outcome.response.status;
        if !call.ok_statuses.contains(&status) {
            let accepted: Vec<String> = call.ok_statuses.iter().map(Status::to_string).collect();
            bail!(
                "'{}' against {} ended with {} (accepted: {}); content: {}",
                call.action_id,
                call.target,
                status,
                accepted.join(", "),
                describe_content(&outcome.response.content)
            );
        }
        Ok(outcome.response)
    }

    /// Executes every step in order, reporting each response to `out`.
    pub async fn run(&self, file: &ScenarioFile, out: &mut impl Write) -> Result<Vec<Response>> {
        let mut session: Option<Session> = None;
        let mut auth: Option<Authorization> = None;
        let mut previous_content = Content::Empty;
        let mut responses = Vec::with_capacity(file.steps.len());

        if !file.name.is_empty() {
            writeln!(out, "Scenario: {}", file.name)?;
        }

        for (index, step) in file.steps.iter().enumerate() {
            let ok_statuses = step
                .accept
                .iter()
                .map(|text| text.parse::<Status>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("step {} has an invalid accept list", index + 1))?;
            let exploit = match &step.exploit {
                Some(id) => Some(
                    self.exploits
                        .get(id)
                        .ok_or_else(|| anyhow!("step {} names unknown exploit '{}'", index + 1, id))?,
                ),
                None => None,
            };

            let mut call = ActionCall::new(&step.action, step.target, ok_statuses)
                .service(&step.service)
                .session(session.clone())
                .auth(auth.clone())
                .exploit(exploit);
            call.parameters = step.parameters.clone();
            if let Some(name) = &step.previous_content_as {
                let text = previous_content.as_text().ok_or_else(|| {
                    anyhow!(
                        "step {} needs text content from the previous response",
                        index + 1
                    )
                })?;
                call.parameters.insert(name.clone(), text.trim().to_string());
            }

            writeln!(out, "\n{}\n{}", "-".repeat(50), step.action)?;
            writeln!(out, "Parameters: {:?}", call.parameters)?;
            let response = self.execute_action(call).await?;
            writeln!(out, "Status: {}", response.status)?;
            writeln!(out, "Output:\n{}", describe_content(&response.content))?;

            if response.session.is_some() {
                session = response.session.clone();
            }
            if response.auth.is_some() {
                auth = response.auth.clone();
            }
            previous_content = response.content.clone();
            responses.push(response);
        }

        writeln!(out, "\n{}\nScenario finished!", "-".repeat(50))?;
        Ok(responses)
    }

    /// Lists the offered actions with their descriptions and parameter names.
    pub fn display_actions(&self, out: &mut impl Write) -> Result<()> {
        let actions = self.environment.actions();
        let id_width = actions.iter().map(|action| action.id.len()).max().unwrap_or(0);

        writeln!(out, "Available actions ({}):", self.environment.platform())?;
        for action in &actions {
            let parameters: Vec<&str> = action
                .parameters
                .iter()
                .map(|parameter| parameter.name.as_str())
                .collect();
            writeln!(
                out,
                "{:>width$}: {} {:?}",
                action.id,
                action.description,
                parameters,
                width = id_width
            )?;
        }
        Ok(())
    }
}

fn describe_content(content: &Content) -> String {
    match content {
        Content::Empty => String::new(),
        Content::Text(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

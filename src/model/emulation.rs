use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    actions::{
        ActionDescription, ActionKind, ActionParameter, ActionParameterKind, ExecutionEnvironment,
        ParameterDomain,
    },
    agents::{ActorKey, AgentRegistry},
    model::{
        ActionOutcome, current_session, ensure_bound,
        error::{ModelError, invalid_request},
        intent_key, parameter,
        ports::{BehavioralModel, CompositeActionManager},
        unknown_intent,
    },
    net::ServiceFilter,
    orchestrator::OrchestratorPort,
    templates::{
        CompletionReport, ExecuteCommand, ExfiltrateData, ExploitServer, ExploitedService,
        FindData, FindServices, ScanNetwork, SessionListener, StepBuilder, StepExecution,
        SuccessSentinels, UpdateRouting, UpgradeSession,
    },
    types::{ActionRequest, Content, Node, Response, Session, Status, StatusOrigin, StatusValue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrytonIntent {
    WaitForSession,
    UpgradeSession,
    UpdateRouting,
    ScanNetwork,
    FindServices,
    ExploitServer,
    FindData,
    ExecuteCommand,
    ExfiltrateData,
}

impl CrytonIntent {
    const ALL: [CrytonIntent; 9] = [
        CrytonIntent::WaitForSession,
        CrytonIntent::UpgradeSession,
        CrytonIntent::UpdateRouting,
        CrytonIntent::ScanNetwork,
        CrytonIntent::FindServices,
        CrytonIntent::ExploitServer,
        CrytonIntent::FindData,
        CrytonIntent::ExecuteCommand,
        CrytonIntent::ExfiltrateData,
    ];

    fn key(&self) -> &'static str {
        match self {
            CrytonIntent::WaitForSession => "wait_for_session",
            CrytonIntent::UpgradeSession => "upgrade_session",
            CrytonIntent::UpdateRouting => "update_routing",
            CrytonIntent::ScanNetwork => "scan_network",
            CrytonIntent::FindServices => "find_services",
            CrytonIntent::ExploitServer => "exploit_server",
            CrytonIntent::FindData => "find_data",
            CrytonIntent::ExecuteCommand => "execute_command",
            CrytonIntent::ExfiltrateData => "exfiltrate_data",
        }
    }

    fn description(&self, namespace: &str, platform: &ExecutionEnvironment) -> ActionDescription {
        let to_host = || ActionParameter::any(ActionParameterKind::Address, "to_host");
        let to_network = || ActionParameter::any(ActionParameterKind::Network, "to_network");
        let (description, parameters) = match self {
            CrytonIntent::WaitForSession => ("Wait for the session to establish", vec![]),
            CrytonIntent::UpgradeSession => ("Upgrade the shell session to meterpreter", vec![]),
            CrytonIntent::UpdateRouting => ("Update routing table", vec![]),
            CrytonIntent::ScanNetwork => ("Scan the target network", vec![to_network()]),
            CrytonIntent::FindServices => (
                "Scan the target for services",
                vec![
                    to_network(),
                    ActionParameter::any(ActionParameterKind::None, "services"),
                ],
            ),
            CrytonIntent::ExploitServer => (
                "Exploit the target service",
                vec![
                    to_host(),
                    ActionParameter::any(ActionParameterKind::None, "service")
                        .with_domain(ParameterDomain::options("ssh", &["ssh", "ftp"])),
                ],
            ),
            CrytonIntent::FindData => (
                "Show a tree-like structure of the desired directory",
                vec![
                    to_host(),
                    ActionParameter::any(ActionParameterKind::Path, "directory"),
                ],
            ),
            CrytonIntent::ExecuteCommand => (
                "Execute a command on a remote host",
                vec![
                    to_host(),
                    ActionParameter::any(ActionParameterKind::Command, "command"),
                ],
            ),
            CrytonIntent::ExfiltrateData => (
                "Get data from a file",
                vec![
                    to_host(),
                    ActionParameter::any(ActionParameterKind::Path, "data"),
                ],
            ),
        };

        ActionDescription::new(
            format!("{}:{}", namespace, self.key()),
            ActionKind::Direct,
            description,
            parameters,
            vec![platform.clone()],
        )
    }

    fn origin(&self) -> StatusOrigin {
        match self {
            CrytonIntent::UpdateRouting | CrytonIntent::ScanNetwork | CrytonIntent::FindServices => {
                StatusOrigin::Network
            }
            _ => StatusOrigin::Service,
        }
    }
}

struct StepResult {
    report: CompletionReport,
    success: bool,
    content: Content,
}

/// Dispatcher for the emulated environment: every intent becomes one step
/// on the acting service's Cryton agent.
pub struct CrytonModel {
    namespace: String,
    platform: ExecutionEnvironment,
    orchestrator: Arc<dyn OrchestratorPort>,
    agents: AgentRegistry,
    handlers: HashMap<String, CrytonIntent>,
    sentinels: Option<SuccessSentinels>,
}

impl CrytonModel {
    pub fn new(namespace: impl Into<String>, orchestrator: Arc<dyn OrchestratorPort>) -> Self {
        let namespace = namespace.into();
        let handlers = CrytonIntent::ALL
            .iter()
            .map(|intent| (intent.key().to_string(), *intent))
            .collect();

        Self {
            agents: AgentRegistry::new(Arc::clone(&orchestrator), namespace.clone()),
            namespace,
            platform: ExecutionEnvironment::emulation(),
            orchestrator,
            handlers,
            sentinels: None,
        }
    }

    /// Replaces every builder's accepted terminal states.
    pub fn with_success_sentinels(mut self, sentinels: Option<SuccessSentinels>) -> Self {
        self.sentinels = sentinels.filter(|sentinels| !sentinels.is_empty());
        self
    }

    async fn run_step(
        &self,
        request: &ActionRequest,
        builder: &dyn StepBuilder,
    ) -> Result<StepResult, ModelError> {
        let actor = ActorKey::new(request.src_node.clone(), request.src_service.clone());
        let agent = self.agents.get_or_create(&actor).await?;

        let mut execution = StepExecution::new(builder.build_template(request.id));
        let report = self
            .orchestrator
            .submit_and_await(execution.template(), &agent)
            .await?;
        execution.complete(report);
        let report = execution.report()?.clone();

        let sentinels = self
            .sentinels
            .clone()
            .unwrap_or_else(|| builder.default_sentinels());
        let success = builder.is_success(&report, &sentinels);
        let content = if success {
            builder.processed_output(&report.output)
        } else {
            Content::Text(report.output.clone())
        };

        tracing::info!(
            target: "model",
            request_id = request.id,
            intent = builder.intent(),
            agent_label = %agent.label,
            step_name = %execution.template().name,
            terminal_state = report.terminal_state().unwrap_or_default(),
            success = success,
            elapsed_ms = report.elapsed().as_millis() as u64,
            "step_completed"
        );

        Ok(StepResult {
            report,
            success,
            content,
        })
    }

    /// `session` is attached whatever the outcome; intents that open a
    /// session pass `None` when they fail.
    fn respond(
        request: &ActionRequest,
        origin: StatusOrigin,
        step: StepResult,
        session: Option<Session>,
    ) -> ActionOutcome {
        let value = if step.success {
            StatusValue::Success
        } else {
            StatusValue::Failure
        };
        let response = Response::to(request, Status::new(origin, value))
            .with_content(step.content)
            .with_session(session)
            .with_auth(request.auth.clone());
        ActionOutcome::new(step.report.elapsed(), response)
    }

    async fn handle(
        &self,
        intent: CrytonIntent,
        request: &ActionRequest,
    ) -> Result<ActionOutcome, ModelError> {
        let origin = intent.origin();
        match intent {
            CrytonIntent::WaitForSession => {
                let step = self.run_step(request, &SessionListener).await?;
                Ok(Self::respond_with_new_session(request, origin, step, None))
            }
            CrytonIntent::UpgradeSession => {
                let session = current_session(request)?.clone();
                let lhost = request.src_ip.ok_or_else(|| {
                    invalid_request("upgrading a session needs the attacker address as LHOST")
                })?;
                let builder = UpgradeSession {
                    session: session.id,
                    lhost: lhost.to_string(),
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond_with_new_session(request, origin, step, Some(session)))
            }
            CrytonIntent::UpdateRouting => {
                let builder = UpdateRouting {
                    session: current_session(request)?.id,
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
            CrytonIntent::ScanNetwork => {
                let builder = ScanNetwork {
                    target: parameter(request, "to_network")?.to_string(),
                    session: current_session(request)?.id,
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
            CrytonIntent::FindServices => {
                let filter = ServiceFilter::parse(parameter(request, "services")?)
                    .map_err(|err| invalid_request(err.to_string()))?;
                let builder = FindServices {
                    target: parameter(request, "to_network")?.to_string(),
                    ports: filter
                        .to_port_list()
                        .map_err(|err| invalid_request(err.to_string()))?,
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
            CrytonIntent::ExploitServer => {
                let service = ExploitedService::parse(parameter(request, "service")?)?;
                let builder = ExploitServer::new(parameter(request, "to_host")?, service);
                let step = self.run_step(request, &builder).await?;
                if service.opens_session() {
                    let parent = request.session.clone();
                    return Ok(Self::respond_with_new_session(request, origin, step, parent));
                }
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
            CrytonIntent::FindData => {
                let builder = FindData {
                    session: current_session(request)?.id,
                    directory: parameter(request, "directory")?.to_string(),
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
            CrytonIntent::ExecuteCommand => {
                let builder = ExecuteCommand {
                    session: current_session(request)?.id,
                    command: parameter(request, "command")?.to_string(),
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
            CrytonIntent::ExfiltrateData => {
                let builder = ExfiltrateData {
                    session: current_session(request)?.id,
                    file: parameter(request, "data")?.to_string(),
                };
                let step = self.run_step(request, &builder).await?;
                Ok(Self::respond(request, origin, step, request.session.clone()))
            }
        }
    }

    /// Success requires the report to name the session the step opened; the
    /// new session supersedes `parent`.
    fn respond_with_new_session(
        request: &ActionRequest,
        origin: StatusOrigin,
        mut step: StepResult,
        parent: Option<Session>,
    ) -> ActionOutcome {
        if !step.success {
            return Self::respond(request, origin, step, None);
        }

        let Some(session_id) = step.report.session_id() else {
            tracing::warn!(
                target: "model",
                request_id = request.id,
                intent = %request.action.id,
                "session_id_missing_in_report"
            );
            step.success = false;
            step.content = Content::Text(step.report.output.clone());
            return Self::respond(request, origin, step, None);
        };

        let mut session = Session::new(request.src_service.clone(), session_id)
            .with_path(request.src_ip, Some(request.dst_ip));
        if let Some(parent) = parent {
            session = session.with_parent(parent);
        }
        Self::respond(request, origin, step, Some(session))
    }

    async fn dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome, ModelError> {
        let intent = (request.action.namespace() == self.namespace)
            .then(|| self.handlers.get(&intent_key(request)).copied())
            .flatten();
        let Some(intent) = intent else {
            return Ok(unknown_intent(request, &self.namespace));
        };

        ensure_bound(request)?;
        tracing::debug!(
            target: "model",
            request_id = request.id,
            intent = intent.key(),
            dst_ip = %request.dst_ip,
            "action_received"
        );
        self.handle(intent, request).await
    }
}

#[async_trait]
impl BehavioralModel for CrytonModel {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn platform(&self) -> &ExecutionEnvironment {
        &self.platform
    }

    fn action_descriptions(&self) -> Vec<ActionDescription> {
        CrytonIntent::ALL
            .iter()
            .map(|intent| intent.description(&self.namespace, &self.platform))
            .collect()
    }

    async fn action_effect(
        &self,
        request: &ActionRequest,
        _node: Option<&Node>,
    ) -> Result<ActionOutcome, ModelError> {
        self.dispatch(request).await
    }

    async fn action_flow(
        &self,
        request: &ActionRequest,
        _cam: &dyn CompositeActionManager,
    ) -> Result<ActionOutcome, ModelError> {
        self.dispatch(request).await
    }
}

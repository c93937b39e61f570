use std::{collections::HashMap, net::Ipv4Addr, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use rand::Rng;
use uuid::Uuid;

use crate::{
    actions::{
        ActionDescription, ActionKind, ActionParameter, ActionParameterKind, ExecutionEnvironment,
    },
    config::SimulationConfig,
    model::{
        ActionOutcome, InMemoryExploitStore, SequentialSessionFactory, current_session,
        ensure_bound,
        error::{ModelError, invalid_request},
        intent_key, parameter,
        ports::{BehavioralModel, CompositeActionManager, ExploitStore, SessionFactory},
        unknown_intent,
    },
    net::{ScanTarget, ServiceFilter},
    types::{
        AccessLevel, ActionRequest, Authorization, Content, Credential, Node, NodeService,
        Response, ServiceFingerprint, Status, StatusOrigin, StatusValue,
    },
};

const NOMINAL_DURATION: Duration = Duration::from_millis(1);
const PHISHING_EXPLOIT: &str = "phishing_exploit";
const MISSING_FILE: &str = "File doesn't exist.";
const SCAN_CONCURRENCY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimulatedIntent {
    Phishing,
    CreateSession,
    UpdateRouting,
    WaitForSession,
    UpgradeSession,
    ScanNetwork,
    FindServices,
    ExploitServer,
    FindData,
    ExecuteCommand,
    DirectExecuteCommand,
    DirectExfiltrateData,
    DirectScanHost,
}

impl SimulatedIntent {
    const ALL: [SimulatedIntent; 13] = [
        SimulatedIntent::Phishing,
        SimulatedIntent::CreateSession,
        SimulatedIntent::UpdateRouting,
        SimulatedIntent::WaitForSession,
        SimulatedIntent::UpgradeSession,
        SimulatedIntent::ScanNetwork,
        SimulatedIntent::FindServices,
        SimulatedIntent::ExploitServer,
        SimulatedIntent::FindData,
        SimulatedIntent::ExecuteCommand,
        SimulatedIntent::DirectExecuteCommand,
        SimulatedIntent::DirectExfiltrateData,
        SimulatedIntent::DirectScanHost,
    ];

    fn key(&self) -> &'static str {
        match self {
            SimulatedIntent::Phishing => "phishing",
            SimulatedIntent::CreateSession => "direct:create_session",
            SimulatedIntent::UpdateRouting => "direct:update_routing",
            SimulatedIntent::WaitForSession => "wait_for_session",
            SimulatedIntent::UpgradeSession => "upgrade_session",
            SimulatedIntent::ScanNetwork => "scan_network",
            SimulatedIntent::FindServices => "find_services",
            SimulatedIntent::ExploitServer => "exploit_server",
            SimulatedIntent::FindData => "find_data",
            SimulatedIntent::ExecuteCommand => "execute_command",
            SimulatedIntent::DirectExecuteCommand => "direct:execute_command",
            SimulatedIntent::DirectExfiltrateData => "direct:exfiltrate_data",
            SimulatedIntent::DirectScanHost => "direct:scan_host",
        }
    }

    fn kind(&self) -> ActionKind {
        match self {
            SimulatedIntent::Phishing
            | SimulatedIntent::ScanNetwork
            | SimulatedIntent::FindServices
            | SimulatedIntent::ExecuteCommand => ActionKind::Composite,
            _ => ActionKind::Direct,
        }
    }

    fn description(&self, namespace: &str, platform: &ExecutionEnvironment) -> ActionDescription {
        let (description, parameters) = match self {
            SimulatedIntent::Phishing => ("Establish session from phishing", vec![]),
            SimulatedIntent::CreateSession => ("Create session to the target", vec![]),
            SimulatedIntent::UpdateRouting => ("Update routing table", vec![]),
            SimulatedIntent::WaitForSession => ("Wait for the session to establish", vec![]),
            SimulatedIntent::UpgradeSession => ("Upgrade the established session", vec![]),
            SimulatedIntent::ScanNetwork => (
                "Scan the target network",
                vec![ActionParameter::any(
                    ActionParameterKind::Network,
                    "to_network",
                )],
            ),
            SimulatedIntent::FindServices => (
                "Scan the target for services",
                vec![
                    ActionParameter::any(ActionParameterKind::Network, "to_network"),
                    ActionParameter::any(ActionParameterKind::None, "services"),
                ],
            ),
            SimulatedIntent::ExploitServer => ("Exploit the target service", vec![]),
            SimulatedIntent::FindData => (
                "Show a tree-like structure of the desired directory",
                vec![ActionParameter::any(ActionParameterKind::Path, "directory")],
            ),
            SimulatedIntent::ExecuteCommand => (
                "Execute a command on a remote host",
                vec![ActionParameter::any(ActionParameterKind::Command, "command")],
            ),
            SimulatedIntent::DirectExecuteCommand => (
                "Execute command",
                vec![ActionParameter::any(ActionParameterKind::Command, "command")],
            ),
            SimulatedIntent::DirectExfiltrateData => (
                "Get data from a file",
                vec![ActionParameter::any(ActionParameterKind::Path, "data")],
            ),
            SimulatedIntent::DirectScanHost => ("Scan host", vec![]),
        };

        ActionDescription::new(
            format!("{}:{}", namespace, self.key()),
            self.kind(),
            description,
            parameters,
            vec![platform.clone()],
        )
    }
}

/// Database dump the scripted scenario discovers in a shell history; running
/// it reads the `db` item straight from the database host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DatabaseDump {
    host: Ipv4Addr,
}

impl DatabaseDump {
    fn parse(command: &str) -> Option<Self> {
        let mut tokens = command.split_whitespace();
        if tokens.next()? != "mysqldump" {
            return None;
        }
        while let Some(token) = tokens.next() {
            if token == "-h" {
                return tokens.next()?.parse().ok().map(|host| Self { host });
            }
            if let Some(host) = token.strip_prefix("--host=") {
                return host.parse().ok().map(|host| Self { host });
            }
        }
        None
    }
}

/// In-process effect engine: fabricates results from the node directory and
/// exploit table, never leaving the process.
pub struct SimulationModel {
    namespace: String,
    platform: ExecutionEnvironment,
    exploits: Arc<dyn ExploitStore>,
    sessions: Arc<dyn SessionFactory>,
    handlers: HashMap<String, SimulatedIntent>,
    ssh_jitter: Duration,
    min_scan_prefix: u8,
}

impl SimulationModel {
    pub fn new(
        namespace: impl Into<String>,
        exploits: Arc<dyn ExploitStore>,
        sessions: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            platform: ExecutionEnvironment::simulation(),
            exploits,
            sessions,
            handlers: SimulatedIntent::ALL
                .iter()
                .map(|intent| (intent.key().to_string(), *intent))
                .collect(),
            ssh_jitter: Duration::from_millis(10),
            min_scan_prefix: 16,
        }
    }

    /// Engine over the exploits and jitter of a loaded configuration.
    pub fn from_config(config: &SimulationConfig, namespace: impl Into<String>) -> Self {
        Self::new(
            namespace,
            Arc::new(InMemoryExploitStore::from_config(&config.exploits)),
            Arc::new(SequentialSessionFactory::default()),
        )
        .with_ssh_jitter(Duration::from_millis(config.ssh_jitter_ms))
        .with_min_scan_prefix(config.min_scan_prefix)
    }

    pub fn with_ssh_jitter(mut self, ssh_jitter: Duration) -> Self {
        self.ssh_jitter = ssh_jitter.max(Duration::from_millis(1));
        self
    }

    pub fn with_min_scan_prefix(mut self, prefix: u8) -> Self {
        self.min_scan_prefix = prefix.min(32);
        self
    }

    fn action_id(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn lookup(&self, request: &ActionRequest, kind: ActionKind) -> Option<SimulatedIntent> {
        if request.action.namespace() != self.namespace {
            return None;
        }
        self.handlers
            .get(&intent_key(request))
            .copied()
            .filter(|intent| intent.kind() == kind)
    }

    fn reply(request: &ActionRequest, origin: StatusOrigin, value: StatusValue) -> Response {
        Response::to(request, Status::new(origin, value))
    }

    fn outcome(response: Response) -> ActionOutcome {
        ActionOutcome::new(NOMINAL_DURATION, response)
    }

    /// The service an authorization was issued for, on the destination node.
    fn authorized_service<'a>(
        request: &ActionRequest,
        node: &'a Node,
    ) -> Result<Option<&'a NodeService>, ModelError> {
        let auth = request.auth.as_ref().ok_or_else(|| {
            invalid_request(format!(
                "action '{}' needs an authorization",
                request.action.id
            ))
        })?;
        let service = auth.services.first().ok_or_else(|| {
            invalid_request(format!(
                "authorization of '{}' covers no service",
                auth.identity
            ))
        })?;
        Ok(node.service(service))
    }

    async fn effect(
        &self,
        intent: SimulatedIntent,
        request: &ActionRequest,
        node: &Node,
    ) -> Result<ActionOutcome, ModelError> {
        match intent {
            SimulatedIntent::CreateSession => {
                let Some(exploit) = &request.action.exploit else {
                    return Ok(Self::outcome(Self::reply(
                        request,
                        StatusOrigin::Service,
                        StatusValue::Failure,
                    )));
                };
                if let Err(reason) = self.exploits.evaluate(exploit, request, node) {
                    tracing::debug!(target: "simulation", request_id = request.id, reason = %reason, "exploit_not_applicable");
                    return Ok(Self::outcome(Self::reply(
                        request,
                        StatusOrigin::Service,
                        StatusValue::Failure,
                    )));
                }
                let session = self.sessions.create_session(request);
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_session(Some(session)),
                ))
            }
            SimulatedIntent::UpdateRouting => {
                if request.session.is_none() {
                    return Ok(Self::outcome(Self::reply(
                        request,
                        StatusOrigin::Service,
                        StatusValue::Failure,
                    )));
                }
                let subnets = node.interfaces.first().copied().into_iter().collect();
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Network, StatusValue::Success)
                        .with_content(Content::Subnets(subnets))
                        .with_session(request.session.clone())
                        .with_auth(request.auth.clone()),
                ))
            }
            SimulatedIntent::WaitForSession => {
                let session = self.sessions.create_session(request);
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_session(Some(session)),
                ))
            }
            SimulatedIntent::UpgradeSession => {
                let parent = current_session(request)?.clone();
                let session = self.sessions.create_session(request).with_parent(parent);
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_session(Some(session))
                        .with_auth(request.auth.clone()),
                ))
            }
            SimulatedIntent::ExploitServer => self.exploit_server(request, node),
            SimulatedIntent::FindData => {
                let directory = parameter(request, "directory")?;
                let Some(service) = Self::authorized_service(request, node)? else {
                    return Ok(Self::outcome(
                        Self::reply(request, StatusOrigin::Node, StatusValue::Error)
                            .with_session(request.session.clone()),
                    ));
                };
                let files = service
                    .private_data
                    .iter()
                    .filter(|item| item.id.starts_with(directory))
                    .map(|item| item.id.clone())
                    .collect();
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_content(Content::Files(files))
                        .with_session(request.session.clone()),
                ))
            }
            SimulatedIntent::DirectExecuteCommand => {
                let output = match parameter(request, "command")?.trim() {
                    "which mysqldump" => "/usr/bin/mysqldump",
                    _ => "ERROR",
                };
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_content(Content::Text(output.to_string()))
                        .with_session(request.session.clone()),
                ))
            }
            SimulatedIntent::DirectExfiltrateData => {
                let data = parameter(request, "data")?;
                let found = Self::authorized_service(request, node)?.and_then(|service| {
                    service.private_data.iter().find(|item| item.id == data)
                });
                let (value, text) = match found {
                    Some(item) => (StatusValue::Success, item.description.clone()),
                    None => (StatusValue::Failure, MISSING_FILE.to_string()),
                };
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, value)
                        .with_content(Content::Text(text))
                        .with_session(request.session.clone())
                        .with_auth(request.auth.clone()),
                ))
            }
            SimulatedIntent::DirectScanHost => {
                let inventory = node
                    .services
                    .iter()
                    .filter(|service| !service.local)
                    .map(|service| ServiceFingerprint {
                        name: service.name.clone(),
                        port: service.port,
                        version: service.version.clone(),
                    })
                    .collect();
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_content(Content::ServiceInventory(inventory))
                        .with_session(request.session.clone())
                        .with_auth(request.auth.clone()),
                ))
            }
            SimulatedIntent::Phishing
            | SimulatedIntent::ScanNetwork
            | SimulatedIntent::FindServices
            | SimulatedIntent::ExecuteCommand => Ok(unknown_intent(request, &self.namespace)),
        }
    }

    fn exploit_server(
        &self,
        request: &ActionRequest,
        node: &Node,
    ) -> Result<ActionOutcome, ModelError> {
        let failure = || {
            Self::outcome(Self::reply(
                request,
                StatusOrigin::Service,
                StatusValue::Failure,
            ))
        };
        let Some(exploit) = &request.action.exploit else {
            return Ok(failure());
        };
        if let Err(reason) = self.exploits.evaluate(exploit, request, node) {
            tracing::debug!(target: "simulation", request_id = request.id, reason = %reason, "exploit_not_applicable");
            return Ok(failure());
        }

        let error = match node.service(&request.dst_service) {
            None => Some(format!(
                "Service {} not present at a node",
                request.dst_service
            )),
            Some(service) if service.local => {
                Some(format!("Service {} is local.", request.dst_service))
            }
            Some(_) => None,
        };
        if let Some(error) = error {
            return Ok(Self::outcome(
                Self::reply(request, StatusOrigin::Node, StatusValue::Error)
                    .with_content(Content::Text(error))
                    .with_session(request.session.clone())
                    .with_auth(request.auth.clone()),
            ));
        }

        let session = self.sessions.create_session(request);
        if request.dst_service == "ssh" {
            let credential = Credential {
                username: "user".to_string(),
                password: "pass".to_string(),
            };
            let auth = Authorization {
                identity: credential.username.clone(),
                access_level: AccessLevel::Elevated,
                token: Uuid::new_v4().to_string(),
                services: vec!["ssh".to_string()],
            };
            let jitter_ms = self.ssh_jitter.as_millis().max(1) as u64;
            let elapsed = Duration::from_millis(rand::thread_rng().gen_range(1..=jitter_ms));
            return Ok(ActionOutcome::new(
                elapsed,
                Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                    .with_content(Content::Credentials(vec![credential]))
                    .with_session(Some(session))
                    .with_auth(Some(auth)),
            ));
        }

        Ok(Self::outcome(
            Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                .with_content(Content::Text(String::new()))
                .with_session(Some(session)),
        ))
    }

    async fn flow(
        &self,
        intent: SimulatedIntent,
        request: &ActionRequest,
        cam: &dyn CompositeActionManager,
    ) -> Result<ActionOutcome, ModelError> {
        match intent {
            SimulatedIntent::Phishing => {
                let exploit = self.exploits.get(PHISHING_EXPLOIT);
                let create = cam
                    .action(&self.action_id(SimulatedIntent::CreateSession.key()))?
                    .with_exploit(exploit);
                let created = cam
                    .call_action(request.derive(
                        cam.next_request_id(),
                        request.dst_ip,
                        request.dst_service.clone(),
                        create,
                    ))
                    .await?;
                if !created.status.is_success() {
                    return Ok(Self::outcome(
                        Self::reply(request, created.status.origin, created.status.value)
                            .with_content(created.content),
                    ));
                }

                let routing = cam.action(&self.action_id(SimulatedIntent::UpdateRouting.key()))?;
                let routed = cam
                    .call_action(
                        request
                            .derive(
                                cam.next_request_id(),
                                request.dst_ip,
                                request.dst_service.clone(),
                                routing,
                            )
                            .with_session(created.session),
                    )
                    .await?;
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_content(routed.content)
                        .with_session(routed.session),
                ))
            }
            SimulatedIntent::ScanNetwork => {
                let target = self.scan_target(request)?;
                let results = self.scan_hosts(target, request, cam).await?;
                let hosts = results
                    .into_iter()
                    .filter(|response| response.status.is_success())
                    .map(|response| response.src_ip)
                    .collect();
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Network, StatusValue::Success)
                        .with_content(Content::Hosts(hosts))
                        .with_session(request.session.clone())
                        .with_auth(request.auth.clone()),
                ))
            }
            SimulatedIntent::FindServices => {
                let target = self.scan_target(request)?;
                let filter = ServiceFilter::parse(parameter(request, "services")?)
                    .map_err(|err| invalid_request(err.to_string()))?;
                let results = self.scan_hosts(target, request, cam).await?;

                let mut services = std::collections::BTreeMap::new();
                for response in results.into_iter().filter(|response| response.status.is_success()) {
                    let Content::ServiceInventory(inventory) = response.content else {
                        continue;
                    };
                    let mut ports: Vec<u16> = inventory
                        .iter()
                        .filter(|service| filter.matches(&service.name, service.port))
                        .map(|service| service.port)
                        .collect();
                    ports.sort_unstable();
                    ports.dedup();
                    if !ports.is_empty() {
                        services.insert(response.src_ip, ports);
                    }
                }
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Network, StatusValue::Success)
                        .with_content(Content::Services(services))
                        .with_session(request.session.clone())
                        .with_auth(request.auth.clone()),
                ))
            }
            SimulatedIntent::ExecuteCommand => {
                let command = parameter(request, "command")?;
                let result = match DatabaseDump::parse(command) {
                    Some(dump) => {
                        let auth = Authorization {
                            identity: "user".to_string(),
                            access_level: AccessLevel::Elevated,
                            token: Uuid::new_v4().to_string(),
                            services: vec!["mysql".to_string()],
                        };
                        let mut action = cam.action(
                            &self.action_id(SimulatedIntent::DirectExfiltrateData.key()),
                        )?;
                        action.bind("data", "db")?;
                        cam.call_action(
                            request
                                .derive(cam.next_request_id(), dump.host, "mysql", action)
                                .with_session(request.session.clone())
                                .with_auth(Some(auth)),
                        )
                        .await?
                    }
                    None => {
                        let mut action = cam.action(
                            &self.action_id(SimulatedIntent::DirectExecuteCommand.key()),
                        )?;
                        action.bind("command", command)?;
                        cam.call_action(
                            request
                                .derive(
                                    cam.next_request_id(),
                                    request.dst_ip,
                                    request.dst_service.clone(),
                                    action,
                                )
                                .with_session(request.session.clone())
                                .with_auth(request.auth.clone()),
                        )
                        .await?
                    }
                };
                Ok(Self::outcome(
                    Self::reply(request, StatusOrigin::Service, StatusValue::Success)
                        .with_content(result.content)
                        .with_session(request.session.clone()),
                ))
            }
            _ => Ok(unknown_intent(request, &self.namespace)),
        }
    }

    fn scan_target(&self, request: &ActionRequest) -> Result<ScanTarget, ModelError> {
        let text = parameter(request, "to_network")?;
        let target = ScanTarget::parse(text).ok_or_else(|| {
            invalid_request(format!("'{}' is neither an address nor a subnet", text))
        })?;
        if target.prefix() < self.min_scan_prefix {
            return Err(invalid_request(format!(
                "'{}' is wider than the /{} scan limit",
                text, self.min_scan_prefix
            )));
        }
        Ok(target)
    }

    /// One `direct:scan_host` per address, at most `SCAN_CONCURRENCY` pending
    /// at once; returns only after every one of them resolved.
    async fn scan_hosts(
        &self,
        target: ScanTarget,
        request: &ActionRequest,
        cam: &dyn CompositeActionManager,
    ) -> Result<Vec<Response>, ModelError> {
        let scan_id = self.action_id(SimulatedIntent::DirectScanHost.key());
        tracing::debug!(
            target: "simulation",
            request_id = request.id,
            prefix = target.prefix(),
            concurrency = SCAN_CONCURRENCY,
            "scan_fan_out"
        );

        stream::iter(target.hosts())
            .map(|host| {
                let scan_id = scan_id.as_str();
                async move {
                    let action = cam.action(scan_id)?;
                    let sub_request = request.derive(cam.next_request_id(), host, "", action);
                    cam.call_action(sub_request).await
                }
            })
            .buffered(SCAN_CONCURRENCY)
            .try_collect()
            .await
    }
}

#[async_trait]
impl BehavioralModel for SimulationModel {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn platform(&self) -> &ExecutionEnvironment {
        &self.platform
    }

    fn action_descriptions(&self) -> Vec<ActionDescription> {
        SimulatedIntent::ALL
            .iter()
            .map(|intent| intent.description(&self.namespace, &self.platform))
            .collect()
    }

    async fn action_effect(
        &self,
        request: &ActionRequest,
        node: Option<&Node>,
    ) -> Result<ActionOutcome, ModelError> {
        let Some(intent) = self.lookup(request, ActionKind::Direct) else {
            return Ok(unknown_intent(request, &self.namespace));
        };
        ensure_bound(request)?;

        let Some(node) = node else {
            return Ok(ActionOutcome::immediate(
                Self::reply(request, StatusOrigin::Network, StatusValue::Failure)
                    .with_session(request.session.clone()),
            ));
        };
        self.effect(intent, request, node).await
    }

    async fn action_flow(
        &self,
        request: &ActionRequest,
        cam: &dyn CompositeActionManager,
    ) -> Result<ActionOutcome, ModelError> {
        let Some(intent) = self.lookup(request, ActionKind::Composite) else {
            return Ok(unknown_intent(request, &self.namespace));
        };
        ensure_bound(request)?;
        self.flow(intent, request, cam).await
    }
}

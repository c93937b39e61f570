use std::{collections::BTreeMap, fmt, net::Ipv4Addr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    actions::{Action, ExecutionEnvironment},
    net::Ipv4Subnet,
};

pub type RequestId = u64;
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOrigin {
    Network,
    Node,
    Service,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusValue {
    Success,
    Failure,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status {
    pub origin: StatusOrigin,
    pub value: StatusValue,
}

impl Status {
    pub const fn new(origin: StatusOrigin, value: StatusValue) -> Self {
        Self { origin, value }
    }

    pub fn is_success(&self) -> bool {
        self.value == StatusValue::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.origin, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status '{0}': expected <origin>/<value>, e.g. service/success")]
pub struct StatusParseError(pub String);

impl FromStr for StatusOrigin {
    type Err = StatusParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(StatusOrigin::Network),
            "node" => Ok(StatusOrigin::Node),
            "service" => Ok(StatusOrigin::Service),
            "system" => Ok(StatusOrigin::System),
            _ => Err(StatusParseError(text.to_string())),
        }
    }
}

impl FromStr for StatusValue {
    type Err = StatusParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(StatusValue::Success),
            "failure" => Ok(StatusValue::Failure),
            "error" => Ok(StatusValue::Error),
            _ => Err(StatusParseError(text.to_string())),
        }
    }
}

/// Parses `origin/value`, case-insensitively.
impl FromStr for Status {
    type Err = StatusParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (origin, value) = text
            .split_once('/')
            .ok_or_else(|| StatusParseError(text.to_string()))?;
        Ok(Status::new(
            origin.parse().map_err(|_| StatusParseError(text.to_string()))?,
            value.parse().map_err(|_| StatusParseError(text.to_string()))?,
        ))
    }
}

/// Established remote-control channel to a target. A newer session
/// supersedes an older one instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub owner: String,
    pub id: SessionId,
    #[serde(default)]
    pub parent: Option<Box<Session>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub start: Option<Ipv4Addr>,
    #[serde(default)]
    pub end: Option<Ipv4Addr>,
}

fn default_enabled() -> bool {
    true
}

impl Session {
    pub fn new(owner: impl Into<String>, id: SessionId) -> Self {
        Self {
            owner: owner.into(),
            id,
            parent: None,
            enabled: true,
            start: None,
            end: None,
        }
    }

    pub fn with_parent(mut self, parent: Session) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn with_path(mut self, start: Option<Ipv4Addr>, end: Option<Ipv4Addr>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    Limited,
    Elevated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identity: String,
    pub access_level: AccessLevel,
    pub token: String,
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Handler-specific payload of a response. Parsing a given report always
/// produces the same variant and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Hosts(Vec<Ipv4Addr>),
    Services(BTreeMap<Ipv4Addr, Vec<u16>>),
    Files(Vec<String>),
    Subnets(Vec<Ipv4Subnet>),
    Credentials(Vec<Credential>),
    ServiceInventory(Vec<ServiceFingerprint>),
}

impl Content {
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Empty => true,
            Content::Text(text) => text.is_empty(),
            Content::Hosts(hosts) => hosts.is_empty(),
            Content::Services(services) => services.is_empty(),
            Content::Files(files) => files.is_empty(),
            Content::Subnets(subnets) => subnets.is_empty(),
            Content::Credentials(credentials) => credentials.is_empty(),
            Content::ServiceInventory(services) => services.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFingerprint {
    pub name: String,
    pub port: u16,
    pub version: String,
}

/// Named intent bound to a destination, as handed to a behavioral model.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub id: RequestId,
    pub src_node: String,
    pub src_service: String,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Ipv4Addr,
    pub dst_service: String,
    pub action: Action,
    pub session: Option<Session>,
    pub auth: Option<Authorization>,
    pub platform: ExecutionEnvironment,
}

impl ActionRequest {
    /// Builds a sub-request addressed elsewhere but carrying the same origin.
    pub fn derive(
        &self,
        id: RequestId,
        dst_ip: Ipv4Addr,
        dst_service: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            id,
            src_node: self.src_node.clone(),
            src_service: self.src_service.clone(),
            src_ip: self.src_ip,
            dst_ip,
            dst_service: dst_service.into(),
            action,
            session: None,
            auth: None,
            platform: self.platform.clone(),
        }
    }

    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_auth(mut self, auth: Option<Authorization>) -> Self {
        self.auth = auth;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: RequestId,
    pub src_ip: Ipv4Addr,
    pub status: Status,
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub auth: Option<Authorization>,
}

impl Response {
    pub fn to(request: &ActionRequest, status: Status) -> Self {
        Self {
            request_id: request.id,
            src_ip: request.dst_ip,
            status,
            content: Content::Empty,
            session: None,
            auth: None,
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_auth(mut self, auth: Option<Authorization>) -> Self {
        self.auth = auth;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeService {
    pub name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub private_data: Vec<DataItem>,
}

/// Read-only view of a simulated host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub ips: Vec<Ipv4Addr>,
    #[serde(default)]
    pub interfaces: Vec<Ipv4Subnet>,
    #[serde(default)]
    pub services: Vec<NodeService>,
}

impl Node {
    pub fn service(&self, name: &str) -> Option<&NodeService> {
        self.services.iter().find(|service| service.name == name)
    }
}

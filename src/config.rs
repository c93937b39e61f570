use std::{
    fs,
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{actions::ExploitCategory, types::Node};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

fn default_api_root() -> String {
    "http://localhost:8001/api/".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_namespace() -> String {
    "dojo".to_string()
}

fn default_ssh_jitter_ms() -> u64 {
    10
}

fn default_min_scan_prefix() -> u8 {
    16
}

fn default_attacker_node() -> String {
    "attacker_node".to_string()
}

fn default_attacker_service() -> String {
    "scripted_attacker".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

/// Where and how the JSON event log is written. Omitted keys fall back to
/// the values of [`LoggingConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub filter: String,
    pub rotation: LoggingRotation,
    pub retention_days: usize,
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs/dojo"),
            filter: "info".to_string(),
            rotation: LoggingRotation::Daily,
            retention_days: 14,
            stderr_warn_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_api_root")]
    pub api_root: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Enables doubling of the poll delay up to this ceiling.
    #[serde(default)]
    pub poll_backoff_max_ms: Option<u64>,
    /// Absent means wait for the terminal state indefinitely.
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
    /// Replaces every builder's accepted terminal states when set.
    #[serde(default)]
    pub success_sentinels: Option<Vec<String>>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_backoff_max_ms: None,
            poll_timeout_ms: None,
            success_sentinels: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelBackend {
    #[default]
    Simulation,
    Emulation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: ModelBackend,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitConfig {
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub max_version: Option<String>,
    pub category: ExploitCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub exploits: Vec<ExploitConfig>,
    #[serde(default = "default_ssh_jitter_ms")]
    pub ssh_jitter_ms: u64,
    /// Narrowest network prefix a scan may target; wider subnets are refused.
    #[serde(default = "default_min_scan_prefix")]
    pub min_scan_prefix: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            exploits: Vec::new(),
            ssh_jitter_ms: default_ssh_jitter_ms(),
            min_scan_prefix: default_min_scan_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_attacker_node")]
    pub attacker_node: String,
    #[serde(default = "default_attacker_service")]
    pub attacker_service: String,
    #[serde(default)]
    pub attacker_ip: Option<Ipv4Addr>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            attacker_node: default_attacker_node(),
            attacker_service: default_attacker_service(),
            attacker_ip: None,
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&text)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = locate_schema(config_base, &config_value)?;
        check_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize dojo config")?;

        if !config.logging.dir.is_absolute() {
            config.logging.dir = config_base.join(&config.logging.dir);
        }
        if !config.orchestrator.api_root.ends_with('/') {
            config.orchestrator.api_root.push('/');
        }

        Ok(config)
    }
}

const SCHEMA_FILE: &str = "dojo.schema.json";

/// `$schema` from the document wins; otherwise the schema shipped next to the
/// config, then the one in the crate root.
fn locate_schema(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(declared) = config_value.get("$schema").and_then(Value::as_str) {
        return Ok(config_base.join(declared));
    }

    [
        config_base.join(SCHEMA_FILE),
        Path::new(env!("CARGO_MANIFEST_DIR")).join(SCHEMA_FILE),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
    .ok_or_else(|| anyhow!("no $schema in config and no {SCHEMA_FILE} beside it"))
}

fn check_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_text = fs::read_to_string(schema_path)
        .with_context(|| format!("cannot read config schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_text)
        .with_context(|| format!("config schema {} is not JSON", schema_path.display()))?;
    let validator = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("config schema {} is invalid: {err}", schema_path.display()))?;

    validator.validate(config_value).map_err(|errors| {
        let problems: Vec<String> = errors
            .map(|error| format!("{} at '{}'", error, error.instance_path))
            .collect();
        anyhow!("config validation failed: {}", problems.join("; "))
    })
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actions::error::{ActionError, unknown_parameter, value_out_of_domain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    Emulation,
    Simulation,
}

/// Backend tag an action description is compatible with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub kind: PlatformKind,
    pub provider: String,
}

impl ExecutionEnvironment {
    pub fn emulation() -> Self {
        Self {
            kind: PlatformKind::Emulation,
            provider: "docker+cryton".to_string(),
        }
    }

    pub fn simulation() -> Self {
        Self {
            kind: PlatformKind::Simulation,
            provider: "CYST".to_string(),
        }
    }
}

impl fmt::Display for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.provider)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Direct,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionParameterKind {
    None,
    Address,
    Network,
    Path,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterDomain {
    Any,
    Options { default: String, options: Vec<String> },
}

impl ParameterDomain {
    pub fn options(default: impl Into<String>, options: &[&str]) -> Self {
        Self::Options {
            default: default.into(),
            options: options.iter().map(|option| option.to_string()).collect(),
        }
    }

    pub fn validate(&self, value: &str) -> bool {
        match self {
            ParameterDomain::Any => true,
            ParameterDomain::Options { options, .. } => options.iter().any(|item| item == value),
        }
    }

    pub fn default_value(&self) -> Option<&str> {
        match self {
            ParameterDomain::Any => None,
            ParameterDomain::Options { default, .. } => Some(default),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub kind: ActionParameterKind,
    pub name: String,
    pub domain: ParameterDomain,
    #[serde(default)]
    pub value: Option<String>,
}

impl ActionParameter {
    pub fn any(kind: ActionParameterKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            domain: ParameterDomain::Any,
            value: None,
        }
    }

    pub fn with_domain(mut self, domain: ParameterDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn effective_value(&self) -> Option<&str> {
        self.value.as_deref().or_else(|| self.domain.default_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploitCategory {
    Auth,
    Code,
    Data,
    Phishing,
}

/// Exploit descriptor attached to a request. Applicability is decided by an
/// exploit store, never by the exploit itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploit {
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub max_version: Option<String>,
    pub category: ExploitCategory,
}

/// Registered template of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescription {
    pub id: String,
    pub kind: ActionKind,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
    pub platforms: Vec<ExecutionEnvironment>,
}

impl ActionDescription {
    pub fn new(
        id: impl Into<String>,
        kind: ActionKind,
        description: impl Into<String>,
        parameters: Vec<ActionParameter>,
        platforms: Vec<ExecutionEnvironment>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            parameters,
            platforms,
        }
    }

    pub fn supports(&self, platform: &ExecutionEnvironment) -> bool {
        self.platforms.iter().any(|item| item == platform)
    }

    pub fn instantiate(&self) -> Action {
        Action {
            id: self.id.clone(),
            kind: self.kind,
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            exploit: None,
        }
    }
}

/// Owned instance of an intent. Binding values here never touches the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub description: String,
    pub parameters: Vec<ActionParameter>,
    #[serde(default)]
    pub exploit: Option<Exploit>,
}

impl Action {
    pub fn namespace(&self) -> &str {
        self.id.split(':').next().unwrap_or_default()
    }

    /// Id segments after the namespace, e.g. `dojo:direct:scan_host` -> `direct`, `scan_host`.
    pub fn fragments(&self) -> Vec<&str> {
        self.id.split(':').skip(1).collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .and_then(ActionParameter::effective_value)
    }

    pub fn bind(&mut self, name: &str, value: impl Into<String>) -> Result<(), ActionError> {
        let value = value.into();
        let Some(parameter) = self.parameters.iter_mut().find(|item| item.name == name) else {
            return Err(unknown_parameter(format!(
                "action '{}' has no parameter '{}'",
                self.id, name
            )));
        };

        if !parameter.domain.validate(&value) {
            return Err(value_out_of_domain(format!(
                "value '{}' is outside the domain of '{}.{}'",
                value, self.id, name
            )));
        }

        parameter.value = Some(value);
        Ok(())
    }

    pub fn with_exploit(mut self, exploit: Option<Exploit>) -> Self {
        self.exploit = exploit;
        self
    }

    /// Declared parameters that have neither a bound value nor a domain default.
    pub fn unbound_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|parameter| parameter.effective_value().is_none())
            .map(|parameter| parameter.name.as_str())
            .collect()
    }
}

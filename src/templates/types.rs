use std::{collections::BTreeSet, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::{
    templates::{
        error::{TemplateError, report_not_ready},
        parsers,
    },
    types::SessionId,
};

pub const STEP_TYPE_WORKER_EXECUTE: &str = "worker/execute";

/// Elapsed time reported when a completion report carries no usable timestamps.
pub const NOMINAL_STEP_DURATION: Duration = Duration::from_secs(1);

/// Tool vocabulary a step is written in; each family spells "success" its own way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleFamily {
    /// `metasploit` module: `module_name` + `datastore`.
    Metasploit,
    /// `mod_msf` module: `module_type` + `module` + `module_options`.
    Msf,
    /// `mod_cmd` module: a shell command on an existing session.
    Command,
}

impl ModuleFamily {
    pub fn module_name(&self) -> &'static str {
        match self {
            ModuleFamily::Metasploit => "metasploit",
            ModuleFamily::Msf => "mod_msf",
            ModuleFamily::Command => "mod_cmd",
        }
    }

    pub fn default_sentinels(&self) -> SuccessSentinels {
        match self {
            ModuleFamily::Metasploit => SuccessSentinels::new(["ok"]),
            ModuleFamily::Msf => SuccessSentinels::new(["OK"]),
            ModuleFamily::Command => SuccessSentinels::new(["OK", "FINISHED"]),
        }
    }
}

/// Coarse tool category driving the per-step timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    Listener,
    Sweep,
    PortScan,
    BruteForce,
    Exploit,
    Command,
}

impl ToolClass {
    /// `None` means the step may run until the backend ends it.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            ToolClass::Listener => None,
            ToolClass::Sweep => Some(Duration::from_secs(300)),
            ToolClass::PortScan => Some(Duration::from_secs(600)),
            ToolClass::BruteForce => Some(Duration::from_secs(1800)),
            ToolClass::Exploit => Some(Duration::from_secs(300)),
            ToolClass::Command => Some(Duration::from_secs(60)),
        }
    }
}

/// Set of terminal-state spellings counted as success.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuccessSentinels(BTreeSet<String>);

impl SuccessSentinels {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, state: Option<&str>) -> bool {
        state.is_some_and(|state| self.0.contains(state))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepArguments {
    pub module: String,
    pub module_arguments: Value,
}

/// One unit of work submitted to the orchestration backend. Built fresh per
/// request and never changed after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub is_init: bool,
    pub arguments: StepArguments,
}

impl StepTemplate {
    pub fn new(name: String, family: ModuleFamily, module_arguments: Value) -> Self {
        Self {
            name,
            step_type: STEP_TYPE_WORKER_EXECUTE.to_string(),
            is_init: false,
            arguments: StepArguments {
                module: family.module_name().to_string(),
                module_arguments,
            },
        }
    }

    pub fn module_arguments(&self) -> &Value {
        &self.arguments.module_arguments
    }
}

/// Terminal result document of one step execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionReport {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub output: String,
    #[serde(default)]
    pub serialized_output: Value,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub finish_time: Option<String>,
}

impl CompletionReport {
    /// `result` when the backend reports one, otherwise the execution `state`.
    pub fn terminal_state(&self) -> Option<&str> {
        self.result.as_deref().or(self.state.as_deref())
    }

    pub fn session_id(&self) -> Option<SessionId> {
        let serialized = self.serialized_output.get("session_id");
        serialized
            .and_then(Value::as_u64)
            .or_else(|| {
                serialized
                    .and_then(Value::as_str)
                    .and_then(|text| text.trim().parse().ok())
            })
            .or_else(|| parsers::opened_session_id(&self.output))
    }

    /// Wall-clock seconds between start and finish, truncated.
    pub fn elapsed(&self) -> Duration {
        match (
            self.start_time.as_deref().and_then(parse_timestamp),
            self.finish_time.as_deref().and_then(parse_timestamp),
        ) {
            (Some(start), Some(finish)) if finish >= start => {
                Duration::from_secs((finish - start).whole_seconds().max(0) as u64)
            }
            _ => NOMINAL_STEP_DURATION,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(parsed);
    }

    let with_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let without_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(text, with_fraction)
        .or_else(|_| PrimitiveDateTime::parse(text, without_fraction))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// In-flight execution of one template. The report only becomes readable
/// once the backend reached a terminal state.
#[derive(Debug, Clone)]
pub struct StepExecution {
    template: StepTemplate,
    report: Option<CompletionReport>,
}

impl StepExecution {
    pub fn new(template: StepTemplate) -> Self {
        Self {
            template,
            report: None,
        }
    }

    pub fn template(&self) -> &StepTemplate {
        &self.template
    }

    pub fn complete(&mut self, report: CompletionReport) {
        self.report = Some(report);
    }

    pub fn report(&self) -> Result<&CompletionReport, TemplateError> {
        self.report.as_ref().ok_or_else(|| {
            report_not_ready(format!(
                "step '{}' has no report before it finishes",
                self.template.name
            ))
        })
    }
}

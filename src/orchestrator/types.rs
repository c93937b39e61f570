use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WORKER_DESCRIPTION: &str = "Agent used for running action in the emulation environment.";
pub const PLAN_OWNER: &str = "dojo";
pub const STAGE_NAME: &str = "Global stage";
pub const STEP_FINISHED_STATE: &str = "FINISHED";

/// Identifiers needed to add steps to one agent's running plan. Created once
/// per actor and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub label: String,
    pub worker_id: u64,
    pub plan_id: u64,
    pub run_id: u64,
    pub stage_id: u64,
    pub stage_execution_id: u64,
}

/// Single-stage dynamic plan; steps are attached later, one per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTemplate {
    pub plan: PlanDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub name: String,
    pub owner: String,
    pub dynamic: bool,
    pub stages: Vec<StageDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDocument {
    pub name: String,
    pub trigger_type: String,
    pub trigger_args: DeltaTrigger,
    pub steps: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaTrigger {
    pub seconds: u64,
}

impl PlanTemplate {
    pub fn dynamic_for(agent_label: &str) -> Self {
        Self {
            plan: PlanDocument {
                name: format!("Plan for {}", agent_label),
                owner: PLAN_OWNER.to_string(),
                dynamic: true,
                stages: vec![StageDocument {
                    name: STAGE_NAME.to_string(),
                    trigger_type: "delta".to_string(),
                    trigger_args: DeltaTrigger { seconds: 0 },
                    steps: Vec::new(),
                }],
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedObject {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkerSummary {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HealthCheck {
    #[serde(default)]
    pub detail: Value,
}

impl HealthCheck {
    /// `detail` is a message or a state object depending on the backend
    /// version; either way a healthy worker mentions `UP`.
    pub fn is_up(&self) -> bool {
        match &self.detail {
            Value::String(text) => text.contains("UP"),
            Value::Null => false,
            other => other.to_string().contains("UP"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StepStarted {
    pub execution_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StepExecutionState {
    #[serde(default)]
    pub state: String,
}

/// `detail.plan_executions[0].stage_executions[0].id` of a run report.
pub(crate) fn first_stage_execution_id(run_report: &Value) -> Option<u64> {
    run_report
        .pointer("/detail/plan_executions/0/stage_executions/0/id")
        .and_then(Value::as_u64)
}

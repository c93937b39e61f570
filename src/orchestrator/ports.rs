use async_trait::async_trait;

use crate::{
    orchestrator::{error::OrchestratorError, types::AgentRecord},
    templates::{CompletionReport, StepTemplate},
};

/// REST surface of the orchestration backend, as seen by the registry and
/// the emulation model. Implementations hold no per-agent state.
#[async_trait]
pub trait OrchestratorPort: Send + Sync {
    /// Plain reachability probe of the API root.
    async fn check_connection(&self) -> Result<(), OrchestratorError>;

    /// Creates the worker, or returns the id of an existing one with the same name.
    async fn register_or_reuse_worker(
        &self,
        name: &str,
        description: &str,
    ) -> Result<u64, OrchestratorError>;

    async fn health_check(&self, worker_id: u64) -> Result<bool, OrchestratorError>;

    /// Worker + single-stage dynamic plan + started run for one agent.
    async fn provision_agent_plan(&self, agent_label: &str)
    -> Result<AgentRecord, OrchestratorError>;

    /// Adds the step to the agent's stage, executes it and waits for the report.
    async fn submit_and_await(
        &self,
        template: &StepTemplate,
        agent: &AgentRecord,
    ) -> Result<CompletionReport, OrchestratorError>;
}

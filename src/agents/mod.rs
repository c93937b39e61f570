//! Lazily provisioned orchestration agents, one per acting service.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::orchestrator::{AgentRecord, OrchestratorError, OrchestratorPort};

/// Identity of the acting service an agent works for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorKey {
    pub node: String,
    pub service: String,
}

impl ActorKey {
    pub fn new(node: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.service)
    }
}

struct RegistryState {
    next_agent: u64,
    by_actor: BTreeMap<ActorKey, AgentRecord>,
}

/// Maps actors to their agent records. The lock is held across the
/// provisioning round trip, so two concurrent misses on one key provision once.
pub struct AgentRegistry {
    orchestrator: Arc<dyn OrchestratorPort>,
    label_prefix: String,
    state: Mutex<RegistryState>,
}

impl AgentRegistry {
    pub fn new(orchestrator: Arc<dyn OrchestratorPort>, label_prefix: impl Into<String>) -> Self {
        Self {
            orchestrator,
            label_prefix: label_prefix.into(),
            state: Mutex::new(RegistryState {
                next_agent: 1,
                by_actor: BTreeMap::new(),
            }),
        }
    }

    pub async fn get_or_create(&self, actor: &ActorKey) -> Result<AgentRecord, OrchestratorError> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.by_actor.get(actor) {
            return Ok(record.clone());
        }

        let label = format!("{}-agent-{}", self.label_prefix, state.next_agent);
        tracing::info!(
            target: "agents",
            actor = %actor,
            agent_label = %label,
            "agent_provisioning_started"
        );
        let record = self.orchestrator.provision_agent_plan(&label).await?;

        state.next_agent += 1;
        state.by_actor.insert(actor.clone(), record.clone());
        Ok(record)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.by_actor.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

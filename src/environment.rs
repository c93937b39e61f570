//! In-process host for a behavioral model: assigns request ids, resolves
//! destination nodes, routes composite intents back through itself and keeps
//! the virtual clock.

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    actions::{Action, ActionError, ActionKind, ActionStore, ExecutionEnvironment},
    config::SimulationConfig,
    model::{ActionOutcome, BehavioralModel, CompositeActionManager, ModelError},
    types::{ActionRequest, Node, RequestId, Response, Status, StatusOrigin, StatusValue},
};

/// Simulated hosts addressable by any of their IPs.
#[derive(Debug, Default, Clone)]
pub struct NodeDirectory {
    by_ip: HashMap<Ipv4Addr, Arc<Node>>,
}

impl NodeDirectory {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut by_ip = HashMap::new();
        for node in nodes {
            let node = Arc::new(node);
            for ip in &node.ips {
                by_ip.insert(*ip, Arc::clone(&node));
            }
        }
        Self { by_ip }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.nodes.iter().cloned())
    }

    pub fn node(&self, ip: Ipv4Addr) -> Option<&Node> {
        self.by_ip.get(&ip).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }
}

pub struct Environment {
    model: Arc<dyn BehavioralModel>,
    actions: ActionStore,
    nodes: Option<NodeDirectory>,
    next_request: AtomicU64,
    clock_us: AtomicU64,
}

impl Environment {
    /// Registers the model's descriptions. `nodes` enables destination lookup;
    /// without it every request reaches the model with no node attached.
    pub fn new(
        model: Arc<dyn BehavioralModel>,
        nodes: Option<NodeDirectory>,
    ) -> Result<Self, ActionError> {
        let mut actions = ActionStore::new();
        for description in model.action_descriptions() {
            actions.add(description)?;
        }

        Ok(Self {
            model,
            actions,
            nodes,
            next_request: AtomicU64::new(1),
            clock_us: AtomicU64::new(0),
        })
    }

    pub fn platform(&self) -> &ExecutionEnvironment {
        self.model.platform()
    }

    /// Every action the model offers on its platform, ordered by id.
    pub fn actions(&self) -> Vec<Action> {
        let prefix = format!("{}:", self.model.namespace());
        self.actions.get_prefixed(&prefix, self.platform())
    }

    /// Virtual time consumed by top-level executions so far.
    pub fn now(&self) -> Duration {
        Duration::from_micros(self.clock_us.load(Ordering::SeqCst))
    }

    pub async fn execute(&self, request: ActionRequest) -> Result<ActionOutcome, ModelError> {
        let outcome = self.run(&request).await?;
        let elapsed_us = u64::try_from(outcome.elapsed.as_micros()).unwrap_or(u64::MAX);
        let now_us = self
            .clock_us
            .fetch_add(elapsed_us, Ordering::SeqCst)
            .saturating_add(elapsed_us);

        tracing::info!(
            target: "environment",
            request_id = request.id,
            intent = %request.action.id,
            dst_ip = %request.dst_ip,
            status = %outcome.response.status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            clock_ms = now_us / 1_000,
            "action_executed"
        );
        Ok(outcome)
    }

    async fn run(&self, request: &ActionRequest) -> Result<ActionOutcome, ModelError> {
        if request.action.kind == ActionKind::Composite {
            return self.model.action_flow(request, self).await;
        }

        let Some(nodes) = &self.nodes else {
            return self.model.action_effect(request, None).await;
        };
        match nodes.node(request.dst_ip) {
            Some(node) => self.model.action_effect(request, Some(node)).await,
            None => {
                tracing::debug!(
                    target: "environment",
                    request_id = request.id,
                    dst_ip = %request.dst_ip,
                    "destination_unreachable"
                );
                Ok(ActionOutcome::immediate(
                    Response::to(
                        request,
                        Status::new(StatusOrigin::Network, StatusValue::Failure),
                    )
                    .with_session(request.session.clone()),
                ))
            }
        }
    }
}

#[async_trait]
impl CompositeActionManager for Environment {
    fn next_request_id(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::SeqCst)
    }

    fn action(&self, id: &str) -> Result<Action, ModelError> {
        Ok(self.actions.require(id, self.platform())?)
    }

    async fn call_action(&self, request: ActionRequest) -> Result<Response, ModelError> {
        Ok(self.run(&request).await?.response)
    }
}

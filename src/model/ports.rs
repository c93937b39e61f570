use async_trait::async_trait;

use crate::{
    actions::{Action, ActionDescription, ExecutionEnvironment, Exploit},
    model::{error::ModelError, types::ActionOutcome},
    types::{ActionRequest, Node, RequestId, Response, Session},
};

/// One backend's implementation of the intent surface. Both backends honor
/// the same response contract, so callers cannot tell which one ran.
#[async_trait]
pub trait BehavioralModel: Send + Sync {
    fn namespace(&self) -> &str;

    fn platform(&self) -> &ExecutionEnvironment;

    fn action_descriptions(&self) -> Vec<ActionDescription>;

    /// Executes a DIRECT intent against the destination node, when known.
    async fn action_effect(
        &self,
        request: &ActionRequest,
        node: Option<&Node>,
    ) -> Result<ActionOutcome, ModelError>;

    /// Executes a COMPOSITE intent as a sequence of sub-requests sent through `cam`.
    async fn action_flow(
        &self,
        request: &ActionRequest,
        cam: &dyn CompositeActionManager,
    ) -> Result<ActionOutcome, ModelError>;
}

/// Host-side services a composite flow needs to issue its sub-requests.
#[async_trait]
pub trait CompositeActionManager: Send + Sync {
    fn next_request_id(&self) -> RequestId;

    /// Fresh copy of a registered action.
    fn action(&self, id: &str) -> Result<Action, ModelError>;

    async fn call_action(&self, request: ActionRequest) -> Result<Response, ModelError>;
}

pub trait ExploitStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Exploit>;

    /// `Err` carries the reason the exploit does not apply.
    fn evaluate(&self, exploit: &Exploit, request: &ActionRequest, node: &Node)
    -> Result<(), String>;
}

pub trait SessionFactory: Send + Sync {
    fn create_session(&self, request: &ActionRequest) -> Session;
}

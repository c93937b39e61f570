//! Behavioral models: the dispatcher that turns an abstract intent into a
//! response, backed either by the orchestration service or by an in-process
//! effect engine.

pub mod emulation;
pub mod error;
pub mod memory;
pub mod ports;
pub mod simulation;
pub mod types;

pub use emulation::CrytonModel;
pub use error::{ModelError, ModelErrorKind};
pub use memory::{InMemoryExploitStore, SequentialSessionFactory};
pub use ports::{BehavioralModel, CompositeActionManager, ExploitStore, SessionFactory};
pub use simulation::SimulationModel;
pub use types::ActionOutcome;

use crate::{
    model::error::{missing_parameter, missing_session},
    types::{ActionRequest, Session, Status, StatusOrigin, StatusValue},
};

/// Handler-table key of an action id: everything after the namespace.
pub(crate) fn intent_key(request: &ActionRequest) -> String {
    request.action.fragments().join(":")
}

pub(crate) fn ensure_bound(request: &ActionRequest) -> Result<(), error::ModelError> {
    let unbound = request.action.unbound_parameters();
    if unbound.is_empty() {
        return Ok(());
    }
    Err(missing_parameter(format!(
        "action '{}' is missing parameter(s): {}",
        request.action.id,
        unbound.join(", ")
    )))
}

pub(crate) fn parameter<'a>(
    request: &'a ActionRequest,
    name: &str,
) -> Result<&'a str, error::ModelError> {
    request.action.parameter(name).ok_or_else(|| {
        missing_parameter(format!(
            "action '{}' needs parameter '{}'",
            request.action.id, name
        ))
    })
}

pub(crate) fn current_session(request: &ActionRequest) -> Result<&Session, error::ModelError> {
    request.session.as_ref().ok_or_else(|| {
        missing_session(format!(
            "action '{}' needs an established session",
            request.action.id
        ))
    })
}

/// Response of the fallback handler for intents no table entry matches.
pub(crate) fn unknown_intent(request: &ActionRequest, namespace: &str) -> ActionOutcome {
    tracing::warn!(
        target: "model",
        request_id = request.id,
        intent = %request.action.id,
        namespace = namespace,
        "unknown_intent"
    );
    ActionOutcome::immediate(
        crate::types::Response::to(request, Status::new(StatusOrigin::System, StatusValue::Error))
            .with_session(request.session.clone()),
    )
}

use crate::{
    actions::{ActionError, ActionErrorKind},
    orchestrator::OrchestratorError,
    templates::{TemplateError, TemplateErrorKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    MissingAction,
    MissingParameter,
    MissingSession,
    InvalidRequest,
    ReportNotReady,
    Backend,
}

/// Caller mistakes and backend failures. An action that ran and failed is
/// never a `ModelError`; it is a response with a failure status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
    pub backend: Option<OrchestratorError>,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backend: None,
        }
    }

    pub fn is_caller_error(&self) -> bool {
        self.kind != ModelErrorKind::Backend
    }
}

impl From<OrchestratorError> for ModelError {
    fn from(err: OrchestratorError) -> Self {
        Self {
            kind: ModelErrorKind::Backend,
            message: err.to_string(),
            backend: Some(err),
        }
    }
}

impl From<TemplateError> for ModelError {
    fn from(err: TemplateError) -> Self {
        let kind = match err.kind {
            TemplateErrorKind::ReportNotReady => ModelErrorKind::ReportNotReady,
            TemplateErrorKind::InvalidParameter => ModelErrorKind::InvalidRequest,
        };
        Self::new(kind, err.message)
    }
}

impl From<ActionError> for ModelError {
    fn from(err: ActionError) -> Self {
        let kind = match err.kind {
            ActionErrorKind::UnknownAction => ModelErrorKind::MissingAction,
            ActionErrorKind::UnknownParameter => ModelErrorKind::MissingParameter,
            ActionErrorKind::ValueOutOfDomain | ActionErrorKind::DuplicateAction => {
                ModelErrorKind::InvalidRequest
            }
        };
        Self::new(kind, err.message)
    }
}

pub fn missing_parameter(message: impl Into<String>) -> ModelError {
    ModelError::new(ModelErrorKind::MissingParameter, message)
}

pub fn missing_session(message: impl Into<String>) -> ModelError {
    ModelError::new(ModelErrorKind::MissingSession, message)
}

pub fn invalid_request(message: impl Into<String>) -> ModelError {
    ModelError::new(ModelErrorKind::InvalidRequest, message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionErrorKind {
    UnknownAction,
    UnknownParameter,
    ValueOutOfDomain,
    DuplicateAction,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub fn unknown_action(message: impl Into<String>) -> ActionError {
    ActionError::new(ActionErrorKind::UnknownAction, message)
}

pub fn unknown_parameter(message: impl Into<String>) -> ActionError {
    ActionError::new(ActionErrorKind::UnknownParameter, message)
}

pub fn value_out_of_domain(message: impl Into<String>) -> ActionError {
    ActionError::new(ActionErrorKind::ValueOutOfDomain, message)
}

pub fn duplicate_action(message: impl Into<String>) -> ActionError {
    ActionError::new(ActionErrorKind::DuplicateAction, message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    ReportNotReady,
    InvalidParameter,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TemplateError {
    pub kind: TemplateErrorKind,
    pub message: String,
}

impl TemplateError {
    pub fn new(kind: TemplateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub fn report_not_ready(message: impl Into<String>) -> TemplateError {
    TemplateError::new(TemplateErrorKind::ReportNotReady, message)
}

pub fn invalid_parameter(message: impl Into<String>) -> TemplateError {
    TemplateError::new(TemplateErrorKind::InvalidParameter, message)
}

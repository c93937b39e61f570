/// Backend unreachable or rejected the call. Callers never branch on the
/// cause; the failing endpoint is always attached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{endpoint}: {message}")]
pub struct OrchestratorError {
    pub endpoint: String,
    pub message: String,
    pub http_status: Option<u16>,
}

impl OrchestratorError {
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_http_status(mut self, http_status: u16) -> Self {
        self.http_status = Some(http_status);
        self
    }
}

pub fn unreachable(endpoint: impl Into<String>, err: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::new(endpoint, format!("request failed: {}", err))
}

pub fn rejected(endpoint: impl Into<String>, http_status: u16, body: &str) -> OrchestratorError {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("backend rejected the call with HTTP {}", http_status)
    } else {
        format!(
            "backend rejected the call with HTTP {}: {}",
            http_status,
            body.chars().take(512).collect::<String>()
        )
    };
    OrchestratorError::new(endpoint, message).with_http_status(http_status)
}

pub fn malformed(endpoint: impl Into<String>, message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::new(endpoint, message)
}

use std::time::Duration;

use crate::types::Response;

/// Response plus the time the action took; the host advances its clock by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub elapsed: Duration,
    pub response: Response,
}

impl ActionOutcome {
    pub fn new(elapsed: Duration, response: Response) -> Self {
        Self { elapsed, response }
    }

    pub fn immediate(response: Response) -> Self {
        Self::new(Duration::ZERO, response)
    }
}

use std::time::Duration;

use crate::config::OrchestratorConfig;

/// How long to sleep between step-execution status reads.
///
/// The default is a fixed interval with no ceiling: the wait ends only when
/// the backend reports the terminal state. `timeout` only abandons the local
/// wait; a step already submitted keeps running on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub backoff_max: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            backoff_max: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            backoff_max: config.poll_backoff_max_ms.map(Duration::from_millis),
            timeout: config.poll_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn with_backoff(mut self, backoff_max: Duration) -> Self {
        self.backoff_max = Some(backoff_max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn first_delay(&self) -> Duration {
        self.interval
    }

    pub fn next_delay(&self, previous: Duration) -> Duration {
        match self.backoff_max {
            Some(ceiling) => previous.saturating_mul(2).min(ceiling.max(self.interval)),
            None => self.interval,
        }
    }

    pub fn expired(&self, waited: Duration) -> bool {
        self.timeout.is_some_and(|timeout| waited >= timeout)
    }
}

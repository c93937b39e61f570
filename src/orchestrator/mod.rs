//! Remote orchestration backend (Cryton) access: the port the rest of the
//! crate depends on, and its REST implementation.

pub mod client;
pub mod error;
pub mod poll;
pub mod ports;
pub mod types;

pub use client::CrytonClient;
pub use error::OrchestratorError;
pub use poll::PollPolicy;
pub use ports::OrchestratorPort;
pub use types::{AgentRecord, PlanTemplate, WORKER_DESCRIPTION};

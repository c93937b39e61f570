pub mod actions;
pub mod agents;
pub mod cli;
pub mod config;
pub mod environment;
pub mod logging;
pub mod model;
pub mod net;
pub mod orchestrator;
pub mod scenario;
pub mod templates;
pub mod types;

//! Per-intent step templates for the orchestration backend, and the pure
//! transforms that turn a finished step's raw output into [`Content`].
//!
//! [`Content`]: crate::types::Content

pub mod builders;
pub mod error;
pub mod parsers;
pub mod types;

pub use builders::{
    ExecuteCommand, ExfiltrateData, ExploitServer, ExploitedService, FindData, FindServices,
    ScanNetwork, SessionListener, StepBuilder, UpdateRouting, UpgradeSession,
};
pub use error::{TemplateError, TemplateErrorKind};
pub use types::{
    CompletionReport, ModuleFamily, StepArguments, StepExecution, StepTemplate, SuccessSentinels,
    ToolClass,
};

pub mod error;
pub mod store;
pub mod types;

pub use error::{ActionError, ActionErrorKind};
pub use store::ActionStore;
pub use types::{
    Action, ActionDescription, ActionKind, ActionParameter, ActionParameterKind,
    ExecutionEnvironment, Exploit, ExploitCategory, ParameterDomain, PlatformKind,
};

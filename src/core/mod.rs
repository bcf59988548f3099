//! Runtime core: configuration, scopes, the task runner, and the blocking
//! entry point.

mod config;
mod runner;
mod runtime;

pub(crate) mod scope;

pub use config::Config;
pub use runtime::{run_blocking, Runtime, RuntimeBuilder};
pub use scope::Scope;

//! Deployment module

pub mod executor;
pub mod git;
pub mod template;

pub use executor::{HookExecutor, HookRun};

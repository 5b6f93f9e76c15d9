//! pod library
//!
//! Registry, deploy pipeline, webhook handling and supervisor reconciliation
//! behind the `pod` binary.

pub mod app;
pub mod cli;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod lifecycle;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod utils;
pub mod webhook;

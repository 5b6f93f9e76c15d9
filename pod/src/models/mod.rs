//! Data models

pub mod app;
pub mod deploy;
pub mod process;

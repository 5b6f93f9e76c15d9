//! App lifecycle: status derivation, listings and supervisor reconciliation

pub mod format;
pub mod reconciler;
pub mod status;

pub use reconciler::{Reconciler, StartResult, StopResult};
pub use status::{AppStatus, AppView};

//! Webhook and dashboard HTTP server

pub mod auth;
pub mod handlers;
pub mod serve;
pub mod state;

pub use serve::{build_router, serve};
pub use state::{Credentials, ServerState};

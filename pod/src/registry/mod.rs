//! App registry: config file, storage layout and store

pub mod config;
pub mod layout;
pub mod store;

pub use config::{PodConfig, WebConfig, WEB_SERVICE_ID};
pub use layout::StorageLayout;
pub use store::RegistryStore;

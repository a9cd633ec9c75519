pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lease;

pub use api::{LeaseGrant, RegistryApi};
pub use config::DiscoveryClientConfig;
pub use discovery::{DiscoveryClient, DiscoveryClientBuilder};
pub use error::DiscoveryError;
pub use lease::{HeartbeatStats, LeaseManager, LeaseStatus};

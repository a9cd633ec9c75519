pub mod client;
pub mod registry;

pub use client::{DiscoveryClient, DiscoveryError, LeaseManager};
pub use registry::{ExpirationSweeper, Instance, LeaseConfig, RegistrationService, RegistryStore};

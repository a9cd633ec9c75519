//! Registry service module
//!
//! This module contains the lease-based instance registry split into logical components:
//! - `types`: Instance record and lease configuration
//! - `store`: Concurrent group-striped instance storage
//! - `sweeper`: Background eviction of expired leases
//! - `service`: Registration operations on top of the store
//! - `http_impl`: REST routes exposing the service

pub mod error;
pub mod http_impl;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-export public types for easier access
pub use error::RegistryError;
pub use http_impl::{ApiError, EXPIRED_TIME_HEADER, router};
pub use service::{Registration, RegistrationService};
pub use store::{RegistrySnapshot, RegistryStore};
pub use sweeper::ExpirationSweeper;
pub use types::{Instance, LeaseConfig, Metadata};

//! Client for the Quay registry API
//!
//! Every call reports the HTTP status alongside the decoded body so callers
//! can interpret "absent" statuses (404, 400, 403) as signals rather than
//! failures.

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{
    QuayClient, QuayClientFactory, RegistryClient, RegistryClientFactory, RegistryResponse,
};
pub use error::RegistryError;
pub use types::{
    Organization, Prototype, PrototypeDelegate, PrototypesResponse, Repository, RobotAccount, Role,
};

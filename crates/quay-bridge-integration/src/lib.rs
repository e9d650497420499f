//! QuayIntegration reconciler for the Quay bridge
//!
//! Records on the integration's status when a spec change was last
//! observed. Only spec changes cause a status write.

#![deny(missing_docs)]

pub mod cache;
pub mod controller;

pub use cache::LastSeenSpec;
pub use controller::{error_policy, reconcile, Context, ContextBuilder, KubeClient, KubeClientImpl};

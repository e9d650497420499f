//! Namespace reconciler for the Quay bridge
//!
//! Onboards allowed namespaces into the registry: one organization per
//! namespace, robot accounts with pull secrets for the platform service
//! accounts, and one repository per ImageStream.

#![deny(missing_docs)]

pub mod controller;
pub mod robot;
pub mod state;

#[cfg(test)]
mod testing;

pub use controller::{
    error_policy, image_stream_namespace, reconcile, Context, ContextBuilder, KubeClient,
    KubeClientImpl, RESYNC_INTERVAL,
};
pub use robot::{secret_links, SecretLinks, ROLE_MATRIX};
pub use state::NamespaceState;

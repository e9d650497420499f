//! Build integration for the Quay bridge
//!
//! The admission webhook redirects ImageStreamTag build outputs to the
//! registry and records where the image belongs. Once such a build
//! completes, the reconciler imports the pushed image back into the
//! ImageStream.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod destination;
pub mod state;
pub mod webhook;

pub use client::{KubeClient, KubeClientImpl};
pub use controller::{error_policy, reconcile, Context, ContextBuilder};
pub use destination::{DestinationError, ImageStreamTagRef};
pub use state::BuildState;
pub use webhook::{mutate_handler, WebhookError, WebhookState};

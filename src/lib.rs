//! Quay bridge - connects OpenShift namespaces and builds to a Quay registry
//!
//! # Modules
//!
//! - [`config`] - Process mode switches read from the environment
//! - [`controller_runner`] - Wires the namespace, build, and integration controllers
//! - [`webhook`] - HTTP(S) server for the build mutation webhook

#![deny(missing_docs)]

pub mod config;
pub mod controller_runner;
pub mod webhook;

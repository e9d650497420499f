//! Lifecycle state of a namespace as seen by the bridge
//!
//! The durable state lives on the Namespace itself (finalizer, deletion
//! timestamp, project annotations). This module only reads it.

use k8s_openapi::api::core::v1::Namespace;
use quay_bridge_common::kube_utils::{has_annotation, has_finalizer, is_being_deleted};
use quay_bridge_common::{
    NAMESPACE_FINALIZER, OPENSHIFT_DESCRIPTION_ANNOTATION, OPENSHIFT_DISPLAY_NAME_ANNOTATION,
    OPENSHIFT_SCC_MCS_ANNOTATION,
};

/// Where a namespace stands in the bridge lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceState {
    /// Rejected by the allow/deny policy
    Unmanaged,
    /// A project whose initialization upstream has not finished yet
    Initializing,
    /// Allowed but not yet carrying the finalizer
    PendingFinalizer,
    /// Finalizer present; registry resources are kept in sync
    Managed,
    /// Deletion requested while the finalizer is still held
    Terminating,
    /// Deleted, or deleting without our finalizer
    Gone,
}

impl NamespaceState {
    /// Classify a namespace.
    ///
    /// A namespace that already holds the finalizer is torn down on deletion
    /// even if the policy has since changed to reject it.
    pub fn of(namespace: &Namespace, allowed: bool) -> Self {
        let finalized = has_finalizer(namespace, NAMESPACE_FINALIZER);

        if is_being_deleted(namespace) {
            return if finalized {
                NamespaceState::Terminating
            } else {
                NamespaceState::Gone
            };
        }
        if !allowed {
            return NamespaceState::Unmanaged;
        }
        if finalized {
            return NamespaceState::Managed;
        }
        if is_uninitialized_project(namespace) {
            NamespaceState::Initializing
        } else {
            NamespaceState::PendingFinalizer
        }
    }

    /// Whether this state talks to the registry
    pub fn needs_registry(self) -> bool {
        matches!(self, NamespaceState::Managed | NamespaceState::Terminating)
    }
}

/// Project metadata is present but the SCC annotations have not been assigned
fn is_uninitialized_project(namespace: &Namespace) -> bool {
    has_annotation(namespace, OPENSHIFT_DISPLAY_NAME_ANNOTATION)
        && has_annotation(namespace, OPENSHIFT_DESCRIPTION_ANNOTATION)
        && !has_annotation(namespace, OPENSHIFT_SCC_MCS_ANNOTATION)
}

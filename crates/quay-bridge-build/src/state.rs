//! Import state of a Build, read from its annotations and phase

use quay_bridge_common::crd::Build;
use quay_bridge_common::kube_utils::has_annotation;
use quay_bridge_common::{BUILD_IMPORTED_ANNOTATION, BUILD_MANAGED_ANNOTATION};

/// Where a build stands in the deferred import
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    /// Output was not redirected by the webhook
    Unmanaged,
    /// Redirected; the build has not completed successfully (yet)
    Pending,
    /// Redirected and complete; the image has not been imported yet
    ReadyToImport,
    /// Import already requested
    Imported,
}

impl BuildState {
    /// Classify a build
    pub fn of(build: &Build) -> Self {
        if !has_annotation(build, BUILD_MANAGED_ANNOTATION) {
            BuildState::Unmanaged
        } else if has_annotation(build, BUILD_IMPORTED_ANNOTATION) {
            BuildState::Imported
        } else if build.is_complete() {
            BuildState::ReadyToImport
        } else {
            BuildState::Pending
        }
    }
}

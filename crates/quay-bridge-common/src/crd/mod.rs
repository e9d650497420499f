//! Custom Resource Definitions used by the Quay bridge
//!
//! `QuayIntegration` is owned by this operator. The OpenShift build and image
//! types are consumed only; they carry just the fields the reconcilers read or
//! write.

mod openshift;
mod quay_integration;
mod types;

pub use openshift::{
    Build, BuildOutput, BuildSpec, BuildStatus, BuildStrategy, ImageImportSpec, ImageStream,
    ImageStreamImport, ImageStreamImportSpec, ImageStreamImportStatus, ImageStreamSpec,
    OutputReference, TagImportPolicy, TagReferencePolicy, BUILD_PHASE_COMPLETE,
    OUTPUT_KIND_DOCKER_IMAGE, OUTPUT_KIND_IMAGE_STREAM_TAG,
};
pub use quay_integration::{QuayIntegration, QuayIntegrationSpec, QuayIntegrationStatus};
pub use types::{Condition, ConditionStatus, SecretRef};

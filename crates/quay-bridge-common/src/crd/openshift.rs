//! OpenShift build and image resources consumed by the bridge
//!
//! Only the fields read or written by the reconcilers are modelled. Schemas
//! are disabled since these CRDs are owned by the platform, not this operator.

use k8s_openapi::api::core::v1::{LocalObjectReference, ObjectReference};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Build phase reported once the output image has been pushed
pub const BUILD_PHASE_COMPLETE: &str = "Complete";

/// Output kind the webhook redirects to the registry
pub const OUTPUT_KIND_IMAGE_STREAM_TAG: &str = "ImageStreamTag";

/// Output kind pointing at an external image reference
pub const OUTPUT_KIND_DOCKER_IMAGE: &str = "DockerImage";

/// build.openshift.io/v1 Build
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "Build",
    namespaced,
    status = "BuildStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    /// How the image is built
    #[serde(default)]
    pub strategy: BuildStrategy,

    /// Where the built image is pushed
    #[serde(default)]
    pub output: BuildOutput,
}

/// Build strategy selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStrategy {
    /// Strategy type (Docker, Source, Custom, JenkinsPipeline)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Docker strategy options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_strategy: Option<serde_json::Value>,

    /// Source-to-image strategy options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_strategy: Option<serde_json::Value>,
}

impl BuildStrategy {
    /// Docker and source builds push their own output and can be redirected
    pub fn pushes_output(&self) -> bool {
        matches!(self.type_.as_deref(), Some("Docker") | Some("Source"))
            || self.docker_strategy.is_some()
            || self.source_strategy.is_some()
    }
}

/// Build output
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    /// Push target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<OutputReference>,
}

/// Reference to the object a build pushes to
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputReference {
    /// ImageStreamTag, ImageStreamImage or DockerImage
    #[serde(default)]
    pub kind: String,

    /// Object name or image reference
    #[serde(default)]
    pub name: String,

    /// Namespace of the target; the build's namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl OutputReference {
    /// Whether this output targets an ImageStreamTag
    pub fn is_image_stream_tag(&self) -> bool {
        self.kind == OUTPUT_KIND_IMAGE_STREAM_TAG
    }
}

/// Build status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    /// New, Pending, Running, Complete, Failed, Error, Cancelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl Build {
    /// Push target of the build, if any
    pub fn output_to(&self) -> Option<&OutputReference> {
        self.spec.output.to.as_ref()
    }

    /// Whether the build reached its terminal success phase
    pub fn is_complete(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == BUILD_PHASE_COMPLETE)
    }
}

/// image.openshift.io/v1 ImageStream
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    /// Upstream repository tracked by the stream, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_repository: Option<String>,
}

/// image.openshift.io/v1 ImageStreamImport
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStreamImport",
    namespaced,
    status = "ImageStreamImportStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamImportSpec {
    /// Persist the imported tags on the ImageStream
    #[serde(default)]
    pub import: bool,

    /// Individual images to import
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageImportSpec>,
}

/// One image to import into a tag
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageImportSpec {
    /// Source image (kind DockerImage)
    pub from: ObjectReference,

    /// Destination tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<LocalObjectReference>,

    /// Import behaviour
    #[serde(default)]
    pub import_policy: TagImportPolicy,

    /// How the tag is referenced from pods
    #[serde(default)]
    pub reference_policy: TagReferencePolicy,
}

/// Tag import behaviour
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagImportPolicy {
    /// Allow importing from registries with invalid TLS
    #[serde(default)]
    pub insecure: bool,

    /// Periodically re-import the tag
    #[serde(default)]
    pub scheduled: bool,
}

/// Tag reference policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TagReferencePolicy {
    /// Source or Local
    #[serde(rename = "type", default)]
    pub type_: String,
}

impl TagReferencePolicy {
    /// Pull from the source registry rather than the cluster's internal one
    pub fn source() -> Self {
        Self {
            type_: "Source".to_string(),
        }
    }
}

/// ImageStreamImport status as returned by the API server
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ImageStreamImportStatus {
    /// Per-image import results
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<serde_json::Value>,
}

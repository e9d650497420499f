//! Build Mutation Webhook
//!
//! Handles AdmissionReview requests for Builds. A Docker or Source build
//! pushing to an ImageStreamTag in a bridged namespace is redirected to the
//! namespace's registry organization, and annotated so the completion
//! reconciler can import the image back into the ImageStream.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info, warn};

use quay_bridge_common::crd::{Build, OUTPUT_KIND_DOCKER_IMAGE};
use quay_bridge_common::integration::select_active;
use quay_bridge_common::{BUILD_DESTINATION_ANNOTATION, BUILD_MANAGED_ANNOTATION};

use crate::client::KubeClient;
use crate::destination::ImageStreamTagRef;

/// Platform service account that runs builds and pushes their output
pub const BUILDER_SERVICE_ACCOUNT: &str = "builder";

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The admission review request was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    /// An error occurred during JSON serialization/deserialization
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidReview(_) => StatusCode::BAD_REQUEST,
            WebhookError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Kubernetes access for integrations and service accounts
    pub kube: Arc<dyn KubeClient>,
}

impl WebhookState {
    /// Create a new webhook state with the given Kubernetes client
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }
}

/// Handle mutating admission review for Builds
///
/// A review without a request is rejected with 400; every other outcome
/// is expressed in the returned AdmissionResponse.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let request: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Err(WebhookError::InvalidReview(e.to_string()));
        }
    };

    let response = mutate_build(&state, &request).await;
    Ok(Json(response.into_review()))
}

/// Process a single build mutation request
async fn mutate_build(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = request.uid.clone();
    let allow = || AdmissionResponse::from(request);

    let Some(object) = &request.object else {
        debug!(uid = %uid, "No build object in request, allowing unchanged");
        return allow();
    };

    let build = match decode_build(object) {
        Ok(build) => build,
        Err(e) => {
            error!(uid = %uid, error = %e, "Could not decode build");
            return AdmissionResponse::invalid(e.to_string());
        }
    };

    let Some(output) = build.output_to().filter(|to| to.is_image_stream_tag()) else {
        debug!(uid = %uid, "Build output is not an ImageStreamTag, allowing unchanged");
        return allow();
    };
    if !build.spec.strategy.pushes_output() {
        debug!(uid = %uid, "Build strategy does not push its output, allowing unchanged");
        return allow();
    }

    let Some(namespace) = request.namespace.clone().or_else(|| build.metadata.namespace.clone())
    else {
        return AdmissionResponse::invalid("Build request carries no namespace");
    };

    let integrations = match state.kube.list_integrations().await {
        Ok(list) => list,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to list QuayIntegrations");
            return allow().deny(e.to_string());
        }
    };
    let integration = match select_active(integrations) {
        Ok(integration) => integration,
        Err(e) => {
            error!(
                uid = %uid,
                namespace = %namespace,
                reason = "ConfigurationError",
                error = %e,
                "No usable QuayIntegration, allowing build unchanged"
            );
            let mut response = allow();
            response.warnings = Some(vec![format!("ConfigurationError: {e}")]);
            return response;
        }
    };
    let spec = &integration.spec;

    if !spec.is_allowed_namespace(&namespace) {
        debug!(uid = %uid, namespace = %namespace, "Namespace not bridged, allowing unchanged");
        return allow();
    }

    let pull_secret = spec.pull_secret_name(BUILDER_SERVICE_ACCOUNT);
    match builder_has_pull_secret(state.kube.as_ref(), &namespace, &pull_secret).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(uid = %uid, namespace = %namespace, secret = %pull_secret, "Builder pull secret not linked yet, denying");
            return allow().deny(format!(
                "Service account '{}' in namespace '{}' does not reference pull secret '{}' yet",
                BUILDER_SERVICE_ACCOUNT, namespace, pull_secret
            ));
        }
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to read builder service account");
            return allow().deny(e.to_string());
        }
    }

    let destination_namespace = output.namespace.clone().unwrap_or_else(|| namespace.clone());
    let destination = match ImageStreamTagRef::from_output(&destination_namespace, &output.name) {
        Ok(destination) => destination,
        Err(e) => {
            warn!(uid = %uid, output = %output.name, error = %e, "Malformed ImageStreamTag name");
            return AdmissionResponse::invalid(format!("{}: '{}'", e, e.value()));
        }
    };

    let registry_host = match spec.registry_hostname() {
        Ok(host) => host,
        Err(e) => {
            error!(uid = %uid, error = %e, "Invalid registry hostname");
            return allow().deny(e.to_string());
        }
    };
    let image = destination.docker_image(
        &registry_host,
        &spec.organization_for(&destination.namespace),
    );

    info!(
        uid = %uid,
        build = ?build.metadata.name,
        destination = %destination,
        image = %image,
        "Redirecting build output to registry"
    );

    let ops = patch_operations(&build, &destination, &image);
    match allow().with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::invalid(format!("patch serialization error: {e}"))
        }
    }
}

fn decode_build(object: &DynamicObject) -> Result<Build, WebhookError> {
    let value = serde_json::to_value(object)?;
    Ok(serde_json::from_value(value)?)
}

async fn builder_has_pull_secret(
    kube: &dyn KubeClient,
    namespace: &str,
    secret: &str,
) -> Result<bool, quay_bridge_common::Error> {
    let builder = kube
        .get_service_account(BUILDER_SERVICE_ACCOUNT, namespace)
        .await?;
    Ok(builder
        .and_then(|sa| sa.image_pull_secrets)
        .is_some_and(|refs| refs.iter().any(|r| r.name == secret)))
}

/// JSON patch redirecting the build output and recording its destination
fn patch_operations(
    build: &Build,
    destination: &ImageStreamTagRef,
    image: &str,
) -> Vec<PatchOperation> {
    let mut ops = vec![
        PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "output", "to", "kind"]),
            value: serde_json::Value::String(OUTPUT_KIND_DOCKER_IMAGE.to_string()),
        }),
        PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "output", "to", "name"]),
            value: serde_json::Value::String(image.to_string()),
        }),
    ];

    if build
        .output_to()
        .is_some_and(|to| to.namespace.is_some())
    {
        ops.push(PatchOperation::Remove(RemoveOperation {
            path: PointerBuf::from_tokens(["spec", "output", "to", "namespace"]),
        }));
    }

    let annotations = [
        (BUILD_MANAGED_ANNOTATION, "true".to_string()),
        (BUILD_DESTINATION_ANNOTATION, destination.to_string()),
    ];
    if build.metadata.annotations.is_none() {
        let map: BTreeMap<&str, String> = annotations.into_iter().collect();
        ops.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", "annotations"]),
            value: serde_json::json!(map),
        }));
    } else {
        for (key, value) in annotations {
            ops.push(PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens(["metadata", "annotations", key]),
                value: serde_json::Value::String(value),
            }));
        }
    }

    ops
}

//! Build completion reconciler
//!
//! Builds redirected by the webhook push straight to the registry, so the
//! ImageStream they originally targeted never sees the new image. Once such
//! a build completes, an ImageStreamImport pulls the image back in and the
//! build is annotated so it is never imported twice.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{LocalObjectReference, ObjectReference};
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument};

use quay_bridge_common::crd::{
    Build, ImageImportSpec, ImageStreamImport, ImageStreamImportSpec, QuayIntegrationSpec,
    TagImportPolicy, TagReferencePolicy, OUTPUT_KIND_DOCKER_IMAGE,
};
use quay_bridge_common::events::{EventPublisher, KubeEventPublisher, Transition};
use quay_bridge_common::integration::require_single;
use quay_bridge_common::kube_utils::{annotation, object_ref};
use quay_bridge_common::{
    report_error, ReconcileError, BUILD_DESTINATION_ANNOTATION, BUILD_IMPORTED_ANNOTATION,
    CONTROLLER_NAME,
};

use crate::client::{KubeClient, KubeClientImpl};
use crate::destination::ImageStreamTagRef;
use crate::state::BuildState;

/// Controller context for build reconciliation
pub struct Context {
    /// Kubernetes client (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Event publisher for failures and imports
    pub events: Arc<dyn EventPublisher>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>, events: Arc<dyn EventPublisher>) -> Self {
        Self { kube, events }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            events: None,
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
        }
    }
}

/// Reconcile a Build
#[instrument(skip(build, ctx), fields(build = %build.name_any(), namespace = %build.namespace().unwrap_or_default()))]
pub async fn reconcile(build: Arc<Build>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    match reconcile_build(&build, &ctx).await {
        Ok(action) => Ok(action),
        Err(err) => {
            report_error(&err, ctx.events.as_ref()).await;
            Err(err)
        }
    }
}

/// Requeue policy for failed reconciles
pub fn error_policy(_build: Arc<Build>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error.action()
}

async fn reconcile_build(build: &Build, ctx: &Context) -> Result<Action, ReconcileError> {
    let state = BuildState::of(build);
    if state != BuildState::ReadyToImport {
        debug!(?state, "nothing to import");
        return Ok(Action::await_change());
    }

    let object = object_ref(build);
    let name = build.name_any();
    let namespace = build.namespace().unwrap_or_default();

    let Some(raw) = annotation(build, BUILD_DESTINATION_ANNOTATION) else {
        debug!("no destination recorded, nothing to import");
        return Ok(Action::await_change());
    };
    let destination = ImageStreamTagRef::parse(raw).map_err(|e| {
        ReconcileError::processing(object.clone(), e.to_string())
            .with("Namespace", &namespace)
            .with("Build", &name)
            .with("Annotation", raw)
            .with("Expected Size", e.expected())
            .with("Actual Size", e.actual())
    })?;

    let image = build
        .output_to()
        .map(|to| to.name.clone())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ReconcileError::processing(object.clone(), "Build has no output image")
                .with("Namespace", &namespace)
                .with("Build", &name)
        })?;

    info!(
        destination = %destination,
        image = %image,
        "Importing ImageStream after Build"
    );

    let integrations = ctx.kube.list_integrations().await.map_err(|e| {
        ReconcileError::from_error(object.clone(), "Error listing QuayIntegrations", e)
    })?;
    let integration = require_single(integrations, &object)?;

    let image_stream = ctx
        .kube
        .get_image_stream(&destination.name, &destination.namespace)
        .await
        .map_err(|e| {
            ReconcileError::processing(object.clone(), "Unable to locate ImageStream")
                .with("Namespace", &destination.namespace)
                .with("ImageStream", &destination.name)
                .caused_by(e)
        })?
        .ok_or_else(|| {
            ReconcileError::processing(object.clone(), "Unable to locate ImageStream")
                .with("Namespace", &destination.namespace)
                .with("ImageStream", &destination.name)
        })?;

    let import = image_stream_import(
        &destination,
        image_stream.resource_version(),
        &image,
        &integration.spec,
    );
    ctx.kube
        .create_image_stream_import(&import)
        .await
        .map_err(|e| {
            ReconcileError::processing(object.clone(), "Error occurred creating ImageStreamImport")
                .with("Namespace", &destination.namespace)
                .with("ImageStream", &destination.name)
                .caused_by(e)
        })?;

    ctx.kube
        .annotate_build(&name, &namespace, BUILD_IMPORTED_ANNOTATION, "true")
        .await
        .map_err(|e| {
            ReconcileError::processing(object.clone(), "Error occurred updating Build")
                .with("Namespace", &namespace)
                .with("Build", &name)
                .caused_by(e)
        })?;

    ctx.events
        .record(
            &object,
            Transition::ImageImported,
            format!("Imported {} into {}", image, destination),
        )
        .await;

    Ok(Action::await_change())
}

/// Import request pulling `image` into the destination tag
fn image_stream_import(
    destination: &ImageStreamTagRef,
    resource_version: Option<String>,
    image: &str,
    spec: &QuayIntegrationSpec,
) -> ImageStreamImport {
    ImageStreamImport {
        metadata: ObjectMeta {
            name: Some(destination.name.clone()),
            namespace: Some(destination.namespace.clone()),
            resource_version,
            ..Default::default()
        },
        spec: ImageStreamImportSpec {
            import: true,
            images: vec![ImageImportSpec {
                from: ObjectReference {
                    kind: Some(OUTPUT_KIND_DOCKER_IMAGE.to_string()),
                    name: Some(image.to_string()),
                    ..Default::default()
                },
                to: Some(LocalObjectReference {
                    name: destination.tag.clone(),
                }),
                import_policy: TagImportPolicy {
                    insecure: spec.insecure_registry,
                    scheduled: spec.scheduled_image_stream_import,
                },
                reference_policy: TagReferencePolicy::source(),
            }],
        },
        status: None,
    }
}

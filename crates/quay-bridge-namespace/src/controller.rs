//! Namespace controller implementation
//!
//! Every allowed namespace is backed by a registry organization named
//! `lowercase(clusterID)_namespace`. The controller adds a finalizer on
//! admission, keeps the organization, robot accounts, and repositories in
//! sync while the namespace lives, and deletes the organization before
//! releasing the finalizer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ObjectReference, Secret, ServiceAccount};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use quay_bridge_common::crd::{ImageStream, QuayIntegration, QuayIntegrationSpec};
use quay_bridge_common::events::{EventPublisher, KubeEventPublisher, Transition};
use quay_bridge_common::integration::{credential_token, require_single};
use quay_bridge_common::kube_utils::{finalizers_with, finalizers_without, object_ref};
use quay_bridge_common::{
    report_error, Error, ReconcileError, CONTROLLER_NAME, FIELD_MANAGER, NAMESPACE_FINALIZER,
};
use quay_bridge_registry::{QuayClientFactory, RegistryClient, RegistryClientFactory};

use crate::robot::{RobotProvisioner, SecretLinks};
use crate::state::NamespaceState;

/// Interval at which managed namespaces are re-synced against the registry
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Trait abstracting Kubernetes client operations for the namespace controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// List all QuayIntegrations
    async fn list_integrations(&self) -> Result<Vec<QuayIntegration>, Error>;

    /// Get a Secret by name and namespace
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;

    /// Create or replace a Secret with server-side apply
    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Get a ServiceAccount by name and namespace
    async fn get_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ServiceAccount>, Error>;

    /// Replace the pull-secret and secret reference lists of a ServiceAccount
    async fn patch_service_account_secrets(
        &self,
        name: &str,
        namespace: &str,
        links: &SecretLinks,
    ) -> Result<(), Error>;

    /// List ImageStreams in a namespace
    async fn list_image_streams(&self, namespace: &str) -> Result<Vec<ImageStream>, Error>;

    /// Add a finalizer to a Namespace
    async fn add_namespace_finalizer(&self, name: &str, finalizer: &str) -> Result<(), Error>;

    /// Remove a finalizer from a Namespace
    async fn remove_namespace_finalizer(&self, name: &str, finalizer: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn list_integrations(&self) -> Result<Vec<QuayIntegration>, Error> {
        let api: Api<QuayIntegration> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        let namespace = secret
            .namespace()
            .ok_or_else(|| Error::internal("secret has no namespace"))?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &secret.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(secret),
        )
        .await?;
        Ok(())
    }

    async fn get_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ServiceAccount>, Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_service_account_secrets(
        &self,
        name: &str,
        namespace: &str,
        links: &SecretLinks,
    ) -> Result<(), Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "imagePullSecrets": links.image_pull_secrets,
            "secrets": links.secrets,
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn list_image_streams(&self, namespace: &str) -> Result<Vec<ImageStream>, Error> {
        let api: Api<ImageStream> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn add_namespace_finalizer(&self, name: &str, finalizer: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = api.get(name).await?;
        if namespace.finalizers().iter().any(|f| f == finalizer) {
            return Ok(());
        }

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers_with(&namespace, finalizer)
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_namespace_finalizer(&self, name: &str, finalizer: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let Some(namespace) = api.get_opt(name).await? else {
            return Ok(());
        };

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers_without(&namespace, finalizer)
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Controller context for namespace reconciliation
pub struct Context {
    /// Kubernetes client (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Builds registry clients from the active integration
    pub registry: Arc<dyn RegistryClientFactory>,
    /// Event publisher for failures and transitions
    pub events: Arc<dyn EventPublisher>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        registry: Arc<dyn RegistryClientFactory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            kube,
            registry,
            events,
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    registry: Option<Arc<dyn RegistryClientFactory>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            registry: None,
            events: None,
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the registry client factory
    pub fn registry_factory(mut self, registry: Arc<dyn RegistryClientFactory>) -> Self {
        self.registry = Some(registry);
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
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(QuayClientFactory)),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
        }
    }
}

/// Map an ImageStream event to its namespace
pub fn image_stream_namespace(image_stream: ImageStream) -> Option<ObjectRef<Namespace>> {
    image_stream.namespace().map(|ns| ObjectRef::new(&ns))
}

/// Reconcile a Namespace
///
/// Failures are logged and recorded as Warning events on the namespace
/// before being handed to [`error_policy`].
#[instrument(skip(namespace, ctx), fields(namespace = %namespace.name_any()))]
pub async fn reconcile(
    namespace: Arc<Namespace>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    match reconcile_namespace(&namespace, &ctx).await {
        Ok(action) => Ok(action),
        Err(err) => {
            report_error(&err, ctx.events.as_ref()).await;
            Err(err)
        }
    }
}

/// Requeue policy for failed reconciles
pub fn error_policy(_namespace: Arc<Namespace>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error.action()
}

async fn reconcile_namespace(namespace: &Namespace, ctx: &Context) -> Result<Action, ReconcileError> {
    let name = namespace.name_any();
    let object = object_ref(namespace);

    let integrations = ctx.kube.list_integrations().await.map_err(|e| {
        ReconcileError::from_error(object.clone(), "Error listing QuayIntegrations", e)
    })?;
    let integration = require_single(integrations, &object)?;
    let spec = &integration.spec;

    let state = NamespaceState::of(namespace, spec.is_allowed_namespace(&name));
    debug!(?state, "namespace classified");

    match state {
        NamespaceState::Unmanaged | NamespaceState::Initializing | NamespaceState::Gone => {
            Ok(Action::await_change())
        }
        NamespaceState::PendingFinalizer => {
            ctx.kube
                .add_namespace_finalizer(&name, NAMESPACE_FINALIZER)
                .await
                .map_err(|e| {
                    ReconcileError::from_error(object.clone(), "Failed to add finalizer", e)
                        .with("Namespace", &name)
                })?;
            info!("namespace admitted");
            ctx.events
                .record(
                    &object,
                    Transition::NamespaceManaged,
                    format!(
                        "Namespace bridged to organization {}",
                        spec.organization_for(&name)
                    ),
                )
                .await;
            Ok(Action::await_change())
        }
        NamespaceState::Terminating => {
            let registry = connect_registry(ctx, spec, &object).await?;
            let organization = spec.organization_for(&name);
            teardown(ctx, &object, registry.as_ref(), &organization).await?;

            ctx.kube
                .remove_namespace_finalizer(&name, NAMESPACE_FINALIZER)
                .await
                .map_err(|e| {
                    ReconcileError::from_error(object.clone(), "Failed to remove finalizer", e)
                        .with("Namespace", &name)
                })?;
            info!("namespace released");
            Ok(Action::await_change())
        }
        NamespaceState::Managed => {
            let registry = connect_registry(ctx, spec, &object).await?;
            provision(ctx, &object, &name, spec, registry.as_ref()).await?;
            Ok(Action::requeue(RESYNC_INTERVAL))
        }
    }
}

/// Build a registry client from the integration's credentials secret
async fn connect_registry(
    ctx: &Context,
    spec: &QuayIntegrationSpec,
    object: &ObjectReference,
) -> Result<Arc<dyn RegistryClient>, ReconcileError> {
    let secret_ref = spec.credentials_secret.as_ref().ok_or_else(|| {
        ReconcileError::configuration(
            object.clone(),
            "Credentials secret not specified on QuayIntegration",
        )
    })?;

    let secret = ctx
        .kube
        .get_secret(&secret_ref.name, &secret_ref.namespace)
        .await
        .map_err(|e| {
            ReconcileError::from_error(
                object.clone(),
                "Error Locating Quay Integration Secret",
                e,
            )
            .with("Namespace", &secret_ref.namespace)
            .with("Secret", &secret_ref.name)
        })?
        .ok_or_else(|| {
            ReconcileError::configuration(object.clone(), "Error Locating Quay Integration Secret")
                .with("Namespace", &secret_ref.namespace)
                .with("Secret", &secret_ref.name)
        })?;

    let token = credential_token(&secret, secret_ref).map_err(|e| {
        let detail = e.to_string();
        ReconcileError::from_error(object.clone(), "Invalid Quay Integration credentials", e)
            .with("Namespace", &secret_ref.namespace)
            .with("Secret", &secret_ref.name)
            .with("Detail", detail)
    })?;

    ctx.registry
        .connect(&spec.quay_hostname, token, spec.insecure_registry)
        .map_err(|e| {
            ReconcileError::configuration(object.clone(), "Failed to create Quay client")
                .with("Hostname", &spec.quay_hostname)
                .caused_by(e)
        })
}

/// Ensure the organization, robot accounts, and repositories exist
async fn provision(
    ctx: &Context,
    object: &ObjectReference,
    namespace: &str,
    spec: &QuayIntegrationSpec,
    registry: &dyn RegistryClient,
) -> Result<(), ReconcileError> {
    let organization = spec.organization_for(namespace);
    let registry_host = spec.registry_hostname().map_err(|e| {
        ReconcileError::from_error(object.clone(), "Failed to parse Quay hostname", e)
            .with("Hostname", &spec.quay_hostname)
    })?;

    ensure_organization(ctx, object, registry, &organization).await?;

    RobotProvisioner {
        object,
        namespace,
        organization: &organization,
        registry_host: &registry_host,
        spec,
        registry,
        kube: ctx.kube.as_ref(),
    }
    .provision_all()
    .await?;

    sync_repositories(ctx, object, namespace, registry, &organization).await
}

async fn ensure_organization(
    ctx: &Context,
    object: &ObjectReference,
    registry: &dyn RegistryClient,
    organization: &str,
) -> Result<(), ReconcileError> {
    let lookup = registry.get_organization(organization).await.map_err(|e| {
        ReconcileError::registry(object.clone(), "Error occurred retrieving Quay Organization")
            .with("Organization", organization)
            .caused_by(e)
    })?;

    match lookup.status {
        200 => Ok(()),
        404 => {
            info!(organization, "organization does not exist, creating");
            let created = registry.create_organization(organization).await.map_err(|e| {
                ReconcileError::registry(object.clone(), "Error occurred creating Quay Organization")
                    .with("Organization", organization)
                    .caused_by(e)
            })?;
            if created.status != 201 {
                return Err(ReconcileError::registry(
                    object.clone(),
                    "Error occurred creating Quay Organization",
                )
                .with("Organization", organization)
                .with("Status Code", created.status));
            }
            ctx.events
                .record(
                    object,
                    Transition::OrganizationCreated,
                    format!("Created organization {}", organization),
                )
                .await;
            Ok(())
        }
        status => Err(ReconcileError::registry(
            object.clone(),
            "Error occurred retrieving Quay Organization",
        )
        .with("Organization", organization)
        .with("Status Code", status)),
    }
}

/// Ensure a repository exists for every ImageStream.
///
/// A failing repository does not stop the others; the first failure is
/// returned once all have been attempted.
async fn sync_repositories(
    ctx: &Context,
    object: &ObjectReference,
    namespace: &str,
    registry: &dyn RegistryClient,
    organization: &str,
) -> Result<(), ReconcileError> {
    let image_streams = ctx.kube.list_image_streams(namespace).await.map_err(|e| {
        ReconcileError::from_error(
            object.clone(),
            "Error Retrieving ImageStreams for Namespace",
            e,
        )
        .with("Namespace", namespace)
    })?;

    let mut first = None;
    for image_stream in &image_streams {
        let repository = image_stream.name_any();
        if let Err(err) = ensure_repository(object, registry, organization, &repository).await {
            warn!(repository = %repository, error = %err.event_note(), "repository sync failed");
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

async fn ensure_repository(
    object: &ObjectReference,
    registry: &dyn RegistryClient,
    organization: &str,
    repository: &str,
) -> Result<(), ReconcileError> {
    let qualified = format!("{}/{}", organization, repository);
    let lookup = registry
        .get_repository(organization, repository)
        .await
        .map_err(|e| {
            ReconcileError::registry(object.clone(), "Error Retrieving Repository")
                .with("Quay Repository", &qualified)
                .caused_by(e)
        })?;

    match lookup.status {
        200 => Ok(()),
        403 | 404 => {
            info!(repository = %qualified, "creating repository");
            let created = registry
                .create_repository(organization, repository)
                .await
                .map_err(|e| {
                    ReconcileError::registry(
                        object.clone(),
                        "Error occurred creating Quay Repository",
                    )
                    .with("Quay Repository", &qualified)
                    .caused_by(e)
                })?;
            if created.status != 201 {
                return Err(ReconcileError::registry(
                    object.clone(),
                    "Error occurred creating Quay Repository",
                )
                .with("Quay Repository", &qualified)
                .with("Status Code", created.status));
            }
            Ok(())
        }
        status => Err(ReconcileError::registry(
            object.clone(),
            "Error Retrieving Repository for Namespace",
        )
        .with("Quay Repository", &qualified)
        .with("Status Code", status)),
    }
}

/// Delete the namespace's organization; an absent organization is fine
async fn teardown(
    ctx: &Context,
    object: &ObjectReference,
    registry: &dyn RegistryClient,
    organization: &str,
) -> Result<(), ReconcileError> {
    info!(organization, "deleting organization");
    let lookup = registry.get_organization(organization).await.map_err(|e| {
        ReconcileError::registry(object.clone(), "Error occurred retrieving Organization")
            .with("Quay Organization", organization)
            .caused_by(e)
    })?;

    match lookup.status {
        404 => {
            debug!(organization, "organization already absent");
            Ok(())
        }
        200 => {
            let deleted = registry.delete_organization(organization).await.map_err(|e| {
                ReconcileError::registry(object.clone(), "Error occurred deleting Organization")
                    .with("Quay Organization", organization)
                    .caused_by(e)
            })?;
            if deleted.status != 204 {
                return Err(ReconcileError::registry(
                    object.clone(),
                    "Error occurred deleting Organization",
                )
                .with("Quay Organization", organization)
                .with("Status Code", deleted.status));
            }
            ctx.events
                .record(
                    object,
                    Transition::OrganizationDeleted,
                    format!("Deleted organization {}", organization),
                )
                .await;
            Ok(())
        }
        status => Err(ReconcileError::registry(
            object.clone(),
            "Error occurred retrieving Organization",
        )
        .with("Quay Organization", organization)
        .with("Status Code", status)),
    }
}

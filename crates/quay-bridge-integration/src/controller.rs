//! QuayIntegration controller implementation
//!
//! Stamps `status.lastUpdate` and a `Synced` condition whenever `spec`
//! differs from the one last written. The namespace and build reconcilers
//! read `spec` directly and never depend on this status.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use quay_bridge_common::crd::{Condition, ConditionStatus, QuayIntegration, QuayIntegrationStatus};
use quay_bridge_common::events::{EventPublisher, KubeEventPublisher};
use quay_bridge_common::kube_utils::{is_being_deleted, object_ref, patch_cluster_resource_status};
use quay_bridge_common::{report_error, Error, ReconcileError, CONTROLLER_NAME, FIELD_MANAGER};

use crate::cache::LastSeenSpec;

/// Condition type set once a spec has been observed
pub const CONDITION_SYNCED: &str = "Synced";

/// Trait abstracting Kubernetes client operations for the integration controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Patch the status of a QuayIntegration
    async fn patch_status(&self, name: &str, status: &QuayIntegrationStatus) -> Result<(), Error>;
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
    async fn patch_status(&self, name: &str, status: &QuayIntegrationStatus) -> Result<(), Error> {
        patch_cluster_resource_status::<QuayIntegration>(&self.client, name, status, FIELD_MANAGER)
            .await?;
        Ok(())
    }
}

/// Controller context for QuayIntegration reconciliation
pub struct Context {
    /// Kubernetes client (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Specs already written to status
    pub last_seen: Arc<LastSeenSpec>,
    /// Event publisher for failures
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
        Self {
            kube,
            last_seen: Arc::new(LastSeenSpec::new()),
            events,
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    last_seen: Option<Arc<LastSeenSpec>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            last_seen: None,
            events: None,
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Share an existing spec cache
    pub fn last_seen(mut self, last_seen: Arc<LastSeenSpec>) -> Self {
        self.last_seen = Some(last_seen);
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
            last_seen: self.last_seen.unwrap_or_default(),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
        }
    }
}

/// Reconcile a QuayIntegration
#[instrument(skip(integration, ctx), fields(integration = %integration.name_any()))]
pub async fn reconcile(
    integration: Arc<QuayIntegration>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    match reconcile_integration(&integration, &ctx).await {
        Ok(action) => Ok(action),
        Err(err) => {
            report_error(&err, ctx.events.as_ref()).await;
            Err(err)
        }
    }
}

/// Requeue policy for failed reconciles
pub fn error_policy(
    _integration: Arc<QuayIntegration>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    error.action()
}

async fn reconcile_integration(
    integration: &QuayIntegration,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let name = integration.name_any();
    let object = object_ref(integration);

    if is_being_deleted(integration) {
        ctx.last_seen.forget(&name);
        return Ok(Action::await_change());
    }

    let fingerprint = LastSeenSpec::fingerprint(&integration.spec).map_err(|e| {
        ReconcileError::from_error(object.clone(), "Failed to serialize QuayIntegration spec", e)
    })?;
    if ctx.last_seen.is_current(&name, &fingerprint) {
        debug!("No changes to QuayIntegration spec, skipping reconciliation");
        return Ok(Action::await_change());
    }

    let now = Utc::now();
    let status = QuayIntegrationStatus {
        conditions: vec![Condition::new(
            CONDITION_SYNCED,
            ConditionStatus::True,
            "SpecObserved",
            "QuayIntegration spec observed",
            now,
        )],
        last_update: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    };

    ctx.kube.patch_status(&name, &status).await.map_err(|e| {
        ReconcileError::from_error(object.clone(), "Failed to update QuayIntegration status", e)
            .with("QuayIntegration", &name)
    })?;
    info!("Updated QuayIntegration status");

    ctx.last_seen.record(&name, fingerprint);
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ObjectReference;
    use kube::runtime::events::EventType;
    use quay_bridge_common::crd::QuayIntegrationSpec;

    use super::*;

    #[derive(Clone, Default)]
    struct CapturingPublisher {
        reasons: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventPublisher for CapturingPublisher {
        async fn publish(
            &self,
            _resource_ref: &ObjectReference,
            _type_: EventType,
            reason: &str,
            _action: &str,
            _note: Option<String>,
        ) {
            self.reasons.lock().unwrap().push(reason.to_string());
        }
    }

    fn integration(cluster_id: &str) -> QuayIntegration {
        let mut qi = QuayIntegration::new(
            "example-quayintegration",
            QuayIntegrationSpec {
                cluster_id: cluster_id.to_string(),
                credentials_secret: None,
                organization_prefix: None,
                quay_hostname: "https://quay.example.com".to_string(),
                insecure_registry: false,
                scheduled_image_stream_import: false,
                denylist_namespaces: vec![],
                allowlist_namespaces: vec![],
            },
        );
        qi.metadata.name = Some("example-quayintegration".to_string());
        qi
    }

    fn recording_kube(written: Arc<Mutex<Vec<QuayIntegrationStatus>>>) -> MockKubeClient {
        let mut kube = MockKubeClient::new();
        kube.expect_patch_status().returning(move |_, status| {
            written.lock().unwrap().push(status.clone());
            Ok(())
        });
        kube
    }

    // =========================================================================
    // Story Tests
    // =========================================================================

    /// Story: a new spec is stamped on status exactly once
    #[tokio::test]
    async fn story_status_written_once_per_spec() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let ctx = Arc::new(Context::for_testing(
            Arc::new(recording_kube(written.clone())),
            Arc::new(CapturingPublisher::default()),
        ));
        let qi = Arc::new(integration("acme"));

        reconcile(qi.clone(), ctx.clone()).await.unwrap();
        reconcile(qi, ctx).await.unwrap();

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        let status = &written[0];
        assert_eq!(status.conditions[0].type_, CONDITION_SYNCED);
        assert_eq!(status.conditions[0].status, ConditionStatus::True);
        let stamped = status.last_update.as_deref().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamped).is_ok());
        assert!(stamped.ends_with('Z'));
    }

    /// Story: changing the spec triggers another status write
    #[tokio::test]
    async fn story_spec_change_rewrites_status() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let ctx = Arc::new(Context::for_testing(
            Arc::new(recording_kube(written.clone())),
            Arc::new(CapturingPublisher::default()),
        ));

        reconcile(Arc::new(integration("acme")), ctx.clone())
            .await
            .unwrap();
        reconcile(Arc::new(integration("globex")), ctx)
            .await
            .unwrap();

        assert_eq!(written.lock().unwrap().len(), 2);
    }

    /// Story: a failed status write is reported and retried on the next pass
    #[tokio::test]
    async fn story_failed_write_not_cached() {
        let mut kube = MockKubeClient::new();
        kube.expect_patch_status()
            .times(1)
            .returning(|_, _| Err(Error::internal("apiserver unavailable")));
        let events = CapturingPublisher::default();
        let ctx = Arc::new(Context::for_testing(Arc::new(kube), Arc::new(events.clone())));

        let err = reconcile(Arc::new(integration("acme")), ctx.clone())
            .await
            .unwrap_err();
        assert_eq!(
            error_policy(Arc::new(integration("acme")), &err, ctx.clone()),
            Action::requeue(std::time::Duration::from_secs(5))
        );
        assert_eq!(*events.reasons.lock().unwrap(), vec!["Warning".to_string()]);

        let fp = LastSeenSpec::fingerprint(&integration("acme").spec).unwrap();
        assert!(!ctx.last_seen.is_current("example-quayintegration", &fp));
    }

    /// Story: deleting an integration drops its cache entry without writing
    #[tokio::test]
    async fn story_deleted_integration_forgotten() {
        let ctx = Arc::new(Context::for_testing(
            Arc::new(MockKubeClient::new()),
            Arc::new(CapturingPublisher::default()),
        ));
        let mut qi = integration("acme");
        let fp = LastSeenSpec::fingerprint(&qi.spec).unwrap();
        ctx.last_seen.record("example-quayintegration", fp.clone());

        qi.metadata.deletion_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
            k8s_openapi::chrono::Utc::now(),
        ));
        reconcile(Arc::new(qi), ctx.clone()).await.unwrap();

        assert!(!ctx.last_seen.is_current("example-quayintegration", &fp));
    }
}

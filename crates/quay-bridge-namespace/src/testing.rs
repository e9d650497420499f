//! In-memory collaborators for controller tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ObjectReference, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::runtime::events::EventType;
use quay_bridge_common::crd::{ImageStream, ImageStreamSpec, QuayIntegration, QuayIntegrationSpec, SecretRef};
use quay_bridge_common::events::EventPublisher;
use quay_bridge_registry::{
    Organization, Prototype, PrototypesResponse, RegistryClient, RegistryClientFactory,
    RegistryError, RegistryResponse, Repository, RobotAccount, Role,
};
use zeroize::Zeroizing;

use crate::controller::MockKubeClient;

// =============================================================================
// Registry
// =============================================================================

/// Registry state shared between a fake client and the test
#[derive(Default)]
pub struct RegistryState {
    pub organizations: BTreeSet<String>,
    /// full robot name -> token
    pub robots: BTreeMap<String, String>,
    pub prototypes: BTreeMap<String, Vec<Prototype>>,
    /// `org/repo`
    pub repositories: BTreeSet<String>,
    /// Mutating calls in order
    pub writes: Vec<String>,
    /// Statuses forced for specific calls, keyed like the entries in `writes`
    pub forced: BTreeMap<String, u16>,
}

/// Registry held in memory, answering with the statuses Quay uses
#[derive(Clone, Default)]
pub struct FakeRegistry {
    pub state: Arc<Mutex<RegistryState>>,
}

impl FakeRegistry {
    pub fn force(&self, call: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .forced
            .insert(call.to_string(), status);
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn has_organization(&self, org: &str) -> bool {
        self.state.lock().unwrap().organizations.contains(org)
    }

    fn forced(&self, call: &str) -> Option<u16> {
        self.state.lock().unwrap().forced.get(call).copied()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn get_organization(
        &self,
        org: &str,
    ) -> Result<RegistryResponse<Organization>, RegistryError> {
        if let Some(status) = self.forced(&format!("get organization {org}")) {
            return Ok(RegistryResponse::status(status));
        }
        let state = self.state.lock().unwrap();
        Ok(if state.organizations.contains(org) {
            RegistryResponse::ok(
                200,
                Organization {
                    name: org.to_string(),
                },
            )
        } else {
            RegistryResponse::status(404)
        })
    }

    async fn create_organization(&self, org: &str) -> Result<RegistryResponse<()>, RegistryError> {
        let call = format!("create organization {org}");
        if let Some(status) = self.forced(&call) {
            return Ok(RegistryResponse::status(status));
        }
        let mut state = self.state.lock().unwrap();
        state.organizations.insert(org.to_string());
        state.writes.push(call);
        Ok(RegistryResponse::ok(201, ()))
    }

    async fn delete_organization(&self, org: &str) -> Result<RegistryResponse<()>, RegistryError> {
        let call = format!("delete organization {org}");
        if let Some(status) = self.forced(&call) {
            return Ok(RegistryResponse::status(status));
        }
        let mut state = self.state.lock().unwrap();
        if !state.organizations.remove(org) {
            return Ok(RegistryResponse::status(404));
        }
        state.writes.push(call);
        Ok(RegistryResponse::ok(204, ()))
    }

    async fn get_robot_account(
        &self,
        org: &str,
        short_name: &str,
    ) -> Result<RegistryResponse<RobotAccount>, RegistryError> {
        let name = format!("{org}+{short_name}");
        if let Some(status) = self.forced(&format!("get robot {name}")) {
            return Ok(RegistryResponse::status(status));
        }
        let state = self.state.lock().unwrap();
        Ok(match state.robots.get(&name) {
            Some(token) => RegistryResponse::ok(
                200,
                RobotAccount {
                    name,
                    token: token.clone(),
                    ..Default::default()
                },
            ),
            None => RegistryResponse::status(400),
        })
    }

    async fn create_robot_account(
        &self,
        org: &str,
        short_name: &str,
    ) -> Result<RegistryResponse<RobotAccount>, RegistryError> {
        let name = format!("{org}+{short_name}");
        let call = format!("create robot {name}");
        if let Some(status) = self.forced(&call) {
            return Ok(RegistryResponse::status(status));
        }
        let token = format!("token-{short_name}");
        let mut state = self.state.lock().unwrap();
        state.robots.insert(name.clone(), token.clone());
        state.writes.push(call);
        Ok(RegistryResponse::ok(
            201,
            RobotAccount {
                name,
                token,
                ..Default::default()
            },
        ))
    }

    async fn get_prototypes(
        &self,
        org: &str,
    ) -> Result<RegistryResponse<PrototypesResponse>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(RegistryResponse::ok(
            200,
            PrototypesResponse {
                prototypes: state.prototypes.get(org).cloned().unwrap_or_default(),
            },
        ))
    }

    async fn create_prototype(
        &self,
        org: &str,
        robot: &str,
        role: Role,
    ) -> Result<RegistryResponse<Prototype>, RegistryError> {
        let call = format!("create prototype {robot} {role}");
        if let Some(status) = self.forced(&call) {
            return Ok(RegistryResponse::status(status));
        }
        let prototype = Prototype::for_robot(robot, role);
        let mut state = self.state.lock().unwrap();
        state
            .prototypes
            .entry(org.to_string())
            .or_default()
            .push(prototype.clone());
        state.writes.push(call);
        Ok(RegistryResponse::ok(200, prototype))
    }

    async fn get_repository(
        &self,
        org: &str,
        repository: &str,
    ) -> Result<RegistryResponse<Repository>, RegistryError> {
        let state = self.state.lock().unwrap();
        Ok(if state.repositories.contains(&format!("{org}/{repository}")) {
            RegistryResponse::ok(
                200,
                Repository {
                    name: repository.to_string(),
                    namespace: org.to_string(),
                    ..Default::default()
                },
            )
        } else {
            RegistryResponse::status(404)
        })
    }

    async fn create_repository(
        &self,
        org: &str,
        repository: &str,
    ) -> Result<RegistryResponse<()>, RegistryError> {
        let qualified = format!("{org}/{repository}");
        let call = format!("create repository {qualified}");
        if let Some(status) = self.forced(&call) {
            return Ok(RegistryResponse::status(status));
        }
        let mut state = self.state.lock().unwrap();
        state.repositories.insert(qualified);
        state.writes.push(call);
        Ok(RegistryResponse::ok(201, ()))
    }
}

/// Hands out the shared [`FakeRegistry`] and records connection settings
#[derive(Clone, Default)]
pub struct FakeRegistryFactory {
    pub registry: FakeRegistry,
    pub connections: Arc<Mutex<Vec<(String, String, bool)>>>,
}

impl RegistryClientFactory for FakeRegistryFactory {
    fn connect(
        &self,
        hostname: &str,
        token: Zeroizing<String>,
        insecure: bool,
    ) -> Result<Arc<dyn RegistryClient>, RegistryError> {
        self.connections
            .lock()
            .unwrap()
            .push((hostname.to_string(), token.to_string(), insecure));
        Ok(Arc::new(self.registry.clone()))
    }
}

// =============================================================================
// Events
// =============================================================================

/// Recorded event: (type, reason, note)
pub type PublishedEvent = (EventType, String, Option<String>);

/// Publisher that records every event
#[derive(Clone, Default)]
pub struct CapturingPublisher {
    pub published: Arc<Mutex<Vec<PublishedEvent>>>,
}

impl CapturingPublisher {
    pub fn reasons(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason, _)| reason.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for CapturingPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.published
            .lock()
            .unwrap()
            .push((type_, reason.to_string(), note));
    }
}

// =============================================================================
// Cluster
// =============================================================================

/// Cluster objects backing a [`MockKubeClient`]
#[derive(Default)]
pub struct ClusterState {
    pub integrations: Vec<QuayIntegration>,
    /// `namespace/name` -> secret
    pub secrets: BTreeMap<String, Secret>,
    /// `namespace/name` -> service account
    pub service_accounts: BTreeMap<String, ServiceAccount>,
    pub image_streams: Vec<ImageStream>,
    /// namespace name -> finalizers
    pub finalizers: BTreeMap<String, Vec<String>>,
    /// Mutating calls in order
    pub writes: Vec<String>,
}

/// Shared cluster state
pub type Cluster = Arc<Mutex<ClusterState>>;

/// MockKubeClient whose expectations read and write `cluster`
pub fn mock_kube(cluster: &Cluster) -> MockKubeClient {
    let mut mock = MockKubeClient::new();

    let c = cluster.clone();
    mock.expect_list_integrations()
        .returning(move || Ok(c.lock().unwrap().integrations.clone()));

    let c = cluster.clone();
    mock.expect_get_secret().returning(move |name, namespace| {
        Ok(c.lock()
            .unwrap()
            .secrets
            .get(&format!("{namespace}/{name}"))
            .cloned())
    });

    let c = cluster.clone();
    mock.expect_apply_secret().returning(move |secret| {
        let key = format!(
            "{}/{}",
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default()
        );
        let mut state = c.lock().unwrap();
        state.writes.push(format!("apply secret {key}"));
        state.secrets.insert(key, secret.clone());
        Ok(())
    });

    let c = cluster.clone();
    mock.expect_get_service_account()
        .returning(move |name, namespace| {
            Ok(c.lock()
                .unwrap()
                .service_accounts
                .get(&format!("{namespace}/{name}"))
                .cloned())
        });

    let c = cluster.clone();
    mock.expect_patch_service_account_secrets()
        .returning(move |name, namespace, links| {
            let key = format!("{namespace}/{name}");
            let mut state = c.lock().unwrap();
            state.writes.push(format!("patch service account {key}"));
            let sa = state.service_accounts.entry(key).or_default();
            sa.image_pull_secrets = Some(links.image_pull_secrets.clone());
            sa.secrets = Some(links.secrets.clone());
            Ok(())
        });

    let c = cluster.clone();
    mock.expect_list_image_streams().returning(move |namespace| {
        Ok(c.lock()
            .unwrap()
            .image_streams
            .iter()
            .filter(|is| is.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    });

    let c = cluster.clone();
    mock.expect_add_namespace_finalizer()
        .returning(move |name, finalizer| {
            let mut state = c.lock().unwrap();
            state.writes.push(format!("add finalizer {name}"));
            state
                .finalizers
                .entry(name.to_string())
                .or_default()
                .push(finalizer.to_string());
            Ok(())
        });

    let c = cluster.clone();
    mock.expect_remove_namespace_finalizer()
        .returning(move |name, finalizer| {
            let mut state = c.lock().unwrap();
            state.writes.push(format!("remove finalizer {name}"));
            if let Some(list) = state.finalizers.get_mut(name) {
                list.retain(|f| f != finalizer);
            }
            Ok(())
        });

    mock
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn integration(cluster_id: &str) -> QuayIntegration {
    let mut qi = QuayIntegration::new(
        "example-quayintegration",
        QuayIntegrationSpec {
            cluster_id: cluster_id.to_string(),
            credentials_secret: Some(SecretRef {
                name: "quay-integration".to_string(),
                namespace: "openshift-operators".to_string(),
                key: None,
            }),
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

pub fn credentials_secret(token: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("quay-integration".to_string()),
            namespace: Some("openshift-operators".to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "token".to_string(),
            ByteString(token.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

pub fn service_account(namespace: &str, name: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn image_stream(namespace: &str, name: &str) -> ImageStream {
    let mut is = ImageStream::new(name, ImageStreamSpec::default());
    is.metadata.namespace = Some(namespace.to_string());
    is
}

pub fn namespace(name: &str, finalizers: &[&str]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Cluster with one integration, its credentials, and the platform service accounts
pub fn provisioned_cluster(cluster_id: &str, namespace: &str) -> Cluster {
    let mut state = ClusterState {
        integrations: vec![integration(cluster_id)],
        ..Default::default()
    };
    state.secrets.insert(
        "openshift-operators/quay-integration".to_string(),
        credentials_secret("api-token"),
    );
    for sa in ["builder", "default", "deployer"] {
        state
            .service_accounts
            .insert(format!("{namespace}/{sa}"), service_account(namespace, sa));
    }
    Arc::new(Mutex::new(state))
}

//! Robot account provisioning
//!
//! Each platform service account in [`ROLE_MATRIX`] gets a robot account in
//! the namespace's organization, a prototype granting it the mapped role, and
//! a pull secret linked onto the service account.

use futures::future::join_all;
use k8s_openapi::api::core::v1::{LocalObjectReference, ObjectReference, ServiceAccount};
use quay_bridge_common::crd::QuayIntegrationSpec;
use quay_bridge_common::docker_config::{pull_secret, secret_matches};
use quay_bridge_common::policy::robot_account_name;
use quay_bridge_common::ReconcileError;
use quay_bridge_registry::{RegistryClient, RegistryError, RobotAccount, Role};
use tracing::{debug, info, instrument, warn};

use crate::controller::KubeClient;

/// Platform service accounts and the registry role their robot receives
pub const ROLE_MATRIX: [(&str, Role); 3] = [
    ("builder", Role::Write),
    ("default", Role::Read),
    ("deployer", Role::Read),
];

/// Secret references to write onto a service account
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecretLinks {
    /// New `imagePullSecrets` list
    pub image_pull_secrets: Vec<LocalObjectReference>,
    /// New `secrets` list
    pub secrets: Vec<ObjectReference>,
}

/// Reference lists with `secret_name` appended where missing.
///
/// `None` when both lists already reference the secret.
pub fn secret_links(service_account: &ServiceAccount, secret_name: &str) -> Option<SecretLinks> {
    let mut image_pull_secrets = service_account.image_pull_secrets.clone().unwrap_or_default();
    let mut secrets = service_account.secrets.clone().unwrap_or_default();
    let mut changed = false;

    if !image_pull_secrets.iter().any(|r| r.name == secret_name) {
        image_pull_secrets.push(LocalObjectReference {
            name: secret_name.to_string(),
        });
        changed = true;
    }
    if !secrets
        .iter()
        .any(|r| r.name.as_deref() == Some(secret_name))
    {
        secrets.push(ObjectReference {
            name: Some(secret_name.to_string()),
            ..Default::default()
        });
        changed = true;
    }

    changed.then_some(SecretLinks {
        image_pull_secrets,
        secrets,
    })
}

/// Provisions the role matrix for one namespace
pub(crate) struct RobotProvisioner<'a> {
    pub object: &'a ObjectReference,
    pub namespace: &'a str,
    pub organization: &'a str,
    pub registry_host: &'a str,
    pub spec: &'a QuayIntegrationSpec,
    pub registry: &'a dyn RegistryClient,
    pub kube: &'a dyn KubeClient,
}

impl RobotProvisioner<'_> {
    /// Provision every role concurrently.
    ///
    /// All roles run to completion; the first failure in matrix order is
    /// returned and the rest are logged.
    pub async fn provision_all(&self) -> Result<(), ReconcileError> {
        let results = join_all(
            ROLE_MATRIX
                .iter()
                .map(|(service_account, role)| self.provision(service_account, *role)),
        )
        .await;

        let mut first = None;
        for err in results.into_iter().filter_map(Result::err) {
            if first.is_none() {
                first = Some(err);
            } else {
                warn!(error = %err.event_note(), "additional robot provisioning failure");
            }
        }
        first.map_or(Ok(()), Err)
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, organization = %self.organization))]
    async fn provision(&self, service_account: &str, role: Role) -> Result<(), ReconcileError> {
        let robot = self.ensure_robot(service_account).await?;
        self.ensure_prototype(&robot.name, role).await?;

        let secret_name = self.spec.pull_secret_name(service_account);
        self.ensure_pull_secret(&secret_name, service_account, &robot)
            .await?;
        self.link_service_account(service_account, &secret_name)
            .await
    }

    async fn ensure_robot(&self, service_account: &str) -> Result<RobotAccount, ReconcileError> {
        let lookup = self
            .registry
            .get_robot_account(self.organization, service_account)
            .await
            .map_err(|e| {
                self.registry_error(
                    "Error occurred retrieving robot account for Quay Organization",
                    e,
                )
                .with("Robot Account", service_account)
            })?;

        let response = match lookup.status {
            200 => lookup,
            400 | 404 => {
                info!(robot = service_account, "creating robot account");
                let created = self
                    .registry
                    .create_robot_account(self.organization, service_account)
                    .await
                    .map_err(|e| {
                        self.registry_error(
                            "Error occurred creating robot account for Quay Organization",
                            e,
                        )
                        .with("Robot Account", service_account)
                    })?;
                if created.status != 201 {
                    return Err(self
                        .failure("Error occurred creating robot account for Quay Organization")
                        .with("Robot Account", service_account)
                        .with("Status Code", created.status));
                }
                created
            }
            status => {
                return Err(self
                    .failure("Error occurred retrieving robot account for Quay Organization")
                    .with("Robot Account", service_account)
                    .with("Status Code", status))
            }
        };

        let mut robot = response.body.ok_or_else(|| {
            self.failure("Robot account response carried no body")
                .with("Robot Account", service_account)
        })?;
        if robot.name.is_empty() {
            robot.name = robot_account_name(self.organization, service_account);
        }
        Ok(robot)
    }

    async fn ensure_prototype(&self, robot: &str, role: Role) -> Result<(), ReconcileError> {
        let prototypes = self
            .registry
            .get_prototypes(self.organization)
            .await
            .map_err(|e| {
                self.registry_error("Error occurred retrieving Prototypes for Quay Organization", e)
            })?;
        if prototypes.status != 200 {
            return Err(self
                .failure("Error occurred retrieving Prototypes for Quay Organization")
                .with("Status Code", prototypes.status));
        }

        if prototypes.body.is_some_and(|p| p.grants(robot, role)) {
            return Ok(());
        }

        info!(robot, %role, "creating prototype");
        let created = self
            .registry
            .create_prototype(self.organization, robot, role)
            .await
            .map_err(|e| {
                self.registry_error(
                    "Error occurred creating Robot account permissions for Prototype",
                    e,
                )
                .with("Robot Account", robot)
                .with("Prototype", role)
            })?;
        if created.status != 200 {
            return Err(self
                .failure("Error occurred creating Robot account permissions for Prototype")
                .with("Robot Account", robot)
                .with("Prototype", role)
                .with("Status Code", created.status));
        }
        Ok(())
    }

    async fn ensure_pull_secret(
        &self,
        secret_name: &str,
        service_account: &str,
        robot: &RobotAccount,
    ) -> Result<(), ReconcileError> {
        let desired = pull_secret(
            secret_name,
            self.namespace,
            self.registry_host,
            &robot.name,
            &robot.token,
        )
        .map_err(|e| {
            ReconcileError::from_error(
                self.object.clone(),
                "Failed to generate Docker JSON Secret for Service Account",
                e,
            )
            .with("Namespace", self.namespace)
            .with("Robot Account", &robot.name)
            .with("Service Account", service_account)
        })?;

        let existing = self
            .kube
            .get_secret(secret_name, self.namespace)
            .await
            .map_err(|e| {
                ReconcileError::from_error(self.object.clone(), "Failed to read pull secret", e)
                    .with("Namespace", self.namespace)
                    .with("Secret", secret_name)
            })?;
        if existing.is_some_and(|s| secret_matches(&s, &desired)) {
            debug!(secret = secret_name, "pull secret up to date");
            return Ok(());
        }

        self.kube.apply_secret(&desired).await.map_err(|e| {
            ReconcileError::from_error(self.object.clone(), "Failed to write pull secret", e)
                .with("Namespace", self.namespace)
                .with("Secret", secret_name)
        })
    }

    async fn link_service_account(
        &self,
        service_account: &str,
        secret_name: &str,
    ) -> Result<(), ReconcileError> {
        let existing = self
            .kube
            .get_service_account(service_account, self.namespace)
            .await
            .map_err(|e| {
                ReconcileError::from_error(
                    self.object.clone(),
                    "Failed to get existing platform service account",
                    e,
                )
                .with("Namespace", self.namespace)
                .with("Service Account", service_account)
            })?
            .ok_or_else(|| {
                ReconcileError::cluster(
                    self.object.clone(),
                    "Failed to get existing platform service account",
                )
                .with("Namespace", self.namespace)
                .with("Service Account", service_account)
            })?;

        let Some(links) = secret_links(&existing, secret_name) else {
            return Ok(());
        };

        self.kube
            .patch_service_account_secrets(service_account, self.namespace, &links)
            .await
            .map_err(|e| {
                ReconcileError::from_error(
                    self.object.clone(),
                    "Failed to update existing platform service account",
                    e,
                )
                .with("Namespace", self.namespace)
                .with("Service Account", service_account)
            })
    }

    fn failure(&self, message: &str) -> ReconcileError {
        ReconcileError::registry(self.object.clone(), message)
            .with("Quay Organization", self.organization)
    }

    fn registry_error(&self, message: &str, err: RegistryError) -> ReconcileError {
        self.failure(message).caused_by(err)
    }
}

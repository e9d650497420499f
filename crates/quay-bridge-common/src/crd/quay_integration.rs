//! QuayIntegration CRD
//!
//! A QuayIntegration is the cluster-wide configuration that binds this cluster
//! to a Quay registry. Exactly one instance is expected to exist.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, SecretRef};
use crate::policy::{organization_name, registry_host, NamespacePolicy};
use crate::Error;

/// QuayIntegration connects the cluster to a Quay registry.
///
/// Example:
/// ```yaml
/// apiVersion: quay.redhat.com/v1
/// kind: QuayIntegration
/// metadata:
///   name: example-quayintegration
/// spec:
///   clusterID: openshift
///   credentialsSecret:
///     name: quay-integration
///     namespace: openshift-operators
///   quayHostname: https://quay.example.com
///   denylistNamespaces:
///     - sandbox
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "quay.redhat.com",
    version = "v1",
    kind = "QuayIntegration",
    plural = "quayintegrations",
    status = "QuayIntegrationStatus",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterID"}"#,
    printcolumn = r#"{"name":"Hostname","type":"string","jsonPath":".spec.quayHostname"}"#,
    printcolumn = r#"{"name":"Last Update","type":"string","jsonPath":".status.lastUpdate"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct QuayIntegrationSpec {
    /// Identifier of this cluster; prefixes every organization name
    #[serde(rename = "clusterID")]
    pub cluster_id: String,

    /// Secret holding the registry API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<SecretRef>,

    /// Prefix assigned to organizations (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_prefix: Option<String>,

    /// URL of the Quay registry (e.g., "https://quay.example.com")
    pub quay_hostname: String,

    /// Skip TLS verification when talking to the registry
    #[serde(default)]
    pub insecure_registry: bool,

    /// Enable scheduled imports on ImageStreams populated by builds
    #[serde(default)]
    pub scheduled_image_stream_import: bool,

    /// Namespaces that are never managed unless explicitly allowed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denylist_namespaces: Vec<String>,

    /// Namespaces that are always managed; when non-empty, nothing else is
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowlist_namespaces: Vec<String>,
}

/// QuayIntegration status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuayIntegrationStatus {
    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Time (RFC 3339, UTC) the `spec` change was last observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

impl QuayIntegrationSpec {
    /// Allow/deny policy declared by this spec
    pub fn namespace_policy(&self) -> NamespacePolicy<'_> {
        NamespacePolicy::new(&self.allowlist_namespaces, &self.denylist_namespaces)
    }

    /// Whether the namespace should be bridged to the registry
    pub fn is_allowed_namespace(&self, namespace: &str) -> bool {
        self.namespace_policy().allows(namespace)
    }

    /// Organization backing the given namespace
    pub fn organization_for(&self, namespace: &str) -> String {
        organization_name(&self.cluster_id, namespace)
    }

    /// Registry `host[:port]` used in image references and pull secrets
    pub fn registry_hostname(&self) -> Result<String, Error> {
        registry_host(&self.quay_hostname)
    }

    /// Name of the pull secret linked to a platform service account
    pub fn pull_secret_name(&self, service_account: &str) -> String {
        format!("{}-quay-{}", service_account, self.cluster_id)
    }
}

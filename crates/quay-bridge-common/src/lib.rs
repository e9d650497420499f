//! Common types for the Quay bridge: CRDs, errors, events, and namespace policy

#![deny(missing_docs)]

pub mod crd;
pub mod docker_config;
pub mod error;
pub mod events;
pub mod integration;
pub mod kube_utils;
pub mod policy;
pub mod telemetry;

pub use error::{report_error, Error, ErrorKind, ReconcileError};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Annotations and finalizers
// =============================================================================

/// Prefix shared by every annotation this operator writes
pub const ANNOTATION_BASE: &str = "quay-registry-operator.redhatcop.redhat.io";

/// Marks a Build whose output was redirected to the registry by the webhook
pub const BUILD_MANAGED_ANNOTATION: &str =
    "quay-registry-operator.redhatcop.redhat.io/quay-registry-operator-managed";

/// `namespace/name:tag` of the ImageStream tag to import once the Build completes
pub const BUILD_DESTINATION_ANNOTATION: &str =
    "quay-registry-operator.redhatcop.redhat.io/destination-imagestream";

/// Set once the deferred ImageStream import has been requested
pub const BUILD_IMPORTED_ANNOTATION: &str =
    "quay-registry-operator.redhatcop.redhat.io/destination-imagestreamtag-imported";

/// Finalizer held on managed namespaces until their organization is torn down
pub const NAMESPACE_FINALIZER: &str = "redhatcop.redhat.io/quayintegrations";

/// Project display name, present on namespaces created through a project request
pub const OPENSHIFT_DISPLAY_NAME_ANNOTATION: &str = "openshift.io/display-name";

/// Project description, present on namespaces created through a project request
pub const OPENSHIFT_DESCRIPTION_ANNOTATION: &str = "openshift.io/description";

/// MCS label assigned once a project has been fully initialized
pub const OPENSHIFT_SCC_MCS_ANNOTATION: &str = "openshift.io/sa.scc.mcs";

// =============================================================================
// Defaults
// =============================================================================

/// Key read from the credentials secret when the integration does not name one
pub const DEFAULT_CREDENTIALS_KEY: &str = "token";

/// Default requeue interval after a reported failure
pub const REQUEUE_ERROR_SECS: u64 = 5;

/// Field manager used for server-side apply and patches
pub const FIELD_MANAGER: &str = "quay-bridge-operator";

/// Reporting component used on Kubernetes Events
pub const CONTROLLER_NAME: &str = "quay-bridge-operator";

/// Environment variable that restricts the process to the admission webhook
pub const WEBHOOK_ONLY_MODE_ENV: &str = "WEBHOOK_ONLY_MODE";

/// Environment variable that disables the admission webhook
pub const DISABLE_WEBHOOK_ENV: &str = "DISABLE_WEBHOOK";

/// Default webhook TLS certificate path
pub const DEFAULT_WEBHOOK_CERT_FILE: &str = "/etc/webhook/certs/cert.pem";

/// Default webhook TLS key path
pub const DEFAULT_WEBHOOK_KEY_FILE: &str = "/etc/webhook/certs/key.pem";

/// Admission endpoint path
pub const WEBHOOK_PATH: &str = "/admissionwebhook";

/// Webhook port when serving TLS
pub const WEBHOOK_TLS_PORT: u16 = 8443;

/// Webhook port when TLS is disabled (development only)
pub const WEBHOOK_PLAIN_PORT: u16 = 8080;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_annotations_share_base() {
        for annotation in [
            BUILD_MANAGED_ANNOTATION,
            BUILD_DESTINATION_ANNOTATION,
            BUILD_IMPORTED_ANNOTATION,
        ] {
            assert!(annotation.starts_with(&format!("{ANNOTATION_BASE}/")));
        }
    }
}

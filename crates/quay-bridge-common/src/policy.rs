//! Namespace admission policy and registry naming
//!
//! These are pure functions shared by the namespace reconciler, the build
//! webhook and the build completion reconciler.

use url::Url;

use crate::Error;

/// Namespaces that are never managed unless explicitly allow-listed
pub const RESERVED_NAMESPACES: [&str; 3] = ["default", "openshift", "management-infra"];

/// Namespace prefixes that are never managed unless explicitly allow-listed
pub const RESERVED_PREFIXES: [&str; 2] = ["openshift-", "kube-"];

/// Allow/deny policy over namespace names.
///
/// Precedence:
/// 1. a deny-list entry rejects, unless the same name is allow-listed
/// 2. an allow-list entry accepts
/// 3. reserved names and prefixes reject
/// 4. anything else is accepted only when the allow-list is empty
#[derive(Clone, Copy, Debug)]
pub struct NamespacePolicy<'a> {
    allowlist: &'a [String],
    denylist: &'a [String],
}

impl<'a> NamespacePolicy<'a> {
    /// Build a policy from the integration's lists
    pub fn new(allowlist: &'a [String], denylist: &'a [String]) -> Self {
        Self {
            allowlist,
            denylist,
        }
    }

    /// Whether the namespace should be managed
    pub fn allows(&self, namespace: &str) -> bool {
        if self.is_allow_listed(namespace) {
            return true;
        }
        if self.denylist.iter().any(|n| n == namespace) {
            return false;
        }
        if is_reserved(namespace) {
            return false;
        }
        self.allowlist.is_empty()
    }

    fn is_allow_listed(&self, namespace: &str) -> bool {
        self.allowlist.iter().any(|n| n == namespace)
    }
}

/// Platform namespaces excluded by default
pub fn is_reserved(namespace: &str) -> bool {
    RESERVED_NAMESPACES.contains(&namespace)
        || RESERVED_PREFIXES.iter().any(|p| namespace.starts_with(p))
}

/// Organization that backs a namespace: `lowercase(clusterID)_namespace`
pub fn organization_name(cluster_id: &str, namespace: &str) -> String {
    format!("{}_{}", cluster_id.to_lowercase(), namespace)
}

/// Full robot account name as reported by the registry
pub fn robot_account_name(organization: &str, short_name: &str) -> String {
    format!("{}+{}", organization, short_name)
}

/// Extract `host[:port]` from the configured registry URL.
///
/// A bare hostname without a scheme is accepted as-is.
pub fn registry_host(quay_hostname: &str) -> Result<String, Error> {
    let parsed = if quay_hostname.contains("://") {
        Url::parse(quay_hostname)
    } else {
        Url::parse(&format!("https://{}", quay_hostname))
    }
    .map_err(|e| {
        Error::configuration(format!(
            "invalid registry hostname '{}': {}",
            quay_hostname, e
        ))
    })?;

    let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or_else(|| {
        Error::configuration(format!("registry hostname '{}' has no host", quay_hostname))
    })?;

    Ok(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

//! Last-seen spec fingerprints
//!
//! Lives for the lifetime of the process. After a restart every integration
//! is seen as changed once, costing one extra status write.

use dashmap::DashMap;
use quay_bridge_common::crd::QuayIntegrationSpec;
use quay_bridge_common::Error;

/// Serialized spec last written to status, keyed by integration name
#[derive(Debug, Default)]
pub struct LastSeenSpec {
    entries: DashMap<String, String>,
}

impl LastSeenSpec {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable serialization of a spec
    pub fn fingerprint(spec: &QuayIntegrationSpec) -> Result<String, Error> {
        Ok(serde_json::to_string(spec)?)
    }

    /// Whether `fingerprint` matches what was last recorded for `name`
    pub fn is_current(&self, name: &str, fingerprint: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|seen| seen.value() == fingerprint)
    }

    /// Remember the fingerprint written for `name`
    pub fn record(&self, name: &str, fingerprint: String) {
        self.entries.insert(name.to_string(), fingerprint);
    }

    /// Drop the entry for `name`
    pub fn forget(&self, name: &str) {
        self.entries.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(cluster_id: &str) -> QuayIntegrationSpec {
        QuayIntegrationSpec {
            cluster_id: cluster_id.to_string(),
            credentials_secret: None,
            organization_prefix: None,
            quay_hostname: "https://quay.example.com".to_string(),
            insecure_registry: false,
            scheduled_image_stream_import: false,
            denylist_namespaces: vec![],
            allowlist_namespaces: vec![],
        }
    }

    #[test]
    fn cold_cache_sees_everything_as_changed() {
        let cache = LastSeenSpec::new();
        let fp = LastSeenSpec::fingerprint(&spec("acme")).unwrap();
        assert!(!cache.is_current("example", &fp));
    }

    #[test]
    fn recorded_fingerprint_is_current_until_spec_changes() {
        let cache = LastSeenSpec::new();
        let fp = LastSeenSpec::fingerprint(&spec("acme")).unwrap();
        cache.record("example", fp.clone());
        assert!(cache.is_current("example", &fp));

        let changed = LastSeenSpec::fingerprint(&spec("other")).unwrap();
        assert!(!cache.is_current("example", &changed));
        assert!(!cache.is_current("another", &fp));
    }

    #[test]
    fn forgotten_entry_is_stale() {
        let cache = LastSeenSpec::new();
        let fp = LastSeenSpec::fingerprint(&spec("acme")).unwrap();
        cache.record("example", fp.clone());
        cache.forget("example");
        assert!(!cache.is_current("example", &fp));
    }
}

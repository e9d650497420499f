//! Small helpers over kube-rs resources shared by the reconcilers

use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};

/// Reference used to attribute events to an object
pub fn object_ref<K>(obj: &K) -> ObjectReference
where
    K: Resource<DynamicType = ()>,
{
    obj.object_ref(&())
}

/// Annotation value, if present
pub fn annotation<'a, K: Resource>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Whether the annotation key is present, whatever its value
pub fn has_annotation<K: Resource>(obj: &K, key: &str) -> bool {
    annotation(obj, key).is_some()
}

/// Whether the object carries the given finalizer
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Whether deletion of the object has been requested
pub fn is_being_deleted<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Finalizer list with `finalizer` appended (no duplicates)
pub fn finalizers_with<K: Resource>(obj: &K, finalizer: &str) -> Vec<String> {
    let mut finalizers = obj.finalizers().to_vec();
    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());
    }
    finalizers
}

/// Finalizer list with every occurrence of `finalizer` removed
pub fn finalizers_without<K: Resource>(obj: &K, finalizer: &str) -> Vec<String> {
    obj.finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect()
}

/// Merge-patch the status sub-resource of a cluster-scoped resource.
///
/// Returns `kube::Error` so callers can map to their own error type.
pub async fn patch_cluster_resource_status<T>(
    client: &Client,
    name: &str,
    status: &impl serde::Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: Resource<Scope = k8s_openapi::ClusterResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::all(client.clone());
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Namespace;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    use super::*;

    fn namespace(finalizers: &[&str], annotations: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some("payments".to_string()),
                finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn finalizer_add_is_idempotent() {
        let ns = namespace(&["kubernetes"], &[]);
        let added = finalizers_with(&ns, "example.com/f");
        assert_eq!(added, vec!["kubernetes", "example.com/f"]);

        let ns = namespace(&["example.com/f"], &[]);
        assert_eq!(finalizers_with(&ns, "example.com/f"), vec!["example.com/f"]);
        assert!(has_finalizer(&ns, "example.com/f"));
    }

    #[test]
    fn finalizer_remove_keeps_others() {
        let ns = namespace(&["a", "example.com/f", "b"], &[]);
        assert_eq!(finalizers_without(&ns, "example.com/f"), vec!["a", "b"]);
        assert!(!has_finalizer(&namespace(&[], &[]), "example.com/f"));
    }

    #[test]
    fn annotations_and_deletion() {
        let mut ns = namespace(&[], &[("openshift.io/display-name", "")]);
        assert!(has_annotation(&ns, "openshift.io/display-name"));
        assert_eq!(annotation(&ns, "openshift.io/display-name"), Some(""));
        assert_eq!(annotation(&ns, "missing"), None);
        assert!(!is_being_deleted(&ns));

        ns.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert!(is_being_deleted(&ns));
    }

    #[test]
    fn object_ref_names_the_namespace() {
        let reference = object_ref(&namespace(&[], &[]));
        assert_eq!(reference.kind.as_deref(), Some("Namespace"));
        assert_eq!(reference.name.as_deref(), Some("payments"));
    }
}

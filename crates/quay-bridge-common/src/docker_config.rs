//! Image pull secrets in `kubernetes.io/dockerconfigjson` format

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::Serialize;

use crate::Error;

/// Secret type for docker config JSON pull secrets
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the docker config JSON
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

#[derive(Serialize)]
struct DockerConfig<'a> {
    auths: BTreeMap<&'a str, DockerAuth>,
}

#[derive(Serialize)]
struct DockerAuth {
    auth: String,
}

/// Render `{"auths":{host:{"auth":base64(user:token)}}}`
pub fn docker_config_json(host: &str, username: &str, token: &str) -> Result<Vec<u8>, Error> {
    let config = DockerConfig {
        auths: BTreeMap::from([(
            host,
            DockerAuth {
                auth: STANDARD.encode(format!("{}:{}", username, token)),
            },
        )]),
    };
    Ok(serde_json::to_vec(&config)?)
}

/// Pull secret granting `username` access to the registry at `host`
pub fn pull_secret(
    name: &str,
    namespace: &str,
    host: &str,
    username: &str,
    token: &str,
) -> Result<Secret, Error> {
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_JSON_KEY.to_string(),
            ByteString(docker_config_json(host, username, token)?),
        )])),
        ..Default::default()
    })
}

/// Whether an existing secret already holds the desired type and data
pub fn secret_matches(existing: &Secret, desired: &Secret) -> bool {
    existing.type_ == desired.type_ && existing.data == desired.data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_json_shape() {
        let bytes = docker_config_json("quay.example.com", "acme_payments+builder", "tok").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let auth = json["auths"]["quay.example.com"]["auth"].as_str().unwrap();
        let decoded = STANDARD.decode(auth).unwrap();
        assert_eq!(decoded, b"acme_payments+builder:tok");
    }

    #[test]
    fn pull_secret_typed_and_namespaced() {
        let secret = pull_secret(
            "builder-quay-openshift",
            "payments",
            "quay.example.com:8443",
            "openshift_payments+builder",
            "tok",
        )
        .unwrap();
        assert_eq!(secret.metadata.namespace.as_deref(), Some("payments"));
        assert_eq!(secret.type_.as_deref(), Some(DOCKER_CONFIG_JSON_TYPE));
        assert!(secret
            .data
            .as_ref()
            .unwrap()
            .contains_key(DOCKER_CONFIG_JSON_KEY));
    }

    #[test]
    fn matches_ignores_metadata_but_not_data() {
        let desired = pull_secret("s", "ns", "quay.example.com", "u", "t1").unwrap();
        let mut existing = desired.clone();
        existing.metadata.resource_version = Some("42".to_string());
        assert!(secret_matches(&existing, &desired));

        let rotated = pull_secret("s", "ns", "quay.example.com", "u", "t2").unwrap();
        assert!(!secret_matches(&rotated, &desired));

        existing.type_ = Some("Opaque".to_string());
        assert!(!secret_matches(&existing, &desired));
    }
}

//! Resolution of the active QuayIntegration and its credentials

use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use zeroize::Zeroizing;

use crate::crd::{QuayIntegration, SecretRef};
use crate::{Error, ReconcileError};

/// Message used whenever the integration count is not exactly one
pub const INTEGRATION_COUNT_MESSAGE: &str =
    "No QuayIntegrations defined or more than 1 integration present";

/// Pick the single QuayIntegration in the cluster.
///
/// Zero or several instances is a configuration error; the bridge never
/// guesses which one applies.
pub fn select_active(mut integrations: Vec<QuayIntegration>) -> Result<QuayIntegration, Error> {
    match integrations.len() {
        1 => integrations
            .pop()
            .ok_or_else(|| Error::internal("integration list emptied during selection")),
        n => Err(Error::configuration(format!(
            "{} (found {})",
            INTEGRATION_COUNT_MESSAGE, n
        ))),
    }
}

/// [`select_active`] for a reconciler, attributing failures to `object`
pub fn require_single(
    integrations: Vec<QuayIntegration>,
    object: &ObjectReference,
) -> Result<QuayIntegration, ReconcileError> {
    let count = integrations.len();
    select_active(integrations).map_err(|e| {
        ReconcileError::from_error(object.clone(), INTEGRATION_COUNT_MESSAGE, e)
            .with("Expected", 1)
            .with("Actual", count)
    })
}

/// Read the registry token from the credentials secret.
///
/// Surrounding whitespace (typically a trailing newline from `--from-file`)
/// is stripped.
pub fn credential_token(secret: &Secret, secret_ref: &SecretRef) -> Result<Zeroizing<String>, Error> {
    let key = secret_ref.key_or_default();
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            Error::configuration(format!("Credential Secret does not contain key '{}'", key))
        })?;

    let raw = Zeroizing::new(String::from_utf8(bytes.0.clone()).map_err(|_| {
        Error::configuration(format!(
            "Credential Secret key '{}' is not valid UTF-8",
            key
        ))
    })?);

    let token = raw.trim();
    if token.is_empty() {
        return Err(Error::configuration(format!(
            "Credential Secret key '{}' is empty",
            key
        )));
    }
    Ok(Zeroizing::new(token.to_string()))
}

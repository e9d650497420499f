//! Kubernetes access for the webhook and the build reconciler

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use quay_bridge_common::crd::{ImageStream, ImageStreamImport, QuayIntegration};
use quay_bridge_common::Error;

/// Trait abstracting Kubernetes client operations for build handling
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// List all QuayIntegrations
    async fn list_integrations(&self) -> Result<Vec<QuayIntegration>, Error>;

    /// Get a ServiceAccount by name and namespace
    async fn get_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ServiceAccount>, Error>;

    /// Get an ImageStream by name and namespace
    async fn get_image_stream(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ImageStream>, Error>;

    /// Submit an ImageStreamImport request
    async fn create_image_stream_import(&self, import: &ImageStreamImport) -> Result<(), Error>;

    /// Set an annotation on a Build
    async fn annotate_build(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error>;
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
    async fn list_integrations(&self) -> Result<Vec<QuayIntegration>, Error> {
        let api: Api<QuayIntegration> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ServiceAccount>, Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_image_stream(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ImageStream>, Error> {
        let api: Api<ImageStream> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_image_stream_import(&self, import: &ImageStreamImport) -> Result<(), Error> {
        let namespace = import
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::internal("ImageStreamImport has no namespace"))?;
        let api: Api<ImageStreamImport> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), import).await?;
        Ok(())
    }

    async fn annotate_build(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let api: Api<quay_bridge_common::crd::Build> =
            Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": {
                "annotations": { key: value }
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

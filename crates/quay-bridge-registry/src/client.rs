//! HTTP client for the Quay v1 API

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;
use zeroize::Zeroizing;

use crate::error::RegistryError;
use crate::types::{
    Organization, OrganizationRequest, Prototype, PrototypesResponse, Repository,
    RepositoryRequest, RobotAccount, Role,
};

/// Status and, for 2xx responses, the decoded body
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryResponse<T> {
    /// HTTP status code
    pub status: u16,
    /// Decoded body; `None` for non-2xx responses
    pub body: Option<T>,
}

impl<T> RegistryResponse<T> {
    /// Response with a body
    pub fn ok(status: u16, body: T) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// Response without a body
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Operations the bridge performs against the registry.
///
/// Implementations return `Ok` for any HTTP status; callers decide which
/// statuses mean "absent" and which are failures.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// `GET /api/v1/organization/{org}`
    async fn get_organization(
        &self,
        org: &str,
    ) -> Result<RegistryResponse<Organization>, RegistryError>;

    /// `POST /api/v1/organization/`
    async fn create_organization(&self, org: &str) -> Result<RegistryResponse<()>, RegistryError>;

    /// `DELETE /api/v1/organization/{org}`
    async fn delete_organization(&self, org: &str) -> Result<RegistryResponse<()>, RegistryError>;

    /// `GET /api/v1/organization/{org}/robots/{short}`
    async fn get_robot_account(
        &self,
        org: &str,
        short_name: &str,
    ) -> Result<RegistryResponse<RobotAccount>, RegistryError>;

    /// `PUT /api/v1/organization/{org}/robots/{short}`
    async fn create_robot_account(
        &self,
        org: &str,
        short_name: &str,
    ) -> Result<RegistryResponse<RobotAccount>, RegistryError>;

    /// `GET /api/v1/organization/{org}/prototypes`
    async fn get_prototypes(
        &self,
        org: &str,
    ) -> Result<RegistryResponse<PrototypesResponse>, RegistryError>;

    /// `POST /api/v1/organization/{org}/prototypes`
    async fn create_prototype(
        &self,
        org: &str,
        robot: &str,
        role: Role,
    ) -> Result<RegistryResponse<Prototype>, RegistryError>;

    /// `GET /api/v1/repository/{org}/{repo}`
    async fn get_repository(
        &self,
        org: &str,
        repository: &str,
    ) -> Result<RegistryResponse<Repository>, RegistryError>;

    /// `POST /api/v1/repository`
    async fn create_repository(
        &self,
        org: &str,
        repository: &str,
    ) -> Result<RegistryResponse<()>, RegistryError>;
}

/// Builds registry clients from the active integration's settings
pub trait RegistryClientFactory: Send + Sync {
    /// Client for `hostname` authenticating with `token`
    fn connect(
        &self,
        hostname: &str,
        token: Zeroizing<String>,
        insecure: bool,
    ) -> Result<Arc<dyn RegistryClient>, RegistryError>;
}

/// Factory producing [`QuayClient`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct QuayClientFactory;

impl RegistryClientFactory for QuayClientFactory {
    fn connect(
        &self,
        hostname: &str,
        token: Zeroizing<String>,
        insecure: bool,
    ) -> Result<Arc<dyn RegistryClient>, RegistryError> {
        Ok(Arc::new(QuayClient::new(hostname, token, insecure)?))
    }
}

/// reqwest-backed Quay API client
pub struct QuayClient {
    http: reqwest::Client,
    base_url: Url,
    token: Zeroizing<String>,
}

impl QuayClient {
    /// Create a client for the registry at `hostname`.
    ///
    /// A hostname without a scheme is treated as `https://`. With `insecure`
    /// set, certificate verification is skipped.
    pub fn new(
        hostname: &str,
        token: Zeroizing<String>,
        insecure: bool,
    ) -> Result<Self, RegistryError> {
        let base_url = parse_base_url(hostname)?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| RegistryError::Transport {
                operation: "build http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidUrl {
                url: self.base_url.to_string(),
                message: "URL cannot carry a path".to_string(),
            })?
            .clear()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(self.token.as_str())
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<RegistryResponse<T>, RegistryError> {
        let response = request.send().await.map_err(|e| RegistryError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        debug!(operation, status, "registry response");

        if !response.status().is_success() {
            return Ok(RegistryResponse::status(status));
        }

        let bytes = response.bytes().await.map_err(|e| RegistryError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        let body = serde_json::from_slice(&bytes).map_err(|e| RegistryError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        Ok(RegistryResponse::ok(status, body))
    }

    async fn send_without_body(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<RegistryResponse<()>, RegistryError> {
        let response = request.send().await.map_err(|e| RegistryError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        debug!(operation, status, "registry response");
        Ok(if response.status().is_success() {
            RegistryResponse::ok(status, ())
        } else {
            RegistryResponse::status(status)
        })
    }

    fn with_json(
        &self,
        method: Method,
        url: Url,
        body: &impl Serialize,
    ) -> RequestBuilder {
        self.request(method, url).json(body)
    }
}

#[async_trait]
impl RegistryClient for QuayClient {
    #[instrument(skip(self))]
    async fn get_organization(
        &self,
        org: &str,
    ) -> Result<RegistryResponse<Organization>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", org])?;
        self.send(self.request(Method::GET, url), "get organization")
            .await
    }

    #[instrument(skip(self))]
    async fn create_organization(&self, org: &str) -> Result<RegistryResponse<()>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", ""])?;
        let request = self.with_json(Method::POST, url, &OrganizationRequest::new(org));
        self.send_without_body(request, "create organization").await
    }

    #[instrument(skip(self))]
    async fn delete_organization(&self, org: &str) -> Result<RegistryResponse<()>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", org])?;
        self.send_without_body(self.request(Method::DELETE, url), "delete organization")
            .await
    }

    #[instrument(skip(self))]
    async fn get_robot_account(
        &self,
        org: &str,
        short_name: &str,
    ) -> Result<RegistryResponse<RobotAccount>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", org, "robots", short_name])?;
        self.send(self.request(Method::GET, url), "get robot account")
            .await
    }

    #[instrument(skip(self))]
    async fn create_robot_account(
        &self,
        org: &str,
        short_name: &str,
    ) -> Result<RegistryResponse<RobotAccount>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", org, "robots", short_name])?;
        self.send(self.request(Method::PUT, url), "create robot account")
            .await
    }

    #[instrument(skip(self))]
    async fn get_prototypes(
        &self,
        org: &str,
    ) -> Result<RegistryResponse<PrototypesResponse>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", org, "prototypes"])?;
        self.send(self.request(Method::GET, url), "get prototypes")
            .await
    }

    #[instrument(skip(self))]
    async fn create_prototype(
        &self,
        org: &str,
        robot: &str,
        role: Role,
    ) -> Result<RegistryResponse<Prototype>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "organization", org, "prototypes"])?;
        let request = self.with_json(Method::POST, url, &Prototype::for_robot(robot, role));
        self.send(request, "create prototype").await
    }

    #[instrument(skip(self))]
    async fn get_repository(
        &self,
        org: &str,
        repository: &str,
    ) -> Result<RegistryResponse<Repository>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "repository", org, repository])?;
        self.send(self.request(Method::GET, url), "get repository")
            .await
    }

    #[instrument(skip(self))]
    async fn create_repository(
        &self,
        org: &str,
        repository: &str,
    ) -> Result<RegistryResponse<()>, RegistryError> {
        let url = self.endpoint(&["api", "v1", "repository"])?;
        let request = self.with_json(
            Method::POST,
            url,
            &RepositoryRequest::private_image(org, repository),
        );
        self.send_without_body(request, "create repository").await
    }
}

fn parse_base_url(hostname: &str) -> Result<Url, RegistryError> {
    let candidate = if hostname.contains("://") {
        hostname.to_string()
    } else {
        format!("https://{}", hostname)
    };
    let url = Url::parse(&candidate).map_err(|e| RegistryError::InvalidUrl {
        url: hostname.to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(RegistryError::InvalidUrl {
            url: hostname.to_string(),
            message: "missing host".to_string(),
        });
    }
    Ok(url)
}

//! Admission webhook server
//!
//! Serves the Build mutation endpoint over TLS on 8443, or over plain HTTP
//! on 8080 when TLS is disabled for local development.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tracing::info;

use quay_bridge_build::{mutate_handler, WebhookState};
use quay_bridge_common::{WEBHOOK_PATH, WEBHOOK_PLAIN_PORT, WEBHOOK_TLS_PORT};

/// How long in-flight admission requests may run after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Errors from the webhook server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Certificate or key could not be loaded
    #[error("failed to load TLS material from {cert} / {key}: {source}")]
    Tls {
        /// Certificate path
        cert: String,
        /// Key path
        key: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Server stopped with an error
    #[error("webhook server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Webhook server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// PEM certificate served to the API server
    pub cert_file: PathBuf,
    /// PEM private key for `cert_file`
    pub key_file: PathBuf,
    /// Serve plain HTTP instead of TLS
    pub ssl_disabled: bool,
}

impl ServerConfig {
    /// Address the server listens on
    pub fn addr(&self) -> SocketAddr {
        let port = if self.ssl_disabled {
            WEBHOOK_PLAIN_PORT
        } else {
            WEBHOOK_TLS_PORT
        };
        SocketAddr::from(([0, 0, 0, 0], port))
    }
}

/// Routes for the admission endpoint and the health probe
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the webhook until `shutdown` resolves
pub async fn serve<F>(
    config: ServerConfig,
    state: Arc<WebhookState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = webhook_router(state);
    let addr = config.addr();

    if config.ssl_disabled {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(%addr, "Starting admission webhook without TLS");
        return axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve);
    }

    let tls = RustlsConfig::from_pem_file(&config.cert_file, &config.key_file)
        .await
        .map_err(|source| ServerError::Tls {
            cert: config.cert_file.display().to_string(),
            key: config.key_file.display().to_string(),
            source,
        })?;

    let handle = axum_server::Handle::new();
    let signal = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        signal.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    info!(%addr, "Starting admission webhook");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(ServerError::Serve)
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

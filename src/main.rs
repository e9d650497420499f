//! Quay bridge operator - main entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use quay_bridge::config::OperatorConfig;
use quay_bridge::controller_runner::{
    build_build_controllers, build_integration_controllers, build_namespace_controllers,
    ControllerFuture,
};
use quay_bridge::webhook::{self, ServerConfig};
use quay_bridge_build::{KubeClientImpl, WebhookState};
use quay_bridge_common::crd::QuayIntegration;
use quay_bridge_common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use quay_bridge_common::{DEFAULT_WEBHOOK_CERT_FILE, DEFAULT_WEBHOOK_KEY_FILE, FIELD_MANAGER};

/// Quay bridge - onboards OpenShift namespaces and builds into a Quay registry
#[derive(Parser, Debug)]
#[command(name = "quay-bridge", version, about, long_about = None)]
struct Cli {
    /// Generate the QuayIntegration CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Webhook TLS certificate
    #[arg(long, env = "WEBHOOK_CERT_FILE", default_value = DEFAULT_WEBHOOK_CERT_FILE)]
    webhook_cert_file: PathBuf,

    /// Webhook TLS private key
    #[arg(long, env = "WEBHOOK_KEY_FILE", default_value = DEFAULT_WEBHOOK_KEY_FILE)]
    webhook_key_file: PathBuf,

    /// Serve the webhook over plain HTTP (development only)
    #[arg(long)]
    webhook_ssl_disable: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}. \
             The webhook cannot serve TLS without it.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&QuayIntegration::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let result = run(cli, OperatorConfig::from_env()).await;
    shutdown_telemetry();
    result
}

async fn run(cli: Cli, config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let mut tasks: Vec<ControllerFuture> = Vec::new();

    if config.runs_controllers() {
        ensure_crds_installed(&client).await?;

        tracing::info!("Starting Quay bridge controllers...");
        tasks.extend(build_namespace_controllers(client.clone()));
        tasks.extend(build_build_controllers(client.clone()));
        tasks.extend(build_integration_controllers(client.clone()));
    } else {
        tracing::info!("Webhook-only mode, controllers disabled");
    }

    if config.runs_webhook() {
        let server = ServerConfig {
            cert_file: cli.webhook_cert_file,
            key_file: cli.webhook_key_file,
            ssl_disabled: cli.webhook_ssl_disable,
        };
        let state = Arc::new(WebhookState::new(Arc::new(KubeClientImpl::new(client))));
        tasks.push(Box::pin(async move {
            if let Err(e) = webhook::serve(server, state, webhook::shutdown_signal()).await {
                tracing::error!(error = %e, "Admission webhook stopped");
            }
        }));
    } else {
        tracing::info!("Admission webhook disabled");
    }

    if tasks.is_empty() {
        tracing::warn!("Both controllers and webhook are disabled, nothing to run");
        return Ok(());
    }

    futures::future::select_all(tasks).await;

    tracing::info!("Quay bridge shutting down");
    Ok(())
}

/// Install or update the QuayIntegration CRD via server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing QuayIntegration CRD...");
    crds.patch(
        "quayintegrations.quay.redhat.com",
        &params,
        &Patch::Apply(&QuayIntegration::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install QuayIntegration CRD: {}", e))?;

    Ok(())
}

//! Controller runner - builds controller futures for each vertical slice
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use quay_bridge_common::crd::{Build, ImageStream, QuayIntegration};

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the namespace controller
///
/// ImageStream changes re-trigger their namespace so new streams get a
/// repository without waiting for the periodic resync.
pub fn build_namespace_controllers(client: Client) -> Vec<ControllerFuture> {
    use quay_bridge_namespace::{error_policy, image_stream_namespace, reconcile, Context};

    let ctx = Arc::new(Context::builder(client.clone()).build());
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let image_streams: Api<ImageStream> = Api::all(client);

    tracing::info!("- Namespace controller");

    vec![Box::pin(
        Controller::new(
            namespaces,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .watches(
            image_streams,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
            image_stream_namespace,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Namespace")),
    )]
}

/// Build the build completion controller
pub fn build_build_controllers(client: Client) -> Vec<ControllerFuture> {
    use quay_bridge_build::{error_policy, reconcile, Context};

    let ctx = Arc::new(Context::builder(client.clone()).build());
    let builds: Api<Build> = Api::all(client);

    tracing::info!("- Build controller");

    vec![Box::pin(
        Controller::new(builds, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("Build")),
    )]
}

/// Build the QuayIntegration status controller
pub fn build_integration_controllers(client: Client) -> Vec<ControllerFuture> {
    use quay_bridge_integration::{error_policy, reconcile, Context};

    let ctx = Arc::new(Context::builder(client.clone()).build());
    let integrations: Api<QuayIntegration> = Api::all(client);

    tracing::info!("- QuayIntegration controller");

    vec![Box::pin(
        Controller::new(
            integrations,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("QuayIntegration")),
    )]
}

/// Create a closure for logging reconciliation results
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

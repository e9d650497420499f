//! Kubernetes Events for bridged objects
//!
//! Failures reach users only as Warning events (see [`crate::report_error`]).
//! Successful transitions are recorded as Normal events via
//! [`EventPublisher::record`]. Publish failures are logged, never returned.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Action attached to Warning events raised by failed reconciles
pub const RECONCILE_ACTION: &str = "Reconcile";

/// Successful state changes worth surfacing on the object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Finalizer added; the namespace is now bridged
    NamespaceManaged,
    /// Organization created for a namespace
    OrganizationCreated,
    /// Organization removed during namespace teardown
    OrganizationDeleted,
    /// ImageStreamImport requested for a completed build
    ImageImported,
}

impl Transition {
    /// Event reason
    pub fn reason(self) -> &'static str {
        match self {
            Transition::NamespaceManaged => "NamespaceManaged",
            Transition::OrganizationCreated => "OrganizationCreated",
            Transition::OrganizationDeleted => "OrganizationDeleted",
            Transition::ImageImported => "ImageImported",
        }
    }

    /// Event action
    pub fn action(self) -> &'static str {
        match self {
            Transition::NamespaceManaged => RECONCILE_ACTION,
            Transition::OrganizationCreated => "Provision",
            Transition::OrganizationDeleted => "Delete",
            Transition::ImageImported => "Import",
        }
    }
}

/// Sink for Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event on `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );

    /// Record a successful transition as a Normal event
    async fn record(&self, resource_ref: &ObjectReference, transition: Transition, note: String) {
        self.publish(
            resource_ref,
            EventType::Normal,
            transition.reason(),
            transition.action(),
            Some(note),
        )
        .await;
    }
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Report as `controller_name`, tagged with this pod's name when known
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                object = resource_ref.name.as_deref().unwrap_or_default(),
                namespace = resource_ref.namespace.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to publish event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Captured(Mutex<Vec<(String, String, String, Option<String>)>>);

    #[async_trait]
    impl EventPublisher for Captured {
        async fn publish(
            &self,
            _resource_ref: &ObjectReference,
            type_: EventType,
            reason: &str,
            action: &str,
            note: Option<String>,
        ) {
            self.0.lock().unwrap().push((
                format!("{type_:?}"),
                reason.to_string(),
                action.to_string(),
                note,
            ));
        }
    }

    #[tokio::test]
    async fn record_publishes_normal_event() {
        let events = Captured::default();
        events
            .record(
                &ObjectReference::default(),
                Transition::OrganizationCreated,
                "Created organization acme_payments".to_string(),
            )
            .await;

        let captured = events.0.lock().unwrap();
        assert_eq!(
            captured[0],
            (
                "Normal".to_string(),
                "OrganizationCreated".to_string(),
                "Provision".to_string(),
                Some("Created organization acme_payments".to_string()),
            )
        );
    }

    #[test]
    fn transition_reasons_are_distinct() {
        let all = [
            Transition::NamespaceManaged,
            Transition::OrganizationCreated,
            Transition::OrganizationDeleted,
            Transition::ImageImported,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.reason(), b.reason());
            }
        }
    }
}

//! Error types and the reconcile error policy
//!
//! `Error` covers failures of individual operations. `ReconcileError` is what
//! reconcilers return: it names the object the failure is attributed to, the
//! context needed to debug it, and how the controller should retry.

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use thiserror::Error;
use tracing::error;

use crate::events::{EventPublisher, RECONCILE_ACTION};
use crate::REQUEUE_ERROR_SECS;

/// Reason recorded on events when no more specific one applies
pub const DEFAULT_REASON: &str = "Warning";

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Missing, ambiguous, or invalid QuayIntegration configuration
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's wrong
        message: String,
    },

    /// Malformed data written by an earlier stage (annotations, references)
    #[error("processing error: {message}")]
    Processing {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error: {message}")]
    Internal {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a processing error
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// Whether this is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    /// The reconcile error kind this failure maps to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kube { .. } => ErrorKind::Cluster,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Processing { .. } => ErrorKind::Processing,
            Error::Serialization { .. } | Error::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

/// Failure categories surfaced to users through events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Zero or several integrations, missing credential secret or key
    Configuration,
    /// Malformed annotations or unexpected component counts
    Processing,
    /// Unexpected registry status or transport failure
    Registry,
    /// Kubernetes read or write failure
    Cluster,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Event reason for this kind
    pub fn reason(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Processing => "ProcessingError",
            ErrorKind::Registry | ErrorKind::Cluster | ErrorKind::Internal => DEFAULT_REASON,
        }
    }
}

/// Boxed root cause carried by a [`ReconcileError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A reconcile failure attributed to a cluster object.
///
/// Every reconciler funnels its failures through this type so that they are
/// logged, surfaced as a Warning event on the object, and requeued uniformly.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ReconcileError {
    /// Failure category
    pub kind: ErrorKind,
    /// Object the event is recorded against
    pub object: ObjectReference,
    /// Human-readable summary
    pub message: String,
    /// Ordered key/value pairs rendered into the event note
    pub context: Vec<(String, String)>,
    /// Root cause, if any
    #[source]
    pub source: Option<BoxError>,
    /// Delay before the next attempt
    pub requeue_after: Duration,
    /// Wait for the next change instead of requeueing
    pub skip_requeue: bool,
}

impl ReconcileError {
    /// Create an error of the given kind against an object
    pub fn new(kind: ErrorKind, object: ObjectReference, message: impl Into<String>) -> Self {
        Self {
            kind,
            object,
            message: message.into(),
            context: Vec::new(),
            source: None,
            requeue_after: Duration::from_secs(REQUEUE_ERROR_SECS),
            skip_requeue: false,
        }
    }

    /// Configuration error against an object
    pub fn configuration(object: ObjectReference, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, object, message)
    }

    /// Processing error against an object
    pub fn processing(object: ObjectReference, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Processing, object, message)
    }

    /// Registry error against an object
    pub fn registry(object: ObjectReference, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registry, object, message)
    }

    /// Cluster API error against an object
    pub fn cluster(object: ObjectReference, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cluster, object, message)
    }

    /// Wrap an operation error, keeping its category
    pub fn from_error(object: ObjectReference, message: impl Into<String>, err: Error) -> Self {
        Self::new(err.kind(), object, message).caused_by(err)
    }

    /// Append a context pair
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Attach the root cause
    pub fn caused_by(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Override the requeue interval
    pub fn requeue_after(mut self, interval: Duration) -> Self {
        self.requeue_after = interval;
        self
    }

    /// Do not requeue; wait for the object to change
    pub fn skip_requeue(mut self) -> Self {
        self.skip_requeue = true;
        self
    }

    /// Event reason
    pub fn reason(&self) -> &'static str {
        self.kind.reason()
    }

    /// Value of a context key, if recorded
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Event note: `"{message} - {k}: {v}, ..."`
    pub fn event_note(&self) -> String {
        let pairs = self
            .context
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        if pairs.is_empty() {
            self.message.clone()
        } else {
            format!("{} - {}", self.message, pairs)
        }
    }

    /// Requeue decision for the controller's error policy
    pub fn action(&self) -> Action {
        if self.skip_requeue {
            Action::await_change()
        } else {
            Action::requeue(self.requeue_after)
        }
    }
}

/// Log a reconcile failure and record it as a Warning event on its object.
///
/// Event publishing is fire-and-forget; this never fails.
pub async fn report_error(err: &ReconcileError, events: &dyn EventPublisher) {
    let cause = err.source.as_ref().map(|s| s.to_string());
    error!(
        kind = ?err.kind,
        reason = err.reason(),
        object_kind = err.object.kind.as_deref().unwrap_or_default(),
        object_namespace = err.object.namespace.as_deref().unwrap_or_default(),
        object_name = err.object.name.as_deref().unwrap_or_default(),
        context = %err.event_note(),
        cause = cause.as_deref().unwrap_or_default(),
        "{}",
        err.message
    );

    events
        .publish(
            &err.object,
            EventType::Warning,
            err.reason(),
            RECONCILE_ACTION,
            Some(err.event_note()),
        )
        .await;
}

//! ImageStreamTag destinations
//!
//! The webhook records the original build target as `namespace/name:tag` in
//! the destination annotation; the completion reconciler parses it back.

use std::fmt;

use thiserror::Error;

/// A malformed destination or output name
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    /// The annotation did not split into exactly `namespace` and `name:tag`
    #[error("Unexpected number of ImageStream Annotation Components")]
    Components {
        /// Offending value
        value: String,
        /// Number of `/`-separated components found
        actual: usize,
    },

    /// The name did not split into exactly `name` and `tag`
    #[error("Unexpected number of ImageStream Name Components")]
    NameTag {
        /// Offending value
        value: String,
        /// Number of `:`-separated components found
        actual: usize,
    },
}

impl DestinationError {
    /// Component count expected by the failing split
    pub fn expected(&self) -> usize {
        2
    }

    /// Component count actually found
    pub fn actual(&self) -> usize {
        match self {
            DestinationError::Components { actual, .. } | DestinationError::NameTag { actual, .. } => {
                *actual
            }
        }
    }

    /// The rejected input
    pub fn value(&self) -> &str {
        match self {
            DestinationError::Components { value, .. } | DestinationError::NameTag { value, .. } => {
                value
            }
        }
    }
}

/// A tag on an ImageStream in a namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageStreamTagRef {
    /// Namespace holding the ImageStream
    pub namespace: String,
    /// ImageStream name
    pub name: String,
    /// Tag within the stream
    pub tag: String,
}

impl ImageStreamTagRef {
    /// Parse a destination annotation of the form `namespace/name:tag`
    pub fn parse(value: &str) -> Result<Self, DestinationError> {
        let parts: Vec<&str> = value.split('/').collect();
        let [namespace, name_tag] = parts.as_slice() else {
            return Err(DestinationError::Components {
                value: value.to_string(),
                actual: parts.len(),
            });
        };
        Self::from_output(namespace, name_tag)
    }

    /// Combine a namespace with an ImageStreamTag name (`name:tag`)
    pub fn from_output(namespace: &str, name_tag: &str) -> Result<Self, DestinationError> {
        let parts: Vec<&str> = name_tag.split(':').collect();
        match parts.as_slice() {
            [name, tag] if !namespace.is_empty() && !name.is_empty() && !tag.is_empty() => {
                Ok(Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    tag: tag.to_string(),
                })
            }
            _ => Err(DestinationError::NameTag {
                value: name_tag.to_string(),
                actual: parts.len(),
            }),
        }
    }

    /// Image reference inside the registry organization
    pub fn docker_image(&self, registry_host: &str, organization: &str) -> String {
        format!(
            "{}/{}/{}:{}",
            registry_host, organization, self.name, self.tag
        )
    }
}

impl fmt::Display for ImageStreamTagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_parses_and_formats_back() {
        let dest = ImageStreamTagRef::parse("payments/app:latest").unwrap();
        assert_eq!(dest.namespace, "payments");
        assert_eq!(dest.name, "app");
        assert_eq!(dest.tag, "latest");
        assert_eq!(dest.to_string(), "payments/app:latest");
    }

    #[test]
    fn missing_slash_rejected() {
        let err = ImageStreamTagRef::parse("app:latest").unwrap_err();
        assert_eq!(err.actual(), 1);
        assert_eq!(err.expected(), 2);
        assert!(matches!(err, DestinationError::Components { .. }));
    }

    #[test]
    fn extra_slash_rejected() {
        let err = ImageStreamTagRef::parse("a/b/c:d").unwrap_err();
        assert_eq!(err.actual(), 3);
        assert_eq!(err.value(), "a/b/c:d");
    }

    #[test]
    fn missing_or_extra_colon_rejected() {
        let err = ImageStreamTagRef::parse("payments/app").unwrap_err();
        assert_eq!(err, DestinationError::NameTag {
            value: "app".to_string(),
            actual: 1
        });
        assert_eq!(
            ImageStreamTagRef::parse("payments/app:v1:v2")
                .unwrap_err()
                .actual(),
            3
        );
    }

    #[test]
    fn empty_components_rejected() {
        assert!(ImageStreamTagRef::parse("/app:latest").is_err());
        assert!(ImageStreamTagRef::parse("payments/:latest").is_err());
        assert!(ImageStreamTagRef::parse("payments/app:").is_err());
        assert!(ImageStreamTagRef::parse("").is_err());
    }

    #[test]
    fn docker_image_joins_host_org_and_tag() {
        let dest = ImageStreamTagRef::from_output("payments", "app:latest").unwrap();
        assert_eq!(
            dest.docker_image("quay.example.com", "acme_payments"),
            "quay.example.com/acme_payments/app:latest"
        );
    }
}

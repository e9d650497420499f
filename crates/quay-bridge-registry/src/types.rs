//! Quay API payloads

use std::fmt;

use serde::{Deserialize, Serialize};

/// Organization-level permission granted through a prototype
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control
    Admin,
    /// Pull only
    Read,
    /// Push and pull
    Write,
}

impl Role {
    /// Wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Read => "read",
            Role::Write => "write",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organization lookup result; only existence matters
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Organization {
    /// Organization name
    #[serde(default)]
    pub name: String,
}

/// Body of `POST /api/v1/organization/`
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct OrganizationRequest {
    /// Organization name
    pub name: String,
    /// Contact address
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl OrganizationRequest {
    /// Request for an organization with the conventional contact address
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            email: format!("{}@redhat.com", name),
        }
    }
}

/// Robot account
#[derive(Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RobotAccount {
    /// Full name, `org+short`
    #[serde(default)]
    pub name: String,
    /// Credential used as the robot's password
    #[serde(default)]
    pub token: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Creation time as reported by the registry
    #[serde(default)]
    pub created: Option<String>,
    /// Last use as reported by the registry
    #[serde(default)]
    pub last_accessed: Option<String>,
}

impl fmt::Debug for RobotAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobotAccount")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("description", &self.description)
            .finish()
    }
}

/// Default permission applied to a delegate across an organization
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Prototype {
    /// Registry-assigned identifier; empty on create requests
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Granted role
    pub role: String,
    /// Who receives the role
    pub delegate: PrototypeDelegate,
}

impl Prototype {
    /// Prototype granting `role` to a robot account
    pub fn for_robot(robot: &str, role: Role) -> Self {
        Self {
            id: String::new(),
            role: role.as_str().to_string(),
            delegate: PrototypeDelegate {
                kind: "user".to_string(),
                name: robot.to_string(),
                is_robot: true,
                is_org_member: true,
            },
        }
    }
}

/// Prototype delegate
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PrototypeDelegate {
    /// `user` or `team`
    #[serde(default)]
    pub kind: String,
    /// Delegate name (`org+short` for robots)
    #[serde(default)]
    pub name: String,
    /// Whether the delegate is a robot account
    #[serde(default)]
    pub is_robot: bool,
    /// Whether the delegate belongs to the organization
    #[serde(default)]
    pub is_org_member: bool,
}

/// Body of `GET /api/v1/organization/{org}/prototypes`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PrototypesResponse {
    /// Prototypes defined on the organization
    #[serde(default)]
    pub prototypes: Vec<Prototype>,
}

impl PrototypesResponse {
    /// Whether some prototype grants `role` to the robot `robot`
    pub fn grants(&self, robot: &str, role: Role) -> bool {
        self.prototypes.iter().any(|p| {
            p.role == role.as_str() && p.delegate.is_robot && p.delegate.name == robot
        })
    }
}

/// Repository lookup result
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Repository {
    /// Repository name
    #[serde(default)]
    pub name: String,
    /// Owning organization
    #[serde(default)]
    pub namespace: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the repository is public
    #[serde(default)]
    pub is_public: bool,
}

/// Body of `POST /api/v1/repository`
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RepositoryRequest {
    /// Owning organization
    pub namespace: String,
    /// Repository name
    pub repository: String,
    /// `private` or `public`
    pub visibility: String,
    /// Free-form description
    pub description: String,
    /// Always `image`
    pub repo_kind: String,
}

impl RepositoryRequest {
    /// Private image repository request
    pub fn private_image(namespace: &str, repository: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            repository: repository.to_string(),
            visibility: "private".to_string(),
            description: String::new(),
            repo_kind: "image".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prototype_request_shape() {
        let json = serde_json::to_value(Prototype::for_robot("acme_payments+builder", Role::Write))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "write",
                "delegate": {
                    "kind": "user",
                    "name": "acme_payments+builder",
                    "is_robot": true,
                    "is_org_member": true
                }
            })
        );
    }

    #[test]
    fn prototype_lookup_requires_robot_name_and_role() {
        let prototypes: PrototypesResponse = serde_json::from_value(serde_json::json!({
            "prototypes": [
                {"id": "1", "role": "read", "delegate": {"kind": "user", "name": "acme_payments+default", "is_robot": true, "is_org_member": true}},
                {"id": "2", "role": "write", "delegate": {"kind": "user", "name": "acme_payments+builder", "is_robot": false, "is_org_member": true}},
                {"id": "3", "role": "admin", "delegate": {"kind": "team", "name": "owners"}}
            ]
        }))
        .unwrap();

        assert!(prototypes.grants("acme_payments+default", Role::Read));
        assert!(!prototypes.grants("acme_payments+default", Role::Write));
        // delegate is not flagged as a robot
        assert!(!prototypes.grants("acme_payments+builder", Role::Write));
        assert!(!prototypes.grants("acme_payments+deployer", Role::Read));
        assert!(!PrototypesResponse::default().grants("x", Role::Read));
    }

    #[test]
    fn request_bodies() {
        let org = serde_json::to_value(OrganizationRequest::new("acme_payments")).unwrap();
        assert_eq!(org["email"], "acme_payments@redhat.com");

        let repo =
            serde_json::to_value(RepositoryRequest::private_image("acme_payments", "app")).unwrap();
        assert_eq!(
            repo,
            serde_json::json!({
                "namespace": "acme_payments",
                "repository": "app",
                "visibility": "private",
                "description": "",
                "repo_kind": "image"
            })
        );
    }

    #[test]
    fn robot_debug_hides_token() {
        let robot = RobotAccount {
            name: "acme_payments+builder".to_string(),
            token: "s3cr3t".to_string(),
            ..Default::default()
        };
        let rendered = format!("{:?}", robot);
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("acme_payments+builder"));
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
        assert_eq!(Role::Read.to_string(), "read");
    }
}

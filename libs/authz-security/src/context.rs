use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of the caller behind a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    #[default]
    User,
    Service,
    /// Internal callers. Always pass every permission check.
    System,
    Anonymous,
}

impl SubjectType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Service => "service",
            Self::System => "system",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated (or anonymous) subject making a request.
///
/// Built per request from upstream identity resolution; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    /// Role names asserted by the identity layer.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission codes granted directly, bypassing role resolution.
    #[serde(default)]
    pub direct_permissions: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Subject {
    #[must_use]
    pub fn new(id: impl Into<String>, subject_type: SubjectType) -> Self {
        Self {
            id: id.into(),
            subject_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, SubjectType::User)
    }

    #[must_use]
    pub fn service(id: impl Into<String>) -> Self {
        Self::new(id, SubjectType::Service)
    }

    #[must_use]
    pub fn system(id: impl Into<String>) -> Self {
        Self::new(id, SubjectType::System)
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("anonymous", SubjectType::Anonymous)
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn with_direct_permissions(mut self, permissions: Vec<String>) -> Self {
        self.direct_permissions = permissions;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.subject_type == SubjectType::System
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
    Deleted,
}

/// Tenant partition key. No tenant-to-tenant relationship exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub status: TenantStatus,
}

impl Tenant {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TenantStatus::Active,
        }
    }
}

/// `RequestContext` carries the tenant, subject and free-form request attributes
/// through a single authorization call.
///
/// Each request owns its context value; nothing here is shared across requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    tenant: Tenant,
    subject: Subject,
    /// Runtime attributes (resource attributes, environment values) referenced
    /// by policy conditions and scope value sources.
    #[serde(default)]
    attributes: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    #[must_use]
    pub fn new(tenant: Tenant, subject: Subject) -> Self {
        Self {
            tenant,
            subject,
            attributes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, serde_json::Value> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

#[derive(Default)]
pub struct RequestContextBuilder {
    tenant: Option<Tenant>,
    subject: Option<Subject>,
    attributes: HashMap<String, serde_json::Value>,
}

impl RequestContextBuilder {
    #[must_use]
    pub fn tenant(mut self, tenant: Tenant) -> Self {
        self.tenant = Some(tenant);
        self
    }

    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant = Some(Tenant::new(tenant_id));
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            tenant: self.tenant.unwrap_or_default(),
            subject: self.subject.unwrap_or_else(Subject::anonymous),
            attributes: self.attributes,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_full() {
        let ctx = RequestContext::builder()
            .tenant_id("t1")
            .subject(
                Subject::user("u1")
                    .with_roles(vec!["manager".to_owned()])
                    .with_metadata("department_id", json!("d-7")),
            )
            .attribute("region", json!("eu"))
            .build();

        assert_eq!(ctx.tenant_id(), "t1");
        assert_eq!(ctx.tenant().status, TenantStatus::Active);
        assert_eq!(ctx.subject().id, "u1");
        assert_eq!(ctx.subject().roles, vec!["manager"]);
        assert_eq!(ctx.attribute("region"), Some(&json!("eu")));
    }

    #[test]
    fn builder_defaults_to_anonymous_subject() {
        let ctx = RequestContext::builder().tenant_id("t1").build();
        assert_eq!(ctx.subject().subject_type, SubjectType::Anonymous);
        assert!(ctx.attributes().is_empty());
    }

    #[test]
    fn system_subject_is_flagged() {
        assert!(Subject::system("scheduler").is_system());
        assert!(!Subject::service("billing").is_system());
    }

    #[test]
    fn subject_type_serializes_as_snake_case() {
        let subject = Subject::service("svc-1");
        let value = serde_json::to_value(&subject).unwrap();
        assert_eq!(value["type"], json!("service"));
        assert_eq!(SubjectType::Anonymous.to_string(), "anonymous");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

// --- Subject ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    ServiceAccount,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKind::User => write!(f, "User"),
            SubjectKind::ServiceAccount => write!(f, "ServiceAccount"),
        }
    }
}

/// The identity a binding grants a role to.
/// `namespace` is only set for service accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Subject {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.into(),
            namespace: None,
        }
    }

    pub fn service_account(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

// --- Binding ---

/// Where a binding applies: the whole cluster (ClusterRoleBinding)
/// or a single namespace (RoleBinding).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BindingScope {
    Cluster,
    Namespace(String),
}

impl BindingScope {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            BindingScope::Cluster => None,
            BindingScope::Namespace(ns) => Some(ns),
        }
    }
}

/// A single binding resource, fully described. Writing it always replaces
/// any existing resource of the same name and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSpec {
    pub name: String,
    pub scope: BindingScope,
    pub subject: Subject,
    /// Name of the referenced ClusterRole.
    pub role_ref: String,
}

impl BindingSpec {
    pub fn new(subject: &Subject, role: &str, scope: BindingScope) -> Self {
        Self {
            name: binding_name(&subject.name, role),
            scope,
            subject: subject.clone(),
            role_ref: role.to_string(),
        }
    }
}

/// Deterministic binding name for an (identity, role) pair.
pub fn binding_name(identity: &str, role: &str) -> String {
    format!("{}-{}", identity, role)
}

/// Roles to grant, and the namespaces to grant them in.
/// An empty namespace list means cluster scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSet {
    pub roles: Vec<String>,
    pub namespaces: Vec<String>,
}

impl BindingSet {
    pub fn new(roles: Vec<String>, namespaces: Vec<String>) -> Self {
        Self { roles, namespaces }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Every binding this set expands to for `subject`, namespaces first,
    /// roles in caller order within each namespace.
    pub fn plan(&self, subject: &Subject) -> Vec<BindingSpec> {
        if self.is_cluster_scoped() {
            return self
                .roles
                .iter()
                .map(|role| BindingSpec::new(subject, role, BindingScope::Cluster))
                .collect();
        }
        self.namespaces
            .iter()
            .flat_map(|ns| {
                self.roles.iter().map(move |role| {
                    BindingSpec::new(subject, role, BindingScope::Namespace(ns.clone()))
                })
            })
            .collect()
    }
}

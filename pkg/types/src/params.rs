use anyhow::bail;
use pkg_constants::kubeconfig::KUBECONFIG_EXTENSION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::rbac::{BindingSet, Subject};

// --- Request ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    /// Mutual-TLS client certificate signed by the cluster.
    #[serde(rename = "cert")]
    Certificate,
    /// Service account bearer token.
    Token,
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialType::Certificate => write!(f, "cert"),
            CredentialType::Token => write!(f, "token"),
        }
    }
}

impl FromStr for CredentialType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "cert" | "certificate" => Ok(CredentialType::Certificate),
            "token" => Ok(CredentialType::Token),
            other => bail!("unknown credential type '{}' (expected cert or token)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Cluster,
    Namespaces(Vec<String>),
}

impl Scope {
    /// Namespaces the identity is bound in; empty for cluster scope.
    pub fn target_namespaces(&self) -> &[String] {
        match self {
            Scope::Cluster => &[],
            Scope::Namespaces(list) => list,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::Namespaces(list) => write!(f, "namespace({})", list.join(",")),
        }
    }
}

/// Split a comma separated namespace list, dropping blanks.
pub fn parse_namespace_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Who to issue a credential for. Fixed once issuance begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRequest {
    pub name: String,
    pub credential_type: CredentialType,
    pub scope: Scope,
}

// --- Cluster ---

/// Connection details embedded into the emitted client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub name: String,
    pub endpoint: String,
    /// PEM bundle; fetched from the cluster when left empty.
    pub ca_data: String,
}

// --- Credential ---

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ClientCertificate {
        certificate_pem: String,
        private_key_pem: String,
    },
    Token(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ClientCertificate { .. } => write!(f, "ClientCertificate(***)"),
            Credential::Token(token) => write!(f, "Token({})", mask(token)),
        }
    }
}

/// First four characters followed by `***`.
pub fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}***", visible)
}

// --- Params ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceAccountMode {
    /// Use a service account that already exists.
    Existing,
    /// Create the service account; fail if it already exists.
    #[default]
    Create,
}

/// The record threaded through every generator stage.
#[derive(Debug, Clone)]
pub struct Params {
    pub request: IdentityRequest,
    pub cluster: ClusterInfo,
    pub save_as: Option<String>,
    pub cluster_roles: Vec<String>,
    pub service_account_mode: ServiceAccountMode,
    pub service_account_namespace: Option<String>,
    pub credential: Option<Credential>,
}

impl Params {
    pub fn new(name: impl Into<String>, credential_type: CredentialType) -> Self {
        Self {
            request: IdentityRequest {
                name: name.into(),
                credential_type,
                scope: Scope::Cluster,
            },
            cluster: ClusterInfo::default(),
            save_as: None,
            cluster_roles: Vec::new(),
            service_account_mode: ServiceAccountMode::default(),
            service_account_namespace: None,
            credential: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.request.name
    }

    pub fn target_namespaces(&self) -> &[String] {
        self.request.scope.target_namespaces()
    }

    /// Output filename: `save_as`, or `{identity}.kubeconfig`.
    pub fn save_as_file(&self) -> String {
        match self.save_as.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}.{}", self.request.name, KUBECONFIG_EXTENSION),
        }
    }

    /// The RBAC subject this identity is bound as.
    pub fn subject(&self) -> Subject {
        match (self.request.credential_type, &self.service_account_namespace) {
            (CredentialType::Token, Some(ns)) => Subject::service_account(&self.request.name, ns),
            _ => Subject::user(&self.request.name),
        }
    }

    pub fn binding_set(&self) -> BindingSet {
        BindingSet::new(self.cluster_roles.clone(), self.target_namespaces().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_list_parsing() {
        assert!(parse_namespace_list("").is_empty());
        assert_eq!(parse_namespace_list("abc"), vec!["abc"]);
        assert_eq!(
            parse_namespace_list("staging, prod,,"),
            vec!["staging", "prod"]
        );
    }

    #[test]
    fn default_save_as_uses_identity() {
        let mut p = Params::new("alice", CredentialType::Certificate);
        assert_eq!(p.save_as_file(), "alice.kubeconfig");
        p.save_as = Some("  ".into());
        assert_eq!(p.save_as_file(), "alice.kubeconfig");
        p.save_as = Some("team.conf".into());
        assert_eq!(p.save_as_file(), "team.conf");
    }

    #[test]
    fn subject_follows_credential_type() {
        let p = Params::new("alice", CredentialType::Certificate);
        assert_eq!(p.subject(), Subject::user("alice"));

        let mut p = Params::new("ci-bot", CredentialType::Token);
        p.service_account_namespace = Some("ci".into());
        assert_eq!(p.subject(), Subject::service_account("ci-bot", "ci"));
    }

    #[test]
    fn cluster_scope_has_no_target_namespaces() {
        let mut p = Params::new("alice", CredentialType::Certificate);
        assert!(p.target_namespaces().is_empty());
        p.request.scope = Scope::Namespaces(vec!["dev".into()]);
        assert_eq!(p.binding_set().namespaces, vec!["dev"]);
    }

    #[test]
    fn credential_debug_hides_secrets() {
        let token = Credential::Token("abcdefgh".into());
        assert_eq!(format!("{:?}", token), "Token(abcd***)");
        let cert = Credential::ClientCertificate {
            certificate_pem: "CERT".into(),
            private_key_pem: "KEY".into(),
        };
        assert!(!format!("{:?}", cert).contains("KEY"));
    }

    #[test]
    fn credential_type_parsing() {
        assert_eq!("cert".parse::<CredentialType>().unwrap(), CredentialType::Certificate);
        assert_eq!("token".parse::<CredentialType>().unwrap(), CredentialType::Token);
        assert!("ssl".parse::<CredentialType>().is_err());
    }
}

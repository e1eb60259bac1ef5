//! Client configuration rendering.
//!
//! One cluster, one user and one context; the context and the cluster
//! share a name and the context is current. Key material is embedded as
//! base64 `*-data` fields so the file is self-contained.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pkg_constants::kubeconfig::{KUBECONFIG_API_VERSION, KUBECONFIG_FILE_MODE, KUBECONFIG_KIND};
use pkg_types::params::{Credential, Params};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::GenerateError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    pub certificate_authority_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

/// Build the configuration for an identity whose credential has been acquired.
pub fn render(params: &Params) -> Result<Kubeconfig, GenerateError> {
    let credential = params.credential.as_ref().ok_or_else(|| {
        GenerateError::precondition(format!("no credential acquired for '{}'", params.username()))
    })?;
    if params.cluster.ca_data.trim().is_empty() {
        return Err(GenerateError::precondition("missing required CA data"));
    }
    if params.cluster.endpoint.trim().is_empty() {
        return Err(GenerateError::precondition("missing cluster endpoint"));
    }

    let user = match credential {
        Credential::ClientCertificate {
            certificate_pem,
            private_key_pem,
        } => UserEntry {
            client_certificate_data: Some(STANDARD.encode(certificate_pem)),
            client_key_data: Some(STANDARD.encode(private_key_pem)),
            token: None,
        },
        Credential::Token(token) => UserEntry {
            token: Some(token.clone()),
            ..Default::default()
        },
    };

    let cluster_name = params.cluster.name.clone();
    let user_name = params.username().to_string();
    Ok(Kubeconfig {
        api_version: KUBECONFIG_API_VERSION.to_string(),
        kind: KUBECONFIG_KIND.to_string(),
        clusters: vec![NamedCluster {
            name: cluster_name.clone(),
            cluster: ClusterEntry {
                server: params.cluster.endpoint.clone(),
                certificate_authority_data: STANDARD.encode(&params.cluster.ca_data),
            },
        }],
        users: vec![NamedUser {
            name: user_name.clone(),
            user,
        }],
        contexts: vec![NamedContext {
            name: cluster_name.clone(),
            context: ContextEntry {
                cluster: cluster_name.clone(),
                user: user_name,
            },
        }],
        current_context: cluster_name,
    })
}

pub fn to_yaml(config: &Kubeconfig) -> Result<String, GenerateError> {
    Ok(serde_yaml::to_string(config)?)
}

/// Render and write the configuration into `dir`, returning the file path.
/// An existing file is overwritten. The file is readable by its owner only.
pub fn write_kubeconfig(params: &Params, dir: &Path) -> Result<PathBuf, GenerateError> {
    let yaml = to_yaml(&render(params)?)?;
    let path = dir.join(params.save_as_file());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_private(&path, yaml.as_bytes())?;
    info!(
        identity = %params.username(),
        path = %path.display(),
        "Wrote kubeconfig"
    );
    Ok(path)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(KUBECONFIG_FILE_MODE)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(KUBECONFIG_FILE_MODE))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(contents)
}

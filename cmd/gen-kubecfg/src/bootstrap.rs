use anyhow::{Context, Result, bail};
use kube::config::{KubeConfigOptions, Kubeconfig};
use pkg_constants::paths::{DEFAULT_KUBECONFIG_PATH, KUBECONFIG_ENV};
use pkg_types::params::ClusterInfo;
use std::path::{Path, PathBuf};
use tracing::info;

/// Ambient kubeconfig: the explicit path, else the first `$KUBECONFIG`
/// entry, else `~/.kube/config`.
pub fn kubeconfig_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(value) = std::env::var_os(KUBECONFIG_ENV) {
        if let Some(first) = std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()) {
            return Ok(first);
        }
    }
    let home = dirs::home_dir().context("cannot determine home directory")?;
    Ok(home.join(DEFAULT_KUBECONFIG_PATH))
}

/// Name the emitted configuration uses for the cluster: the current
/// context when set, otherwise the first cluster entry.
pub fn cluster_name(kubeconfig: &Kubeconfig) -> Result<String> {
    if kubeconfig.clusters.is_empty() {
        bail!("no cluster found in kubeconfig");
    }
    if let Some(current) = kubeconfig.current_context.as_deref() {
        if !current.is_empty() {
            return Ok(current.to_string());
        }
    }
    Ok(kubeconfig.clusters[0].name.clone())
}

/// Connect to the cluster of the ambient kubeconfig.
///
/// Returns the client together with the cluster name and endpoint. The CA
/// bundle is left empty; parameter collection fetches it from the cluster.
pub async fn connect(path: &Path) -> Result<(kube::Client, ClusterInfo)> {
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("read kubeconfig {}", path.display()))?;
    let name = cluster_name(&kubeconfig)?;

    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("load cluster config from {}", path.display()))?;
    let endpoint = config.cluster_url.to_string().trim_end_matches('/').to_string();
    let client = kube::Client::try_from(config).context("create cluster client")?;

    info!(cluster = %name, endpoint = %endpoint, "Connected");
    Ok((
        client,
        ClusterInfo {
            name,
            endpoint,
            ca_data: String::new(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Kubeconfig {
        Kubeconfig::from_yaml(yaml).unwrap()
    }

    const TWO_CLUSTERS: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: dev
  cluster:
    server: https://dev.example:6443
- name: prod
  cluster:
    server: https://prod.example:6443
contexts:
- name: prod-admin
  context:
    cluster: prod
    user: admin
users:
- name: admin
  user:
    token: abc
"#;

    #[test]
    fn current_context_names_the_cluster() {
        let mut kc = parse(TWO_CLUSTERS);
        kc.current_context = Some("prod-admin".into());
        assert_eq!(cluster_name(&kc).unwrap(), "prod-admin");
    }

    #[test]
    fn first_cluster_without_current_context() {
        let kc = parse(TWO_CLUSTERS);
        assert_eq!(cluster_name(&kc).unwrap(), "dev");
    }

    #[test]
    fn no_clusters_is_an_error() {
        let kc = Kubeconfig::default();
        let err = cluster_name(&kc).unwrap_err();
        assert!(err.to_string().contains("no cluster found"));
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            kubeconfig_path(Some("/tmp/kc.yaml")).unwrap(),
            PathBuf::from("/tmp/kc.yaml")
        );
    }
}

use serde::{Deserialize, Serialize};

/// Tool configuration file (YAML). Every field is optional; CLI flags
/// override it and built-in defaults fill the rest.
///
/// Example `gen-kubecfg.yaml`:
/// ```yaml
/// poll-attempts: 10
/// poll-interval-secs: 2
/// poll-backoff: 1.5
/// signer-name: kubernetes.io/kube-apiserver-client
/// ca-config-map: extension-apiserver-authentication
/// ca-config-map-namespace: kube-system
/// ca-config-map-key: client-ca-file
/// output-dir: ./kubeconfigs
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfigFile {
    #[serde(default, alias = "poll-attempts")]
    pub poll_attempts: Option<u32>,
    #[serde(default, alias = "poll-interval-secs")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, alias = "poll-backoff")]
    pub poll_backoff: Option<f64>,
    #[serde(default, alias = "secret-wait-attempts")]
    pub secret_wait_attempts: Option<u32>,
    #[serde(default, alias = "signer-name")]
    pub signer_name: Option<String>,
    #[serde(default, alias = "ca-config-map")]
    pub ca_config_map: Option<String>,
    #[serde(default, alias = "ca-config-map-namespace")]
    pub ca_config_map_namespace: Option<String>,
    #[serde(default, alias = "ca-config-map-key")]
    pub ca_config_map_key: Option<String>,
    #[serde(default, alias = "output-dir")]
    pub output_dir: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

//! Filesystem path and environment constants.

/// Environment variable that may point at the ambient kubeconfig.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Ambient kubeconfig location relative to the home directory.
pub const DEFAULT_KUBECONFIG_PATH: &str = ".kube/config";

/// Default location of the optional tool config file.
pub const DEFAULT_TOOL_CONFIG: &str = "gen-kubecfg.yaml";

/// Default directory for emitted kubeconfig files.
pub const DEFAULT_OUTPUT_DIR: &str = ".";

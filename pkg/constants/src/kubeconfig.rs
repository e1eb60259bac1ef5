//! Client configuration file constants.

/// `apiVersion` of the emitted document.
pub const KUBECONFIG_API_VERSION: &str = "v1";

/// `kind` of the emitted document.
pub const KUBECONFIG_KIND: &str = "Config";

/// Extension of the default output filename (`{identity}.kubeconfig`).
pub const KUBECONFIG_EXTENSION: &str = "kubeconfig";

/// Unix permissions of the emitted file. It embeds a key or a token.
pub const KUBECONFIG_FILE_MODE: u32 = 0o600;

//! Cluster-side object locations and RBAC constants.

// ─── Cluster CA ────────────────────────────────────────────────────────────

/// Namespace holding the config map with the cluster CA bundle.
pub const CA_CONFIG_MAP_NAMESPACE: &str = "kube-system";

/// Config map published by the API server with its client CA bundle.
pub const CA_CONFIG_MAP: &str = "extension-apiserver-authentication";

/// Key inside [`CA_CONFIG_MAP`] that holds the PEM bundle.
pub const CA_CONFIG_MAP_KEY: &str = "client-ca-file";

// ─── Service accounts ──────────────────────────────────────────────────────

/// Key inside a service account token secret that holds the bearer token.
pub const SERVICE_ACCOUNT_TOKEN_KEY: &str = "token";

/// Attempts made to read the token secret of a freshly created service account.
pub const DEFAULT_SECRET_WAIT_ATTEMPTS: u32 = 5;

/// Wait between two token secret reads, in seconds.
pub const DEFAULT_SECRET_WAIT_INTERVAL_SECS: u64 = 1;

// ─── RBAC ──────────────────────────────────────────────────────────────────

/// API group of role bindings and their role references.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Kind referenced by every binding this tool writes.
pub const ROLE_REF_KIND: &str = "ClusterRole";

/// Label stamped on objects created by this tool.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`].
pub const MANAGED_BY: &str = "gen-kubecfg";

//! Certificate signing request constants.

// ─── Polling ───────────────────────────────────────────────────────────────

/// How many times the signed certificate is fetched before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 5;

/// Fixed wait between two unsuccessful fetches, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Multiplier applied to the interval after every unsuccessful fetch.
/// `1.0` keeps the interval fixed.
pub const DEFAULT_POLL_BACKOFF: f64 = 1.0;

/// Upper bound on a single wait, whatever the interval and backoff.
pub const MAX_POLL_DELAY_SECS: u64 = 300;

// ─── Request ───────────────────────────────────────────────────────────────

/// Built-in signer that issues client certificates trusted by the API server.
pub const DEFAULT_SIGNER_NAME: &str = "kubernetes.io/kube-apiserver-client";

/// Key usages requested for client certificates.
pub const CLIENT_USAGES: &[&str] = &["digital signature", "client auth"];

/// Condition type set on a request once it has been approved.
pub const CONDITION_APPROVED: &str = "Approved";

/// Condition type set on a request that was denied.
pub const CONDITION_DENIED: &str = "Denied";

/// Reason recorded on the approval condition.
pub const APPROVAL_REASON: &str = "GenKubecfgApprove";

/// Message recorded on the approval condition.
pub const APPROVAL_MESSAGE: &str = "approved by gen-kubecfg";

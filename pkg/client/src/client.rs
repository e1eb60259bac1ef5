use async_trait::async_trait;
use pkg_constants::csr::{
    DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_BACKOFF, DEFAULT_POLL_INTERVAL_SECS, MAX_POLL_DELAY_SECS,
};
use pkg_types::rbac::BindingSpec;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ClientError;

/// Cluster-side view of a certificate signing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrStatus {
    /// PEM certificate issued by the signer, if any.
    pub certificate: Option<String>,
    pub approved: bool,
    pub denied: bool,
}

impl CsrStatus {
    /// Signed and approved: the terminal success state of a request.
    pub fn signed_certificate(&self) -> Option<&str> {
        match self.certificate.as_deref() {
            Some(cert) if self.approved && !cert.trim().is_empty() => Some(cert),
            _ => None,
        }
    }
}

/// Bounded retry policy: a fixed number of attempts separated by
/// `interval`, optionally growing by `backoff_multiplier` after each one.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff_multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            backoff_multiplier: DEFAULT_POLL_BACKOFF,
        }
    }
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Default::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn with_backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Wait after the given (1-based) unsuccessful attempt, capped at
    /// [`MAX_POLL_DELAY_SECS`].
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = Duration::from_secs(MAX_POLL_DELAY_SECS);
        if self.interval.is_zero() {
            return Duration::ZERO;
        }
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.interval.as_secs_f64() * factor)
            .map_or(cap, |delay| delay.min(cap))
    }
}

/// Run `attempt` until it yields `Some`, at most `policy.max_attempts` times.
///
/// `Ok(None)` from an attempt means "not yet" and is followed by a wait;
/// an `Err` aborts immediately. Returns `Ok(None)` once attempts run out.
/// There is no wait after the final attempt.
pub async fn poll_with_policy<T, E, F, Fut>(
    policy: &PollPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    for n in 1..=policy.max_attempts {
        if let Some(value) = attempt(n).await? {
            debug!(operation = %operation, attempt = n, "Poll succeeded");
            return Ok(Some(value));
        }
        if n < policy.max_attempts {
            let delay = policy.delay_after(n);
            debug!(
                operation = %operation,
                attempt = n,
                delay_ms = delay.as_millis() as u64,
                "Not ready, waiting"
            );
            tokio::time::sleep(delay).await;
        }
    }
    Ok(None)
}

/// Operations the generators need from the cluster control plane.
///
/// Every call may fail with [`ClientError::Transport`]; "not found" and
/// "already exists" are reported as their own variants.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Names of all cluster roles. Empty when none exist.
    async fn list_role_names(&self) -> Result<Vec<String>, ClientError>;

    async fn list_service_accounts(&self, namespace: &str) -> Result<Vec<String>, ClientError>;

    async fn create_service_account(&self, namespace: &str, name: &str)
    -> Result<(), ClientError>;

    /// Bearer token from the first secret linked to the service account.
    /// Fails with [`ClientError::Lookup`] when no secret is linked.
    async fn service_account_token(&self, namespace: &str, name: &str)
    -> Result<String, ClientError>;

    /// Create the namespace unless it exists. Losing a creation race is not an error.
    async fn ensure_namespace(&self, name: &str) -> Result<(), ClientError>;

    /// Delete any request called `name`, then submit a new one.
    async fn submit_csr(&self, name: &str, request_pem: &str) -> Result<(), ClientError>;

    /// Mark the request approved. The certificate is issued later by the signer.
    async fn approve_csr(&self, name: &str) -> Result<(), ClientError>;

    async fn get_csr(&self, name: &str) -> Result<CsrStatus, ClientError>;

    /// Fetch the request until it is approved and carries a certificate.
    ///
    /// Failed fetches count as attempts. Running out of attempts yields
    /// [`ClientError::TimedOut`], never a transport error.
    async fn poll_csr(&self, name: &str, policy: &PollPolicy) -> Result<String, ClientError> {
        // Error of the most recent fetch; cleared by a successful one.
        let last_error: Mutex<Option<String>> = Mutex::new(None);
        let last_error_ref = &last_error;
        let signed = poll_with_policy(policy, "poll_csr", |attempt| async move {
            let fetched = self.get_csr(name).await;
            let mut last = last_error_ref.lock().unwrap_or_else(PoisonError::into_inner);
            match fetched {
                Ok(status) => {
                    *last = None;
                    if status.denied {
                        warn!(csr = %name, attempt, "Request carries a Denied condition");
                    }
                    Ok::<_, ClientError>(status.signed_certificate().map(str::to_string))
                }
                Err(e) => {
                    warn!(csr = %name, attempt, error = %e, "Failed to fetch request");
                    *last = Some(e.to_string());
                    Ok(None)
                }
            }
        })
        .await?;

        signed.ok_or_else(|| ClientError::TimedOut {
            name: name.to_string(),
            attempts: policy.max_attempts,
            last_error: last_error
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        })
    }

    /// Delete the binding if it exists, then create it from `binding`.
    async fn upsert_binding(&self, binding: &BindingSpec) -> Result<(), ClientError>;

    /// PEM bundle of the cluster CA.
    async fn cluster_ca(&self) -> Result<String, ClientError>;
}

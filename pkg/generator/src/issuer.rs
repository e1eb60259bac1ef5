use pkg_client::{PollPolicy, ResourceClient};
use pkg_pki::{CsrRecord, draft_csr};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::GenerateError;

/// Lifecycle of one certificate signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    Drafted,
    Submitted,
    Approved,
    Polling,
    Signed,
    TimedOut,
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssuanceState::Drafted => "drafted",
            IssuanceState::Submitted => "submitted",
            IssuanceState::Approved => "approved",
            IssuanceState::Polling => "polling",
            IssuanceState::Signed => "signed",
            IssuanceState::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Drafts a key and request, gets it approved and waits for the signer.
pub struct CredentialIssuer {
    client: Arc<dyn ResourceClient>,
    policy: PollPolicy,
}

impl CredentialIssuer {
    pub fn new(client: Arc<dyn ResourceClient>, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Issue a client certificate for `common_name`.
    ///
    /// The request is named after the identity, so a request left over
    /// from an earlier run is replaced rather than reused.
    pub async fn issue(&self, common_name: &str) -> Result<CsrRecord, GenerateError> {
        let record = draft_csr(common_name)?;
        transition(common_name, IssuanceState::Drafted);

        self.client
            .submit_csr(common_name, &record.request_pem)
            .await?;
        transition(common_name, IssuanceState::Submitted);

        self.client.approve_csr(common_name).await?;
        transition(common_name, IssuanceState::Approved);

        transition(common_name, IssuanceState::Polling);
        let certificate = match self.client.poll_csr(common_name, &self.policy).await {
            Ok(cert) => cert,
            Err(e) => {
                if e.is_timeout() {
                    transition(common_name, IssuanceState::TimedOut);
                }
                return Err(e.into());
            }
        };

        if certificate.trim().is_empty() {
            return Err(GenerateError::precondition(format!(
                "signer returned an empty certificate for '{}'",
                common_name
            )));
        }
        transition(common_name, IssuanceState::Signed);
        Ok(record.signed(certificate))
    }
}

fn transition(identity: &str, state: IssuanceState) {
    match state {
        IssuanceState::TimedOut => {
            warn!(identity = %identity, state = %state, "Certificate request not signed in time")
        }
        _ => info!(identity = %identity, state = %state, "Certificate request"),
    }
}

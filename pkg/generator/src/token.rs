use pkg_client::{ClientError, PollPolicy, ResourceClient, poll_with_policy};
use pkg_types::params::{ServiceAccountMode, mask};
use std::sync::Arc;
use tracing::{debug, info};

use crate::GenerateError;

/// Resolves the bearer token of a service account, creating the account
/// first when asked to.
pub struct TokenProvider {
    client: Arc<dyn ResourceClient>,
    /// Bounds how long a freshly created account may go without a secret.
    secret_wait: PollPolicy,
}

impl TokenProvider {
    pub fn new(client: Arc<dyn ResourceClient>, secret_wait: PollPolicy) -> Self {
        Self {
            client,
            secret_wait,
        }
    }

    pub async fn resolve(
        &self,
        namespace: &str,
        name: &str,
        mode: ServiceAccountMode,
    ) -> Result<String, GenerateError> {
        match mode {
            ServiceAccountMode::Existing => self.existing(namespace, name).await,
            ServiceAccountMode::Create => self.provision(namespace, name).await,
        }
    }

    /// Token of an account that already exists. Read once.
    pub async fn existing(&self, namespace: &str, name: &str) -> Result<String, GenerateError> {
        let token = self.client.service_account_token(namespace, name).await?;
        info!(namespace = %namespace, account = %name, token = %mask(&token), "Resolved token");
        Ok(token)
    }

    /// Create the account and wait for its token secret.
    ///
    /// An account with the same name is a hard failure: the caller asked
    /// for a new identity and must not silently inherit another one.
    pub async fn provision(&self, namespace: &str, name: &str) -> Result<String, GenerateError> {
        let accounts = self.client.list_service_accounts(namespace).await?;
        if accounts.iter().any(|a| a == name) {
            return Err(duplicate(namespace, name));
        }

        match self.client.create_service_account(namespace, name).await {
            Ok(()) => info!(namespace = %namespace, account = %name, "Created service account"),
            Err(e) if e.is_already_exists() => return Err(duplicate(namespace, name)),
            Err(e) => return Err(e.into()),
        }

        let client = &self.client;
        let token = poll_with_policy(&self.secret_wait, "service_account_token", |attempt| async move {
            match client.service_account_token(namespace, name).await {
                Ok(token) => Ok(Some(token)),
                Err(e) if e.is_lookup() => {
                    debug!(namespace = %namespace, account = %name, attempt, "Token secret not linked yet");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await?;

        let token = token.ok_or_else(|| {
            ClientError::Lookup(format!(
                "service account {}/{} has no linked secret after {} attempts",
                namespace, name, self.secret_wait.max_attempts
            ))
        })?;
        info!(namespace = %namespace, account = %name, token = %mask(&token), "Resolved token");
        Ok(token)
    }
}

fn duplicate(namespace: &str, name: &str) -> GenerateError {
    GenerateError::precondition(format!(
        "service account \"{}\" already exists in namespace \"{}\"",
        name, namespace
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_client::memory::{MemoryCluster, Op};

    fn provider(cluster: &MemoryCluster) -> TokenProvider {
        TokenProvider::new(Arc::new(cluster.clone()), PollPolicy::immediate(3))
    }

    #[tokio::test]
    async fn existing_account_token_is_returned() {
        let cluster = MemoryCluster::new().with_service_account("ci", "bot", "abcd1234");
        let token = provider(&cluster)
            .resolve("ci", "bot", ServiceAccountMode::Existing)
            .await
            .unwrap();
        assert_eq!(token, "abcd1234");
        assert!(cluster.ops().is_empty());
    }

    #[tokio::test]
    async fn existing_mode_fails_for_unknown_account() {
        let cluster = MemoryCluster::new();
        let err = provider(&cluster)
            .existing("ci", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Client(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn provision_creates_account_and_waits_for_secret() {
        let cluster = MemoryCluster::new().with_delayed_secrets(2);
        let token = provider(&cluster).provision("ci", "bot").await.unwrap();

        assert_eq!(token, "token-ci-bot");
        assert!(cluster.has_service_account("ci", "bot"));
        assert_eq!(
            cluster.ops(),
            vec![Op::CreateServiceAccount {
                namespace: "ci".into(),
                name: "bot".into()
            }]
        );
    }

    #[tokio::test]
    async fn provision_gives_up_when_secret_never_appears() {
        let cluster = MemoryCluster::new().with_delayed_secrets(10);
        let err = provider(&cluster).provision("ci", "bot").await.unwrap_err();
        assert!(matches!(err, GenerateError::Client(ClientError::Lookup(_))));
    }

    #[tokio::test]
    async fn provision_refuses_duplicate_before_creating() {
        let cluster = MemoryCluster::new().with_service_account("ci", "bot", "t0ken");
        let err = provider(&cluster).provision("ci", "bot").await.unwrap_err();

        assert!(err.is_precondition());
        assert!(err.to_string().contains("already exists"));
        assert!(cluster.ops().is_empty());
    }
}

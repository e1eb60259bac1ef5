use async_trait::async_trait;
use pkg_client::ResourceClient;
use pkg_types::params::{Credential, CredentialType, Params, ServiceAccountMode};
use pkg_types::validate::validate_name;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collect::collect_common;
use crate::{
    BindingReconciler, GenerateError, Generator, GeneratorSettings, TokenProvider, kubeconfig,
};

/// Bearer token credentials for a service account.
pub struct TokenGenerator {
    client: Arc<dyn ResourceClient>,
    provider: TokenProvider,
    reconciler: BindingReconciler,
    output_dir: PathBuf,
}

impl TokenGenerator {
    pub fn new(client: Arc<dyn ResourceClient>, settings: &GeneratorSettings) -> Self {
        Self {
            provider: TokenProvider::new(client.clone(), settings.secret_wait.clone()),
            reconciler: BindingReconciler::new(client.clone()),
            client,
            output_dir: settings.output_dir.clone(),
        }
    }
}

fn account_namespace(params: &Params) -> Result<&str, GenerateError> {
    params
        .service_account_namespace
        .as_deref()
        .filter(|ns| !ns.trim().is_empty())
        .ok_or_else(|| GenerateError::precondition("service account namespace is required"))
}

#[async_trait]
impl Generator for TokenGenerator {
    async fn collect_parameters(&self, params: &mut Params) -> Result<(), GenerateError> {
        if params.request.credential_type != CredentialType::Token {
            return Err(GenerateError::precondition(format!(
                "token generator cannot issue '{}' credentials",
                params.request.credential_type
            )));
        }
        validate_name(params.username()).map_err(|e| {
            GenerateError::precondition(format!("invalid service account name: {}", e))
        })?;
        let namespace = account_namespace(params)?.to_string();
        validate_name(&namespace).map_err(|e| {
            GenerateError::precondition(format!("invalid service account namespace: {}", e))
        })?;

        if params.service_account_mode == ServiceAccountMode::Existing {
            let accounts = self.client.list_service_accounts(&namespace).await?;
            if !accounts.iter().any(|a| a == params.username()) {
                return Err(GenerateError::precondition(format!(
                    "service account \"{}\" not found in namespace \"{}\"",
                    params.username(),
                    namespace
                )));
            }
        }

        collect_common(self.client.as_ref(), params).await
    }

    async fn acquire_credential(&self, params: &mut Params) -> Result<(), GenerateError> {
        let namespace = account_namespace(params)?;
        let token = self
            .provider
            .resolve(namespace, params.username(), params.service_account_mode)
            .await?;
        params.credential = Some(Credential::Token(token));
        Ok(())
    }

    async fn emit_configuration(&self, params: &Params) -> Result<PathBuf, GenerateError> {
        kubeconfig::write_kubeconfig(params, &self.output_dir)
    }

    async fn bind_authorization(&self, params: &Params) -> Result<(), GenerateError> {
        self.reconciler
            .reconcile(&params.subject(), &params.binding_set())
            .await?;
        Ok(())
    }
}

use async_trait::async_trait;
use pkg_client::ResourceClient;
use pkg_types::params::{Credential, CredentialType, Params};
use pkg_types::validate::validate_subdomain;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collect::collect_common;
use crate::{
    BindingReconciler, CredentialIssuer, GenerateError, Generator, GeneratorSettings, kubeconfig,
};

/// Client certificate credentials for a named user.
pub struct CertGenerator {
    client: Arc<dyn ResourceClient>,
    issuer: CredentialIssuer,
    reconciler: BindingReconciler,
    output_dir: PathBuf,
}

impl CertGenerator {
    pub fn new(client: Arc<dyn ResourceClient>, settings: &GeneratorSettings) -> Self {
        Self {
            issuer: CredentialIssuer::new(client.clone(), settings.csr_poll.clone()),
            reconciler: BindingReconciler::new(client.clone()),
            client,
            output_dir: settings.output_dir.clone(),
        }
    }
}

#[async_trait]
impl Generator for CertGenerator {
    async fn collect_parameters(&self, params: &mut Params) -> Result<(), GenerateError> {
        if params.request.credential_type != CredentialType::Certificate {
            return Err(GenerateError::precondition(format!(
                "certificate generator cannot issue '{}' credentials",
                params.request.credential_type
            )));
        }
        validate_subdomain(params.username())
            .map_err(|e| GenerateError::precondition(format!("invalid user name: {}", e)))?;
        collect_common(self.client.as_ref(), params).await
    }

    async fn acquire_credential(&self, params: &mut Params) -> Result<(), GenerateError> {
        let record = self.issuer.issue(params.username()).await?;
        let certificate_pem = record.certificate_pem.ok_or_else(|| {
            GenerateError::precondition(format!(
                "no certificate issued for '{}'",
                record.common_name
            ))
        })?;
        params.credential = Some(Credential::ClientCertificate {
            certificate_pem,
            private_key_pem: record.private_key_pem,
        });
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

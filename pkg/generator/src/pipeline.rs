use async_trait::async_trait;
use pkg_client::{PollPolicy, ResourceClient};
use pkg_constants::cluster::{DEFAULT_SECRET_WAIT_ATTEMPTS, DEFAULT_SECRET_WAIT_INTERVAL_SECS};
use pkg_constants::paths::DEFAULT_OUTPUT_DIR;
use pkg_types::params::{CredentialType, Params};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::{CertGenerator, GenerateError, PipelineError, Stage, TokenGenerator};

/// One credential flavor. The stages run in declaration order; each may
/// read what earlier stages wrote into the params record.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Validate the request and fill in anything left to the cluster.
    async fn collect_parameters(&self, params: &mut Params) -> Result<(), GenerateError>;

    /// Obtain the credential and store it in `params.credential`.
    async fn acquire_credential(&self, params: &mut Params) -> Result<(), GenerateError>;

    /// Write the client configuration; returns where it was written.
    async fn emit_configuration(&self, params: &Params) -> Result<PathBuf, GenerateError>;

    /// Grant the selected roles to the identity.
    async fn bind_authorization(&self, params: &Params) -> Result<(), GenerateError>;
}

/// Knobs shared by both variants.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Bounds the wait for the CSR signer.
    pub csr_poll: PollPolicy,
    /// Bounds the wait for a new service account's token secret.
    pub secret_wait: PollPolicy,
    pub output_dir: PathBuf,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            csr_poll: PollPolicy::default(),
            secret_wait: PollPolicy::new(
                DEFAULT_SECRET_WAIT_ATTEMPTS,
                Duration::from_secs(DEFAULT_SECRET_WAIT_INTERVAL_SECS),
            ),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

/// The variant matching the requested credential type.
pub fn generator_for(
    credential_type: CredentialType,
    client: Arc<dyn ResourceClient>,
    settings: &GeneratorSettings,
) -> Box<dyn Generator> {
    match credential_type {
        CredentialType::Certificate => Box::new(CertGenerator::new(client, settings)),
        CredentialType::Token => Box::new(TokenGenerator::new(client, settings)),
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub params: Params,
    pub config_path: PathBuf,
    /// Set when role binding failed. The configuration was still written.
    pub binding_error: Option<GenerateError>,
}

impl RunOutcome {
    pub fn is_fully_bound(&self) -> bool {
        self.binding_error.is_none()
    }
}

/// Drives a generator through its stages.
pub struct Pipeline {
    generator: Box<dyn Generator>,
}

impl Pipeline {
    pub fn new(generator: Box<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Run all four stages in order.
    ///
    /// A failure in the first three stages ends the run. A binding failure
    /// is logged and returned in the outcome: the credential and its
    /// configuration file remain usable.
    pub async fn run(&self, mut params: Params) -> Result<RunOutcome, PipelineError> {
        let identity = params.username().to_string();
        info!(
            identity = %identity,
            credential = %params.request.credential_type,
            scope = %params.request.scope,
            "Generating kubeconfig"
        );

        self.generator
            .collect_parameters(&mut params)
            .await
            .map_err(at(Stage::CollectParameters))?;
        self.generator
            .acquire_credential(&mut params)
            .await
            .map_err(at(Stage::AcquireCredential))?;
        let config_path = self
            .generator
            .emit_configuration(&params)
            .await
            .map_err(at(Stage::EmitConfiguration))?;

        let binding_error = match self.generator.bind_authorization(&params).await {
            Ok(()) => None,
            Err(e) => {
                error!(identity = %identity, stage = %Stage::BindAuthorization, error = %e, "Role binding failed");
                Some(e)
            }
        };

        info!(
            identity = %identity,
            path = %config_path.display(),
            "Generated kubeconfig"
        );
        Ok(RunOutcome {
            params,
            config_path,
            binding_error,
        })
    }
}

fn at(stage: Stage) -> impl FnOnce(GenerateError) -> PipelineError {
    move |source| PipelineError { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records stage order and fails at a chosen stage.
    struct Scripted {
        calls: Mutex<Vec<Stage>>,
        fail_at: Option<Stage>,
    }

    impl Scripted {
        fn new(fail_at: Option<Stage>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_at,
            }
        }

        fn step(&self, stage: Stage) -> Result<(), GenerateError> {
            self.calls.lock().unwrap().push(stage);
            if self.fail_at == Some(stage) {
                return Err(GenerateError::precondition(format!("{stage} scripted")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Generator for Arc<Scripted> {
        async fn collect_parameters(&self, _params: &mut Params) -> Result<(), GenerateError> {
            self.step(Stage::CollectParameters)
        }

        async fn acquire_credential(&self, _params: &mut Params) -> Result<(), GenerateError> {
            self.step(Stage::AcquireCredential)
        }

        async fn emit_configuration(&self, _params: &Params) -> Result<PathBuf, GenerateError> {
            self.step(Stage::EmitConfiguration)?;
            Ok(PathBuf::from("alice.kubeconfig"))
        }

        async fn bind_authorization(&self, _params: &Params) -> Result<(), GenerateError> {
            self.step(Stage::BindAuthorization)
        }
    }

    async fn run(fail_at: Option<Stage>) -> (Result<RunOutcome, PipelineError>, Vec<Stage>) {
        let scripted = Arc::new(Scripted::new(fail_at));
        let pipeline = Pipeline::new(Box::new(scripted.clone()));
        let result = pipeline
            .run(Params::new("alice", CredentialType::Certificate))
            .await;
        let calls = scripted.calls.lock().unwrap().clone();
        (result, calls)
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let (result, calls) = run(None).await;
        let outcome = result.unwrap();
        assert!(outcome.is_fully_bound());
        assert_eq!(outcome.config_path, PathBuf::from("alice.kubeconfig"));
        assert_eq!(
            calls,
            vec![
                Stage::CollectParameters,
                Stage::AcquireCredential,
                Stage::EmitConfiguration,
                Stage::BindAuthorization,
            ]
        );
    }

    #[tokio::test]
    async fn early_failure_stops_the_run() {
        let (result, calls) = run(Some(Stage::AcquireCredential)).await;
        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::AcquireCredential);
        assert_eq!(calls, vec![Stage::CollectParameters, Stage::AcquireCredential]);
    }

    #[tokio::test]
    async fn binding_failure_keeps_the_configuration() {
        let (result, calls) = run(Some(Stage::BindAuthorization)).await;
        let outcome = result.unwrap();
        assert!(!outcome.is_fully_bound());
        assert_eq!(outcome.config_path, PathBuf::from("alice.kubeconfig"));
        assert_eq!(calls.len(), 4);
    }
}

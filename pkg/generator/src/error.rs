use pkg_client::ClientError;
use pkg_pki::PkiError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The run cannot continue: bad input, duplicate identity, missing CA
    /// data, or an empty certificate from the signer. Never retried.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Pki(#[from] PkiError),

    #[error("ensure namespace '{namespace}' for {identity} failed: {source}")]
    Namespace {
        identity: String,
        namespace: String,
        #[source]
        source: ClientError,
    },

    #[error("binding '{binding}' ({location}) for {identity} failed: {source}")]
    Binding {
        identity: String,
        binding: String,
        location: String,
        #[source]
        source: ClientError,
    },

    #[error("write kubeconfig: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize kubeconfig: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

impl GenerateError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        GenerateError::Precondition(msg.into())
    }

    /// The CSR signer never answered within the poll policy.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerateError::Client(e) if e.is_timeout())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, GenerateError::Precondition(_))
    }
}

/// The four generator stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CollectParameters,
    AcquireCredential,
    EmitConfiguration,
    BindAuthorization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CollectParameters => write!(f, "collect parameters"),
            Stage::AcquireCredential => write!(f, "acquire credential"),
            Stage::EmitConfiguration => write!(f, "emit configuration"),
            Stage::BindAuthorization => write!(f, "bind authorization"),
        }
    }
}

/// A fatal stage failure; the run stopped at `stage`.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: GenerateError,
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_stay_distinguishable_through_layers() {
        let err = GenerateError::from(ClientError::TimedOut {
            name: "alice".into(),
            attempts: 5,
            last_error: None,
        });
        assert!(err.is_timeout());

        let err = PipelineError {
            stage: Stage::AcquireCredential,
            source: err,
        };
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("acquire credential failed"));

        let transport = GenerateError::from(ClientError::Transport("refused".into()));
        assert!(!transport.is_timeout());
    }

    #[test]
    fn binding_errors_name_identity_and_binding() {
        let err = GenerateError::Binding {
            identity: "alice".into(),
            binding: "alice-view".into(),
            location: "namespace prod".into(),
            source: ClientError::Transport("refused".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("alice-view"));
        assert!(msg.contains("namespace prod"));
        assert!(msg.contains("for alice"));
    }
}

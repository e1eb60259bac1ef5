use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The control plane could not be reached or rejected the request.
    #[error("cluster API request failed: {0}")]
    Transport(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// A referenced object exists but does not carry what was asked for.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The signer never produced a certificate within the poll policy.
    /// `last_error` is set when the final fetch itself failed.
    #[error(
        "certificate signing request '{name}' was not signed after {attempts} attempts{}",
        .last_error.as_deref().map(|e| format!(" (last fetch failed: {})", e)).unwrap_or_default()
    )]
    TimedOut {
        name: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("invalid data in {0}")]
    InvalidData(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::TimedOut { .. })
    }

    /// Timed out while the cluster could not even be read, rather than
    /// while waiting on the signer.
    pub fn is_unreachable_timeout(&self) -> bool {
        matches!(self, ClientError::TimedOut { last_error: Some(_), .. })
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, ClientError::Lookup(_))
    }
}

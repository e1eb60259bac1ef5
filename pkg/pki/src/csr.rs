use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PkiError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("certificate request generation failed: {0}")]
    Request(String),
}

/// A client certificate in the making.
///
/// Drafted locally with a fresh keypair; `certificate_pem` stays empty
/// until the cluster signer has issued the certificate.
#[derive(Clone)]
pub struct CsrRecord {
    pub common_name: String,
    pub request_pem: String,
    pub private_key_pem: String,
    pub certificate_pem: Option<String>,
}

impl CsrRecord {
    /// Attach the signed certificate returned by the cluster.
    pub fn signed(mut self, certificate_pem: String) -> Self {
        self.certificate_pem = Some(certificate_pem);
        self
    }

    pub fn is_signed(&self) -> bool {
        self.certificate_pem
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

impl std::fmt::Debug for CsrRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrRecord")
            .field("common_name", &self.common_name)
            .field("signed", &self.is_signed())
            .finish_non_exhaustive()
    }
}

/// Generate an ECDSA P-256 keypair and a certificate request whose
/// subject common name is `common_name`.
pub fn draft_csr(common_name: &str) -> Result<CsrRecord, PkiError> {
    debug!("Drafting certificate request for CN={}", common_name);

    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| PkiError::KeyGeneration(e.to_string()))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let request = params
        .serialize_request(&key_pair)
        .map_err(|e| PkiError::Request(e.to_string()))?;
    let request_pem = request
        .pem()
        .map_err(|e| PkiError::Request(e.to_string()))?;

    Ok(CsrRecord {
        common_name: common_name.to_string(),
        request_pem,
        private_key_pem: key_pair.serialize_pem(),
        certificate_pem: None,
    })
}

//! Local key material for client certificates.
//!
//! Drafts the ECDSA P-256 keypair and PKCS#10 request that the cluster
//! signer turns into a client certificate. Nothing here touches the network.

mod csr;

pub use csr::{CsrRecord, PkiError, draft_csr};

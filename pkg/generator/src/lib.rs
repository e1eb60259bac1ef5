//! Credential generation for cluster identities.
//!
//! A run walks one [`Generator`] variant through four stages: collect
//! parameters, acquire a credential, emit the kubeconfig, bind roles.
//! The variants share the components in this crate:
//!
//! - [`CredentialIssuer`] drives the CSR lifecycle for client certificates.
//! - [`TokenProvider`] resolves or provisions a service account token.
//! - [`BindingReconciler`] recreates role bindings for the identity.
//! - [`kubeconfig`] renders and writes the client configuration.

mod binding;
mod cert_generator;
mod collect;
mod error;
mod issuer;
pub mod kubeconfig;
mod pipeline;
mod token;
mod token_generator;

pub use binding::BindingReconciler;
pub use cert_generator::CertGenerator;
pub use error::{GenerateError, PipelineError, Stage};
pub use issuer::{CredentialIssuer, IssuanceState};
pub use pipeline::{Generator, GeneratorSettings, Pipeline, RunOutcome, generator_for};
pub use token::TokenProvider;
pub use token_generator::TokenGenerator;

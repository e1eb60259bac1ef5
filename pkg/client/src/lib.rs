//! Capability surface over the cluster control plane.
//!
//! Everything the generators need from the cluster goes through the
//! [`ResourceClient`] trait; [`KubeResourceClient`] implements it on top of
//! kube-rs, and `memory::MemoryCluster` (feature `testing`) implements it in
//! memory for tests.

mod client;
mod error;
mod kubernetes;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use client::{CsrStatus, PollPolicy, ResourceClient, poll_with_policy};
pub use error::ClientError;
pub use kubernetes::{CaSource, KubeResourceClient};

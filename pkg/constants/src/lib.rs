//! Centralized constants for gen-kubecfg.
//!
//! All project-wide default values live here.
//! Change a value in one place and it applies everywhere.

pub mod cluster;
pub mod csr;
pub mod kubeconfig;
pub mod paths;

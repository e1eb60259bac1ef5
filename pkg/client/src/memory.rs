//! In-memory cluster for tests.
//!
//! Implements [`ResourceClient`] over plain collections, records every
//! mutating call in order, and simulates an asynchronous CSR signer that
//! issues the certificate on the k-th fetch after approval.

use async_trait::async_trait;
use pkg_types::rbac::{BindingScope, BindingSpec};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{ClientError, CsrStatus, ResourceClient};

/// A mutating call observed by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateNamespace(String),
    CreateServiceAccount { namespace: String, name: String },
    DeleteCsr(String),
    CreateCsr(String),
    ApproveCsr(String),
    DeleteBinding { scope: BindingScope, name: String },
    CreateBinding(BindingSpec),
}

#[derive(Debug, Clone)]
struct CsrEntry {
    request_pem: String,
    approved: bool,
    fetches: u32,
    certificate: Option<String>,
}

#[derive(Debug, Clone)]
struct AccountEntry {
    token: String,
    /// Token reads that fail before the linked secret shows up.
    hidden_reads: u32,
}

#[derive(Default)]
struct Inner {
    roles: Vec<String>,
    namespaces: BTreeSet<String>,
    accounts: BTreeMap<(String, String), AccountEntry>,
    csrs: BTreeMap<String, CsrEntry>,
    bindings: BTreeMap<(BindingScope, String), BindingSpec>,
    ca: Option<String>,
    ops: Vec<Op>,
    /// Fetch (after approval) on which the signer issues; `None` never signs.
    sign_on_fetch: Option<u32>,
    failing_csr_fetches: u32,
    failing_bindings: BTreeSet<String>,
    new_account_hidden_reads: u32,
    unreachable: bool,
}

/// Shared handle; clones see the same cluster.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCluster {
    /// Empty cluster whose signer issues on the first fetch after approval.
    pub fn new() -> Self {
        let inner = Inner {
            sign_on_fetch: Some(1),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Builders ---

    pub fn with_roles(self, roles: &[&str]) -> Self {
        self.lock().roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_namespace(self, name: &str) -> Self {
        self.lock().namespaces.insert(name.to_string());
        self
    }

    pub fn with_service_account(self, namespace: &str, name: &str, token: &str) -> Self {
        {
            let mut inner = self.lock();
            inner.namespaces.insert(namespace.to_string());
            inner.accounts.insert(
                (namespace.to_string(), name.to_string()),
                AccountEntry {
                    token: token.to_string(),
                    hidden_reads: 0,
                },
            );
        }
        self
    }

    pub fn with_cluster_ca(self, pem: &str) -> Self {
        self.lock().ca = Some(pem.to_string());
        self
    }

    /// The signer issues on the `k`-th fetch after approval.
    pub fn with_signer_on_fetch(self, k: u32) -> Self {
        self.lock().sign_on_fetch = Some(k);
        self
    }

    pub fn without_signer(self) -> Self {
        self.lock().sign_on_fetch = None;
        self
    }

    /// The next `n` request fetches fail with a transport error.
    pub fn with_failing_csr_fetches(self, n: u32) -> Self {
        self.lock().failing_csr_fetches = n;
        self
    }

    /// Creating the binding called `name` fails with a transport error.
    pub fn with_failing_binding(self, name: &str) -> Self {
        self.lock().failing_bindings.insert(name.to_string());
        self
    }

    /// Service accounts created from now on expose their token only after
    /// `reads` failed token reads.
    pub fn with_delayed_secrets(self, reads: u32) -> Self {
        self.lock().new_account_hidden_reads = reads;
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    // --- Inspection ---

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.lock().namespaces.iter().cloned().collect()
    }

    pub fn has_service_account(&self, namespace: &str, name: &str) -> bool {
        self.lock()
            .accounts
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn cluster_bindings(&self) -> Vec<BindingSpec> {
        self.bindings_where(|scope| *scope == BindingScope::Cluster)
    }

    pub fn role_bindings(&self, namespace: &str) -> Vec<BindingSpec> {
        self.bindings_where(|scope| scope.namespace() == Some(namespace))
    }

    pub fn all_bindings(&self) -> Vec<BindingSpec> {
        self.bindings_where(|_| true)
    }

    fn bindings_where(&self, keep: impl Fn(&BindingScope) -> bool) -> Vec<BindingSpec> {
        self.lock()
            .bindings
            .iter()
            .filter(|((scope, _), _)| keep(scope))
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn csr_request(&self, name: &str) -> Option<String> {
        self.lock().csrs.get(name).map(|c| c.request_pem.clone())
    }

    pub fn csr_fetches(&self, name: &str) -> u32 {
        self.lock().csrs.get(name).map_or(0, |c| c.fetches)
    }

    /// Seed a request as if left over from an earlier run.
    pub fn seed_csr(&self, name: &str, request_pem: &str, certificate: Option<&str>) {
        self.lock().csrs.insert(
            name.to_string(),
            CsrEntry {
                request_pem: request_pem.to_string(),
                approved: certificate.is_some(),
                fetches: 0,
                certificate: certificate.map(str::to_string),
            },
        );
    }

    /// Seed a binding as if left over from an earlier run.
    pub fn seed_binding(&self, binding: BindingSpec) {
        self.lock()
            .bindings
            .insert((binding.scope.clone(), binding.name.clone()), binding);
    }
}

fn fake_certificate(name: &str) -> String {
    format!(
        "-----BEGIN CERTIFICATE-----\nsigned-for-{}\n-----END CERTIFICATE-----\n",
        name
    )
}

impl Inner {
    fn check_reachable(&self) -> Result<(), ClientError> {
        if self.unreachable {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for MemoryCluster {
    async fn list_role_names(&self) -> Result<Vec<String>, ClientError> {
        let inner = self.lock();
        inner.check_reachable()?;
        Ok(inner.roles.clone())
    }

    async fn list_service_accounts(&self, namespace: &str) -> Result<Vec<String>, ClientError> {
        let inner = self.lock();
        inner.check_reachable()?;
        Ok(inner
            .accounts
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        let key = (namespace.to_string(), name.to_string());
        if inner.accounts.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                kind: "ServiceAccount",
                name: name.to_string(),
            });
        }
        let hidden_reads = inner.new_account_hidden_reads;
        inner.accounts.insert(
            key,
            AccountEntry {
                token: format!("token-{}-{}", namespace, name),
                hidden_reads,
            },
        );
        inner.ops.push(Op::CreateServiceAccount {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn service_account_token(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<String, ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        let account = inner
            .accounts
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClientError::NotFound {
                kind: "ServiceAccount",
                name: name.to_string(),
            })?;
        if account.hidden_reads > 0 {
            account.hidden_reads -= 1;
            return Err(ClientError::Lookup(format!(
                "service account {}/{} has no linked secret",
                namespace, name
            )));
        }
        Ok(account.token.clone())
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        if inner.namespaces.insert(name.to_string()) {
            inner.ops.push(Op::CreateNamespace(name.to_string()));
        }
        Ok(())
    }

    async fn submit_csr(&self, name: &str, request_pem: &str) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        if inner.csrs.remove(name).is_some() {
            inner.ops.push(Op::DeleteCsr(name.to_string()));
        }
        inner.csrs.insert(
            name.to_string(),
            CsrEntry {
                request_pem: request_pem.to_string(),
                approved: false,
                fetches: 0,
                certificate: None,
            },
        );
        inner.ops.push(Op::CreateCsr(name.to_string()));
        Ok(())
    }

    async fn approve_csr(&self, name: &str) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        let csr = inner.csrs.get_mut(name).ok_or_else(|| ClientError::NotFound {
            kind: "CertificateSigningRequest",
            name: name.to_string(),
        })?;
        csr.approved = true;
        inner.ops.push(Op::ApproveCsr(name.to_string()));
        Ok(())
    }

    async fn get_csr(&self, name: &str) -> Result<CsrStatus, ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        if inner.failing_csr_fetches > 0 {
            inner.failing_csr_fetches -= 1;
            return Err(ClientError::Transport("request timed out".to_string()));
        }
        let sign_on_fetch = inner.sign_on_fetch;
        let csr = inner.csrs.get_mut(name).ok_or_else(|| ClientError::NotFound {
            kind: "CertificateSigningRequest",
            name: name.to_string(),
        })?;
        if csr.approved && csr.certificate.is_none() {
            csr.fetches += 1;
            if sign_on_fetch.is_some_and(|k| csr.fetches >= k) {
                csr.certificate = Some(fake_certificate(name));
            }
        }
        Ok(CsrStatus {
            certificate: csr.certificate.clone(),
            approved: csr.approved,
            denied: false,
        })
    }

    async fn upsert_binding(&self, binding: &BindingSpec) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        let key = (binding.scope.clone(), binding.name.clone());
        if inner.bindings.remove(&key).is_some() {
            inner.ops.push(Op::DeleteBinding {
                scope: binding.scope.clone(),
                name: binding.name.clone(),
            });
        }
        if inner.failing_bindings.contains(&binding.name) {
            return Err(ClientError::Transport(format!(
                "create binding '{}' rejected",
                binding.name
            )));
        }
        inner.bindings.insert(key, binding.clone());
        inner.ops.push(Op::CreateBinding(binding.clone()));
        Ok(())
    }

    async fn cluster_ca(&self) -> Result<String, ClientError> {
        let inner = self.lock();
        inner.check_reachable()?;
        inner.ca.clone().ok_or_else(|| ClientError::NotFound {
            kind: "ConfigMap key",
            name: "kube-system/extension-apiserver-authentication:client-ca-file".to_string(),
        })
    }
}

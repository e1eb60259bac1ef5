use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::certificates::v1::{CertificateSigningRequest, CertificateSigningRequestSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, RoleBinding, RoleRef, Subject as RbacSubject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use pkg_constants::cluster::{
    CA_CONFIG_MAP, CA_CONFIG_MAP_KEY, CA_CONFIG_MAP_NAMESPACE, LABEL_MANAGED_BY, MANAGED_BY,
    RBAC_API_GROUP, ROLE_REF_KIND, SERVICE_ACCOUNT_TOKEN_KEY,
};
use pkg_constants::csr::{
    APPROVAL_MESSAGE, APPROVAL_REASON, CLIENT_USAGES, CONDITION_APPROVED, CONDITION_DENIED,
    DEFAULT_SIGNER_NAME,
};
use pkg_types::rbac::{BindingScope, BindingSpec, Subject, SubjectKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::{ClientError, CsrStatus, ResourceClient};

/// Where the cluster CA bundle is published.
#[derive(Debug, Clone)]
pub struct CaSource {
    pub namespace: String,
    pub config_map: String,
    pub key: String,
}

impl Default for CaSource {
    fn default() -> Self {
        Self {
            namespace: CA_CONFIG_MAP_NAMESPACE.to_string(),
            config_map: CA_CONFIG_MAP.to_string(),
            key: CA_CONFIG_MAP_KEY.to_string(),
        }
    }
}

/// [`ResourceClient`] backed by a kube-rs client.
///
/// Holds no state besides the connection; safe to reuse across runs.
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    signer_name: String,
    ca_source: CaSource,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            signer_name: DEFAULT_SIGNER_NAME.to_string(),
            ca_source: CaSource::default(),
        }
    }

    pub fn with_signer_name(mut self, signer_name: impl Into<String>) -> Self {
        self.signer_name = signer_name.into();
        self
    }

    pub fn with_ca_source(mut self, ca_source: CaSource) -> Self {
        self.ca_source = ca_source;
        self
    }

    fn csr_api(&self) -> Api<CertificateSigningRequest> {
        Api::all(self.client.clone())
    }
}

/// Map a kube error onto the client taxonomy, keeping 404/409 distinct.
fn api_error(kind: &'static str, name: &str, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 => ClientError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        other => ClientError::Transport(format!("{} '{}': {}", kind, name, other)),
    }
}

/// `Some` for a found object, `None` for a 404.
fn found<T>(
    kind: &'static str,
    name: &str,
    result: Result<T, kube::Error>,
) -> Result<Option<T>, ClientError> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(e) => match api_error(kind, name, e) {
            ClientError::NotFound { .. } => Ok(None),
            other => Err(other),
        },
    }
}

/// `true` when the create went through, `false` when a concurrent writer
/// created the object first (409).
fn created_or_exists<T>(
    kind: &'static str,
    name: &str,
    result: Result<T, kube::Error>,
) -> Result<bool, ClientError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) => match api_error(kind, name, e) {
            ClientError::AlreadyExists { .. } => Ok(false),
            other => Err(other),
        },
    }
}

fn managed_metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(BTreeMap::from([(
            LABEL_MANAGED_BY.to_string(),
            MANAGED_BY.to_string(),
        )])),
        ..Default::default()
    }
}

/// Delete `name` if present. A missing object is not an error.
async fn delete_if_exists<K>(api: &Api<K>, kind: &'static str, name: &str) -> Result<bool, ClientError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let deleted = found(kind, name, api.delete(name, &DeleteParams::default()).await)?.is_some();
    if deleted {
        debug!("Deleted {} {}", kind, name);
    }
    Ok(deleted)
}

/// Delete-then-create so no field of a previous object survives.
async fn recreate<K>(api: &Api<K>, kind: &'static str, name: &str, obj: &K) -> Result<(), ClientError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    delete_if_exists(api, kind, name).await?;
    api.create(&PostParams::default(), obj)
        .await
        .map_err(|e| api_error(kind, name, e))?;
    Ok(())
}

fn rbac_subject(subject: &Subject) -> RbacSubject {
    match subject.kind {
        SubjectKind::User => RbacSubject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: subject.kind.to_string(),
            name: subject.name.clone(),
            namespace: None,
        },
        SubjectKind::ServiceAccount => RbacSubject {
            api_group: None,
            kind: subject.kind.to_string(),
            name: subject.name.clone(),
            namespace: subject.namespace.clone(),
        },
    }
}

fn role_ref(role: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: ROLE_REF_KIND.to_string(),
        name: role.to_string(),
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn list_role_names(&self) -> Result<Vec<String>, ClientError> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        let roles = api
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error("ClusterRole", "*", e))?;
        Ok(roles.items.into_iter().filter_map(|r| r.metadata.name).collect())
    }

    async fn list_service_accounts(&self, namespace: &str) -> Result<Vec<String>, ClientError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let accounts = api
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error("ServiceAccount", namespace, e))?;
        Ok(accounts
            .items
            .into_iter()
            .filter_map(|sa| sa.metadata.name)
            .collect())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let sa = ServiceAccount {
            metadata: managed_metadata(name, Some(namespace)),
            ..Default::default()
        };
        api.create(&PostParams::default(), &sa)
            .await
            .map_err(|e| api_error("ServiceAccount", name, e))?;
        info!("Created service account {}/{}", namespace, name);
        Ok(())
    }

    async fn service_account_token(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<String, ClientError> {
        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let sa = accounts
            .get(name)
            .await
            .map_err(|e| api_error("ServiceAccount", name, e))?;

        let secret_name = sa
            .secrets
            .as_deref()
            .and_then(|refs| refs.first())
            .and_then(|r| r.name.clone())
            .ok_or_else(|| {
                ClientError::Lookup(format!(
                    "service account {}/{} has no linked secret",
                    namespace, name
                ))
            })?;

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get(&secret_name)
            .await
            .map_err(|e| api_error("Secret", &secret_name, e))?;

        let ByteString(raw) = secret
            .data
            .and_then(|mut data| data.remove(SERVICE_ACCOUNT_TOKEN_KEY))
            .ok_or_else(|| {
                ClientError::Lookup(format!(
                    "secret {}/{} has no '{}' field",
                    namespace, secret_name, SERVICE_ACCOUNT_TOKEN_KEY
                ))
            })?;
        String::from_utf8(raw)
            .map_err(|_| ClientError::InvalidData(format!("secret {}/{}", namespace, secret_name)))
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), ClientError> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        if found("Namespace", name, api.get(name).await)?.is_some() {
            debug!(namespace = %name, "Namespace already exists");
            return Ok(());
        }

        let ns = Namespace {
            metadata: managed_metadata(name, None),
            ..Default::default()
        };
        if created_or_exists("Namespace", name, api.create(&PostParams::default(), &ns).await)? {
            info!(namespace = %name, "Created namespace");
        } else {
            debug!(namespace = %name, "Namespace created concurrently");
        }
        Ok(())
    }

    async fn submit_csr(&self, name: &str, request_pem: &str) -> Result<(), ClientError> {
        let csr = CertificateSigningRequest {
            metadata: managed_metadata(name, None),
            spec: CertificateSigningRequestSpec {
                request: ByteString(request_pem.as_bytes().to_vec()),
                signer_name: self.signer_name.clone(),
                usages: Some(CLIENT_USAGES.iter().map(|u| u.to_string()).collect()),
                ..Default::default()
            },
            status: None,
        };
        recreate(&self.csr_api(), "CertificateSigningRequest", name, &csr).await
    }

    async fn approve_csr(&self, name: &str) -> Result<(), ClientError> {
        let patch = serde_json::json!({
            "status": {
                "conditions": [{
                    "type": CONDITION_APPROVED,
                    "status": "True",
                    "reason": APPROVAL_REASON,
                    "message": APPROVAL_MESSAGE,
                }]
            }
        });
        self.csr_api()
            .patch_approval(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| api_error("CertificateSigningRequest", name, e))?;
        Ok(())
    }

    async fn get_csr(&self, name: &str) -> Result<CsrStatus, ClientError> {
        let csr = self
            .csr_api()
            .get(name)
            .await
            .map_err(|e| api_error("CertificateSigningRequest", name, e))?;

        let Some(status) = csr.status else {
            return Ok(CsrStatus::default());
        };
        let conditions = status.conditions.unwrap_or_default();
        let certificate = match status.certificate {
            Some(ByteString(raw)) => Some(String::from_utf8(raw).map_err(|_| {
                ClientError::InvalidData(format!("certificate of request '{}'", name))
            })?),
            None => None,
        };

        Ok(CsrStatus {
            certificate,
            approved: conditions.iter().any(|c| c.type_ == CONDITION_APPROVED),
            denied: conditions.iter().any(|c| c.type_ == CONDITION_DENIED),
        })
    }

    async fn upsert_binding(&self, binding: &BindingSpec) -> Result<(), ClientError> {
        let subjects = Some(vec![rbac_subject(&binding.subject)]);
        match &binding.scope {
            BindingScope::Cluster => {
                let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
                let crb = ClusterRoleBinding {
                    metadata: managed_metadata(&binding.name, None),
                    role_ref: role_ref(&binding.role_ref),
                    subjects,
                };
                recreate(&api, "ClusterRoleBinding", &binding.name, &crb).await
            }
            BindingScope::Namespace(ns) => {
                let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), ns);
                let rb = RoleBinding {
                    metadata: managed_metadata(&binding.name, Some(ns)),
                    role_ref: role_ref(&binding.role_ref),
                    subjects,
                };
                recreate(&api, "RoleBinding", &binding.name, &rb).await
            }
        }
    }

    async fn cluster_ca(&self) -> Result<String, ClientError> {
        let source = &self.ca_source;
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &source.namespace);
        let cm = api
            .get(&source.config_map)
            .await
            .map_err(|e| api_error("ConfigMap", &source.config_map, e))?;

        cm.data
            .and_then(|mut data| data.remove(&source.key))
            .filter(|ca| !ca.trim().is_empty())
            .ok_or_else(|| ClientError::NotFound {
                kind: "ConfigMap key",
                name: format!("{}/{}:{}", source.namespace, source.config_map, source.key),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_failure(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {}", code),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn api_errors_keep_not_found_and_conflict_distinct() {
        let err = api_error("Namespace", "prod", api_failure(404));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("'prod'"));

        assert!(api_error("ClusterRoleBinding", "alice-view", api_failure(409)).is_already_exists());

        let err = api_error("Namespace", "prod", api_failure(500));
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(!err.is_not_found() && !err.is_already_exists());

        let err = api_error("Namespace", "prod", api_failure(403));
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn lookups_treat_404_as_absent() {
        assert_eq!(found("Namespace", "prod", Ok::<_, kube::Error>(7)).unwrap(), Some(7));
        assert_eq!(found::<u8>("Namespace", "prod", Err(api_failure(404))).unwrap(), None);
        assert!(found::<u8>("Namespace", "prod", Err(api_failure(500))).is_err());
    }

    #[test]
    fn losing_a_create_race_is_not_an_error() {
        assert!(created_or_exists("Namespace", "prod", Ok::<_, kube::Error>(())).unwrap());
        assert!(!created_or_exists::<()>("Namespace", "prod", Err(api_failure(409))).unwrap());

        let err = created_or_exists::<()>("Namespace", "prod", Err(api_failure(500))).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        let err = created_or_exists::<()>("Namespace", "prod", Err(api_failure(404))).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn user_subjects_carry_the_rbac_group() {
        let s = rbac_subject(&Subject::user("alice"));
        assert_eq!(s.kind, "User");
        assert_eq!(s.api_group.as_deref(), Some(RBAC_API_GROUP));
        assert!(s.namespace.is_none());
    }

    #[test]
    fn service_account_subjects_carry_their_namespace() {
        let s = rbac_subject(&Subject::service_account("ci-bot", "ci"));
        assert_eq!(s.kind, "ServiceAccount");
        assert_eq!(s.namespace.as_deref(), Some("ci"));
        assert!(s.api_group.is_none());
    }

    #[test]
    fn bindings_reference_cluster_roles() {
        let r = role_ref("view");
        assert_eq!(r.kind, "ClusterRole");
        assert_eq!(r.name, "view");
    }

    #[test]
    fn managed_objects_are_labelled() {
        let meta = managed_metadata("alice-view", Some("dev"));
        assert_eq!(meta.namespace.as_deref(), Some("dev"));
        assert_eq!(
            meta.labels.unwrap().get(LABEL_MANAGED_BY).map(String::as_str),
            Some(MANAGED_BY)
        );
    }
}

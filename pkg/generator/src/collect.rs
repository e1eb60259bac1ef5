use pkg_client::ResourceClient;
use pkg_types::params::{Params, Scope};
use pkg_types::validate::validate_name;
use tracing::{debug, warn};

use crate::GenerateError;

/// Checks shared by both variants: scope, roles, cluster connection data.
/// Fills in the CA bundle from the cluster when the caller left it empty.
pub(crate) async fn collect_common(
    client: &dyn ResourceClient,
    params: &mut Params,
) -> Result<(), GenerateError> {
    if let Scope::Namespaces(list) = &params.request.scope {
        if list.is_empty() {
            return Err(GenerateError::precondition(
                "namespace scope requires at least one namespace",
            ));
        }
        for ns in list {
            validate_name(ns).map_err(|e| {
                GenerateError::precondition(format!("invalid namespace: {}", e))
            })?;
        }
    }

    if params.cluster_roles.is_empty() {
        warn!(identity = %params.username(), "No cluster roles selected; no bindings will be written");
    } else {
        let available = client.list_role_names().await?;
        let unknown: Vec<&str> = params
            .cluster_roles
            .iter()
            .filter(|r| !available.contains(r))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(GenerateError::precondition(format!(
                "unknown cluster role(s): {}",
                unknown.join(", ")
            )));
        }
    }

    if params.cluster.endpoint.trim().is_empty() {
        return Err(GenerateError::precondition("missing cluster endpoint"));
    }
    if params.cluster.ca_data.trim().is_empty() {
        let ca = client.cluster_ca().await.map_err(|e| {
            if e.is_not_found() {
                GenerateError::precondition(format!("missing required CA data: {}", e))
            } else {
                e.into()
            }
        })?;
        if ca.trim().is_empty() {
            return Err(GenerateError::precondition("missing required CA data"));
        }
        debug!(bytes = ca.len(), "Fetched cluster CA bundle");
        params.cluster.ca_data = ca;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_client::memory::MemoryCluster;
    use pkg_types::params::CredentialType;

    fn params() -> Params {
        let mut p = Params::new("alice", CredentialType::Certificate);
        p.cluster.name = "prod".into();
        p.cluster.endpoint = "https://10.0.0.1:6443".into();
        p.cluster_roles = vec!["view".into()];
        p
    }

    #[tokio::test]
    async fn fills_ca_from_cluster() {
        let cluster = MemoryCluster::new().with_roles(&["view"]).with_cluster_ca("CA");
        let mut p = params();
        collect_common(&cluster, &mut p).await.unwrap();
        assert_eq!(p.cluster.ca_data, "CA");
    }

    #[tokio::test]
    async fn keeps_caller_supplied_ca() {
        let cluster = MemoryCluster::new().with_roles(&["view"]);
        let mut p = params();
        p.cluster.ca_data = "MINE".into();
        collect_common(&cluster, &mut p).await.unwrap();
        assert_eq!(p.cluster.ca_data, "MINE");
    }

    #[tokio::test]
    async fn missing_ca_is_a_precondition_failure() {
        let cluster = MemoryCluster::new().with_roles(&["view"]);
        let err = collect_common(&cluster, &mut params()).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("missing required CA data"));
    }

    #[tokio::test]
    async fn rejects_unknown_roles() {
        let cluster = MemoryCluster::new().with_roles(&["view"]).with_cluster_ca("CA");
        let mut p = params();
        p.cluster_roles.push("root".into());
        let err = collect_common(&cluster, &mut p).await.unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[tokio::test]
    async fn rejects_empty_or_invalid_namespace_scope() {
        let cluster = MemoryCluster::new().with_roles(&["view"]).with_cluster_ca("CA");

        let mut p = params();
        p.request.scope = Scope::Namespaces(vec![]);
        assert!(collect_common(&cluster, &mut p).await.unwrap_err().is_precondition());

        p.request.scope = Scope::Namespaces(vec!["Bad_NS".into()]);
        assert!(collect_common(&cluster, &mut p).await.unwrap_err().is_precondition());
    }
}

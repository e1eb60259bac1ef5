use pkg_client::ResourceClient;
use pkg_types::rbac::{BindingScope, BindingSet, BindingSpec, Subject};
use std::sync::Arc;
use tracing::info;

use crate::GenerateError;

/// Grants roles to an identity by recreating its bindings.
///
/// Every binding is deleted (when present) and created again, so running
/// twice with the same input leaves the same set of bindings behind.
pub struct BindingReconciler {
    client: Arc<dyn ResourceClient>,
}

impl BindingReconciler {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Write every binding in `set` for `subject`; returns how many were written.
    ///
    /// Bindings are written in [`BindingSet::plan`] order. With no namespaces
    /// the roles are bound cluster-wide; otherwise each namespace is created
    /// if missing right before its first binding. The first failure aborts;
    /// bindings already written stay in place.
    pub async fn reconcile(
        &self,
        subject: &Subject,
        set: &BindingSet,
    ) -> Result<usize, GenerateError> {
        let plan = set.plan(subject);
        let mut current_namespace: Option<&str> = None;

        for spec in &plan {
            let namespace = spec.scope.namespace();
            if let Some(ns) = namespace.filter(|ns| current_namespace != Some(*ns)) {
                self.client
                    .ensure_namespace(ns)
                    .await
                    .map_err(|source| GenerateError::Namespace {
                        identity: subject.name.clone(),
                        namespace: ns.to_string(),
                        source,
                    })?;
            }
            current_namespace = namespace;
            self.write(subject, spec).await?;
        }
        Ok(plan.len())
    }

    async fn write(&self, subject: &Subject, spec: &BindingSpec) -> Result<(), GenerateError> {
        self.client
            .upsert_binding(spec)
            .await
            .map_err(|source| GenerateError::Binding {
                identity: subject.name.clone(),
                binding: spec.name.clone(),
                location: location(&spec.scope),
                source,
            })?;
        match spec.scope.namespace() {
            Some(ns) => info!(binding = %spec.name, namespace = %ns, subject = %subject, "Created role binding"),
            None => info!(binding = %spec.name, subject = %subject, "Created cluster role binding"),
        }
        Ok(())
    }
}

fn location(scope: &BindingScope) -> String {
    match scope {
        BindingScope::Cluster => "cluster".to_string(),
        BindingScope::Namespace(ns) => format!("namespace {}", ns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_client::memory::{MemoryCluster, Op};

    fn set(roles: &[&str], namespaces: &[&str]) -> BindingSet {
        BindingSet::new(
            roles.iter().map(|s| s.to_string()).collect(),
            namespaces.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn cluster_scope_binds_each_role_once() {
        let cluster = MemoryCluster::new();
        let reconciler = BindingReconciler::new(Arc::new(cluster.clone()));

        let n = reconciler
            .reconcile(&Subject::user("alice"), &set(&["view", "edit"], &[]))
            .await
            .unwrap();

        assert_eq!(n, 2);
        let names: Vec<_> = cluster.cluster_bindings().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["alice-edit", "alice-view"]);
        assert!(cluster.namespaces().is_empty());
    }

    #[tokio::test]
    async fn namespace_scope_creates_missing_namespaces_first() {
        let cluster = MemoryCluster::new().with_namespace("prod");
        let reconciler = BindingReconciler::new(Arc::new(cluster.clone()));
        let subject = Subject::service_account("bot", "ci");

        let n = reconciler
            .reconcile(&subject, &set(&["edit"], &["prod", "staging"]))
            .await
            .unwrap();

        assert_eq!(n, 2);
        assert!(cluster.cluster_bindings().is_empty());
        assert_eq!(cluster.role_bindings("prod").len(), 1);
        assert_eq!(cluster.role_bindings("staging")[0].subject, subject);

        let ops = cluster.ops();
        let created_ns = ops
            .iter()
            .position(|op| *op == Op::CreateNamespace("staging".into()))
            .unwrap();
        let staging_binding = ops
            .iter()
            .position(|op| matches!(op, Op::CreateBinding(b) if b.scope.namespace() == Some("staging")))
            .unwrap();
        assert!(created_ns < staging_binding);
    }

    #[tokio::test]
    async fn writes_follow_the_planned_order() {
        let cluster = MemoryCluster::new();
        let reconciler = BindingReconciler::new(Arc::new(cluster.clone()));
        let subject = Subject::user("alice");
        let roles = set(&["view", "edit"], &["b", "a"]);

        reconciler.reconcile(&subject, &roles).await.unwrap();

        let mut expected = Vec::new();
        for spec in roles.plan(&subject) {
            let ns = spec.scope.namespace().unwrap().to_string();
            if !expected.contains(&Op::CreateNamespace(ns.clone())) {
                expected.push(Op::CreateNamespace(ns));
            }
            expected.push(Op::CreateBinding(spec));
        }
        assert_eq!(cluster.ops(), expected);
        assert_eq!(
            expected[0],
            Op::CreateNamespace("b".into()),
            "namespaces keep caller order"
        );
    }

    #[tokio::test]
    async fn rerun_leaves_identical_bindings() {
        let cluster = MemoryCluster::new();
        let reconciler = BindingReconciler::new(Arc::new(cluster.clone()));
        let roles = set(&["view"], &["a", "b"]);

        reconciler.reconcile(&Subject::user("alice"), &roles).await.unwrap();
        let first = cluster.all_bindings();
        reconciler.reconcile(&Subject::user("alice"), &roles).await.unwrap();

        assert_eq!(cluster.all_bindings(), first);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn first_failure_aborts_with_context() {
        let cluster = MemoryCluster::new().with_failing_binding("alice-edit");
        let reconciler = BindingReconciler::new(Arc::new(cluster.clone()));

        let err = reconciler
            .reconcile(&Subject::user("alice"), &set(&["view", "edit", "admin"], &["prod"]))
            .await
            .unwrap_err();

        match err {
            GenerateError::Binding {
                identity,
                binding,
                location,
                ..
            } => {
                assert_eq!(identity, "alice");
                assert_eq!(binding, "alice-edit");
                assert_eq!(location, "namespace prod");
            }
            other => panic!("unexpected error: {other}"),
        }
        let names: Vec<_> = cluster.role_bindings("prod").into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["alice-view"]);
    }

    #[tokio::test]
    async fn no_roles_writes_nothing() {
        let cluster = MemoryCluster::new();
        let reconciler = BindingReconciler::new(Arc::new(cluster.clone()));
        let n = reconciler
            .reconcile(&Subject::user("alice"), &BindingSet::default())
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(cluster.ops().is_empty());
    }
}

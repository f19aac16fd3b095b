use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::helpers::set_path;
use crate::models::k8s::{Gvr, ObjectMeta};

use super::{ResourceStore, create_if_absent, delete_if_present};

/// One object a propagation rule delivers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceSelector {
    pub fn new(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }
}

/// Writes propagation rules on the hub so its policy engine delivers
/// objects to chosen member clusters.
pub struct Propagator {
    store: Arc<dyn ResourceStore>,
    hub: String,
}

fn policy_body(
    kind: &str,
    meta: ObjectMeta,
    selectors: &[ResourceSelector],
    clusters: &[String],
) -> Value {
    json!({
        "apiVersion": Gvr::propagation_policies().api_version(),
        "kind": kind,
        "metadata": meta,
        "spec": {
            "resourceSelectors": selectors,
            "placement": {
                "clusterAffinity": {"clusterNames": clusters}
            }
        }
    })
}

impl Propagator {
    pub fn new(store: Arc<dyn ResourceStore>, hub: impl Into<String>) -> Self {
        Self {
            store,
            hub: hub.into(),
        }
    }

    /// Returns false when a rule with this name already existed.
    pub async fn create_namespaced(
        &self,
        name: &str,
        namespace: &str,
        selectors: &[ResourceSelector],
        clusters: &[String],
    ) -> Result<bool> {
        let body = policy_body(
            "PropagationPolicy",
            ObjectMeta::managed(name, namespace),
            selectors,
            clusters,
        );
        let created = create_if_absent(
            self.store.as_ref(),
            &self.hub,
            &Gvr::propagation_policies(),
            Some(namespace),
            &body,
        )
        .await?;
        if created {
            info!(policy = %name, ?clusters, "created propagation policy");
        }
        Ok(created)
    }

    pub async fn create_cluster_scoped(
        &self,
        name: &str,
        selectors: &[ResourceSelector],
        clusters: &[String],
    ) -> Result<bool> {
        let body = policy_body(
            "ClusterPropagationPolicy",
            ObjectMeta::managed(name, ""),
            selectors,
            clusters,
        );
        let created = create_if_absent(
            self.store.as_ref(),
            &self.hub,
            &Gvr::cluster_propagation_policies(),
            None,
            &body,
        )
        .await?;
        if created {
            info!(policy = %name, ?clusters, "created cluster propagation policy");
        }
        Ok(created)
    }

    /// Create the namespaced rule, or replace the target cluster list of an existing one.
    pub async fn set_namespaced_targets(
        &self,
        name: &str,
        namespace: &str,
        selectors: &[ResourceSelector],
        clusters: &[String],
    ) -> Result<()> {
        if self
            .create_namespaced(name, namespace, selectors, clusters)
            .await?
        {
            return Ok(());
        }

        let gvr = Gvr::propagation_policies();
        let mut existing = self.store.get(&self.hub, &gvr, Some(namespace), name).await?;
        set_path(
            &mut existing,
            &["spec", "resourceSelectors"],
            serde_json::to_value(selectors)?,
        );
        set_path(
            &mut existing,
            &["spec", "placement"],
            json!({"clusterAffinity": {"clusterNames": clusters}}),
        );
        self.store
            .update(&self.hub, &gvr, Some(namespace), &existing)
            .await?;
        info!(policy = %name, ?clusters, "updated propagation policy targets");
        Ok(())
    }

    pub async fn delete_namespaced(&self, name: &str, namespace: &str) -> Result<bool> {
        delete_if_present(
            self.store.as_ref(),
            &self.hub,
            &Gvr::propagation_policies(),
            Some(namespace),
            name,
        )
        .await
    }

    pub async fn delete_cluster_scoped(&self, name: &str) -> Result<bool> {
        delete_if_present(
            self.store.as_ref(),
            &self.hub,
            &Gvr::cluster_propagation_policies(),
            None,
            name,
        )
        .await
    }
}

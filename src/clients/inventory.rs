use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::helpers::{int_at, lookup, name_of, string_or_default};
use crate::models::k8s::{Condition, Gvr, ListOptions};

use super::ResourceStore;

#[derive(Debug, Clone, PartialEq)]
pub struct MemberCluster {
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterDetail {
    pub name: String,
    pub ready: bool,
    pub conditions: Vec<Condition>,
    pub kubernetes_version: String,
    pub node_total: i64,
    pub node_ready: i64,
}

/// Fleet membership as registered on the hub.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<MemberCluster>>;

    async fn get_cluster(&self, name: &str) -> Result<ClusterDetail>;
}

/// Reads `Cluster` objects from the hub's cluster registry.
pub struct HubInventory {
    store: Arc<dyn ResourceStore>,
    hub: String,
}

impl HubInventory {
    pub fn new(store: Arc<dyn ResourceStore>, hub: impl Into<String>) -> Self {
        Self {
            store,
            hub: hub.into(),
        }
    }
}

pub(crate) fn cluster_detail(obj: &Value) -> ClusterDetail {
    let conditions: Vec<Condition> = lookup(obj, &["status", "conditions"])
        .and_then(|c| serde_json::from_value(c.clone()).ok())
        .unwrap_or_default();
    let ready = conditions
        .iter()
        .any(|c| c.condition_type == "Ready" && c.is_true());

    ClusterDetail {
        name: name_of(obj),
        ready,
        conditions,
        kubernetes_version: string_or_default(obj, &["status", "kubernetesVersion"]),
        node_total: int_at(obj, &["status", "nodeSummary", "totalNum"]).unwrap_or(0),
        node_ready: int_at(obj, &["status", "nodeSummary", "readyNum"]).unwrap_or(0),
    }
}

#[async_trait]
impl ClusterInventory for HubInventory {
    async fn list_clusters(&self) -> Result<Vec<MemberCluster>> {
        let items = self
            .store
            .list(&self.hub, &Gvr::member_clusters(), None, &ListOptions::default())
            .await?;
        Ok(items
            .iter()
            .map(cluster_detail)
            .map(|d| MemberCluster {
                name: d.name,
                ready: d.ready,
            })
            .collect())
    }

    async fn get_cluster(&self, name: &str) -> Result<ClusterDetail> {
        let obj = self
            .store
            .get(&self.hub, &Gvr::member_clusters(), None, name)
            .await?;
        Ok(cluster_detail(&obj))
    }
}

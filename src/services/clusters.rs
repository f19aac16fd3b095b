use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::clients::ResourceStore;
use crate::clients::inventory::{ClusterDetail, ClusterInventory};
use crate::error::Result;
use crate::helpers::{lookup, str_at};
use crate::models::k8s::{Condition, Gvr, ListOptions};
use crate::models::views::{ClusterInfo, ClusterType, InstallState};

use super::lifecycle::LifecycleManager;

/// Fleet overview: inventory data joined with a live controller probe.
pub struct ClusterView {
    store: Arc<dyn ResourceStore>,
    inventory: Arc<dyn ClusterInventory>,
    lifecycle: Arc<LifecycleManager>,
    hub: String,
}

fn node_ready(node: &Value) -> bool {
    lookup(node, &["status", "conditions"])
        .and_then(|c| serde_json::from_value::<Vec<Condition>>(c.clone()).ok())
        .unwrap_or_default()
        .iter()
        .any(|c| c.condition_type == "Ready" && c.is_true())
}

fn join_errors(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(format!("{}; {}", a, b)),
        (a, b) => a.or(b),
    }
}

impl ClusterView {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        inventory: Arc<dyn ClusterInventory>,
        lifecycle: Arc<LifecycleManager>,
        hub: impl Into<String>,
    ) -> Self {
        Self {
            store,
            inventory,
            lifecycle,
            hub: hub.into(),
        }
    }

    pub async fn list(&self) -> Result<Vec<ClusterInfo>> {
        let members = self.inventory.list_clusters().await?;
        let mut out = Vec::with_capacity(members.len() + 1);
        out.push(self.hub_info().await);
        for member in members {
            let info = match self.inventory.get_cluster(&member.name).await {
                Ok(detail) => self.member_info(detail).await,
                Err(e) => {
                    warn!(cluster = %member.name, error = %e, "cluster detail unavailable");
                    ClusterInfo {
                        name: member.name,
                        cluster_type: ClusterType::Member,
                        ready: member.ready,
                        controller_status: InstallState::Unknown,
                        controller_version: String::new(),
                        kubernetes_version: String::new(),
                        node_count: 0,
                        ready_nodes: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            out.push(info);
        }
        Ok(out)
    }

    pub async fn get(&self, name: &str) -> Result<ClusterInfo> {
        if name == self.hub {
            return Ok(self.hub_info().await);
        }
        let detail = self.inventory.get_cluster(name).await?;
        Ok(self.member_info(detail).await)
    }

    async fn controller(&self, cluster: &str) -> (InstallState, String, Option<String>) {
        match self.lifecycle.status(cluster).await {
            Ok(s) => (s.status, s.version, s.error),
            Err(e) => {
                warn!(cluster, error = %e, "controller status probe failed");
                (InstallState::Error, String::new(), Some(e.to_string()))
            }
        }
    }

    async fn hub_info(&self) -> ClusterInfo {
        let (ready, node_count, ready_nodes, kubernetes_version, node_error) = match self
            .store
            .list(&self.hub, &Gvr::nodes(), None, &ListOptions::default())
            .await
        {
            Ok(nodes) => {
                let version = nodes
                    .iter()
                    .find_map(|n| str_at(n, &["status", "nodeInfo", "kubeletVersion"]))
                    .unwrap_or_default()
                    .to_string();
                let ready_nodes = nodes.iter().filter(|n| node_ready(n)).count() as i64;
                (true, nodes.len() as i64, ready_nodes, version, None)
            }
            Err(e) => (false, 0, 0, String::new(), Some(e.to_string())),
        };
        let (controller_status, controller_version, status_error) = self.controller(&self.hub).await;
        ClusterInfo {
            name: self.hub.clone(),
            cluster_type: ClusterType::Management,
            ready,
            controller_status,
            controller_version,
            kubernetes_version,
            node_count,
            ready_nodes,
            error: join_errors(node_error, status_error),
        }
    }

    async fn member_info(&self, detail: ClusterDetail) -> ClusterInfo {
        let (controller_status, controller_version, error) = self.controller(&detail.name).await;
        ClusterInfo {
            name: detail.name,
            cluster_type: ClusterType::Member,
            ready: detail.ready,
            controller_status,
            controller_version,
            kubernetes_version: detail.kubernetes_version,
            node_count: detail.node_total,
            ready_nodes: detail.node_ready,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::manifest::MockManifestFetcher;
    use crate::clients::propagation::Propagator;
    use crate::config::ControllerConfig;
    use crate::testing::{FakeInventory, FakeStore, HUB};
    use serde_json::json;

    fn view(fake: Arc<FakeStore>, members: &[(&str, bool)]) -> ClusterView {
        let store: Arc<dyn ResourceStore> = fake;
        let inventory: Arc<dyn ClusterInventory> = Arc::new(FakeInventory::new(members));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            inventory.clone(),
            Arc::new(MockManifestFetcher::new()),
            Arc::new(Propagator::new(store.clone(), HUB)),
            HUB,
            ControllerConfig::default(),
        ));
        ClusterView::new(store, inventory, lifecycle, HUB)
    }

    fn node(name: &str, ready: &str) -> Value {
        json!({
            "metadata": {"name": name},
            "status": {
                "nodeInfo": {"kubeletVersion": "v1.31.0"},
                "conditions": [{"type": "Ready", "status": ready}]
            }
        })
    }

    #[tokio::test]
    async fn test_list_puts_management_first() {
        let fake = Arc::new(FakeStore::new());
        fake.insert(HUB, &Gvr::nodes(), None, node("n1", "True"));
        fake.insert(HUB, &Gvr::nodes(), None, node("n2", "False"));

        let clusters = view(fake, &[("edge-1", true), ("edge-2", false)]).list().await.unwrap();
        let names: Vec<&str> = clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![HUB, "edge-1", "edge-2"]);

        let hub = &clusters[0];
        assert_eq!(hub.cluster_type, ClusterType::Management);
        assert!(hub.ready);
        assert_eq!((hub.node_count, hub.ready_nodes), (2, 1));
        assert_eq!(hub.kubernetes_version, "v1.31.0");
        assert_eq!(hub.controller_status, InstallState::NotInstalled);

        assert_eq!(clusters[1].controller_status, InstallState::NotInstalled);
        assert_eq!(clusters[1].kubernetes_version, "v1.30.1");
        assert_eq!(clusters[2].controller_status, InstallState::Unknown);
        assert!(clusters[2].error.is_some());
    }

    #[tokio::test]
    async fn test_probe_failure_lands_in_error_field() {
        let fake = Arc::new(FakeStore::new());
        fake.make_unreachable("edge-1");
        let clusters = view(fake, &[("edge-1", true)]).list().await.unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].controller_status, InstallState::Error);
        assert!(clusters[1].error.as_deref().unwrap().contains("edge-1"));
    }

    #[tokio::test]
    async fn test_get_unknown_cluster() {
        let fake = Arc::new(FakeStore::new());
        let v = view(fake, &[("edge-1", true)]);
        assert_eq!(v.get("edge-1").await.unwrap().name, "edge-1");
        assert_eq!(v.get(HUB).await.unwrap().cluster_type, ClusterType::Management);
        assert!(v.get("ghost").await.unwrap_err().is_not_found());
    }
}

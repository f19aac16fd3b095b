use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;

use super::inventory::ClusterInventory;

/// Fans a per-cluster query out across the ready member clusters.
///
/// Clusters are visited one at a time. A cluster whose query fails is logged
/// and skipped, so the merged result may hold data from only part of the
/// fleet; callers cannot tell that apart from clusters that had nothing.
pub struct Aggregator {
    inventory: Arc<dyn ClusterInventory>,
}

impl Aggregator {
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self { inventory }
    }

    pub async fn ready_members(&self) -> Result<Vec<String>> {
        let clusters = self.inventory.list_clusters().await?;
        Ok(clusters
            .into_iter()
            .filter_map(|c| {
                if c.ready {
                    Some(c.name)
                } else {
                    debug!(cluster = %c.name, "skipping cluster that is not ready");
                    None
                }
            })
            .collect())
    }

    /// Fails only when the inventory itself cannot be read.
    pub async fn collect<T, F, Fut>(&self, mut per_cluster: F) -> Result<Vec<T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let mut merged = Vec::new();
        for cluster in self.ready_members().await? {
            match per_cluster(cluster.clone()).await {
                Ok(items) => merged.extend(items),
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "skipping cluster");
                }
            }
        }
        Ok(merged)
    }
}

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::ResourceStore;
use crate::clients::aggregator::Aggregator;
use crate::config::CheckpointRestoreConfig;
use crate::error::Result;
use crate::helpers::{lookup, name_of, parse_time, str_at, string_or_default};
use crate::models::k8s::{Gvr, ListOptions};
use crate::models::views::CheckpointRestoreEvent;

use super::extract::{self, UNKNOWN_SOURCE, accumulate, first};

/// Collects checkpoint-restore objects from every ready member cluster and
/// flattens them into one canonical event list.
pub struct EventNormalizer {
    store: Arc<dyn ResourceStore>,
    aggregator: Arc<Aggregator>,
    types: Vec<Gvr>,
}

impl EventNormalizer {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        aggregator: Arc<Aggregator>,
        config: &CheckpointRestoreConfig,
    ) -> Self {
        let types = config
            .versions
            .iter()
            .map(|v| Gvr::new(&config.group, v, &config.resource))
            .collect();
        Self {
            store,
            aggregator,
            types,
        }
    }

    pub async fn list(&self) -> Result<Vec<CheckpointRestoreEvent>> {
        let events = self
            .aggregator
            .collect(|cluster| self.scan(cluster))
            .await?;
        info!(count = events.len(), "collected checkpoint-restore events");
        Ok(events)
    }

    async fn scan(&self, cluster: String) -> Result<Vec<CheckpointRestoreEvent>> {
        for gvr in &self.types {
            match self
                .store
                .list(&cluster, gvr, None, &ListOptions::default())
                .await
            {
                Ok(items) => {
                    return Ok(items.iter().map(|obj| normalize(obj, &cluster)).collect());
                }
                Err(e) if e.is_not_found() => {
                    debug!(cluster = %cluster, version = %gvr.version, "checkpoint-restore type not served");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Vec::new())
    }
}

/// Canonical event for one checkpoint-restore object found on `cluster`.
pub fn normalize(obj: &Value, cluster: &str) -> CheckpointRestoreEvent {
    let created_at = string_or_default(obj, &["metadata", "creationTimestamp"]);
    let conditions = lookup(obj, &["status", "conditions"])
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let phase = first(obj, extract::PHASE).unwrap_or_else(|| "Unknown".to_string());
    let status = first(obj, extract::STATUS).unwrap_or_else(|| phase.to_lowercase());
    let progress = first(obj, extract::PROGRESS)
        .unwrap_or_else(|| default_progress(&phase))
        .clamp(0, 100);
    let message = first(obj, extract::MESSAGE)
        .or_else(|| last_condition_message(&conditions))
        .unwrap_or_default();
    let updated_at = latest_transition(&conditions).unwrap_or_else(|| created_at.clone());

    CheckpointRestoreEvent {
        name: name_of(obj),
        namespace: string_or_default(obj, &["metadata", "namespace"]),
        cluster: cluster.to_string(),
        source_cluster: first(obj, extract::SOURCE_CLUSTER)
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        target_cluster: first(obj, extract::TARGET_CLUSTER)
            .unwrap_or_else(|| cluster.to_string()),
        backup_ref: first(obj, extract::BACKUP_REF).unwrap_or_default(),
        resource_type: first(obj, extract::RESOURCE_TYPE).unwrap_or_else(|| "Pod".to_string()),
        resource_name: first(obj, extract::RESOURCE_NAME).unwrap_or_default(),
        resource_namespace: first(obj, extract::RESOURCE_NAMESPACE).unwrap_or_default(),
        phase,
        status,
        progress,
        message,
        created_at,
        updated_at,
        container_images: accumulate(obj, extract::CONTAINER_IMAGES),
        spec: lookup(obj, &["spec"]).cloned().unwrap_or(Value::Null),
        conditions,
    }
}

fn default_progress(phase: &str) -> i64 {
    match phase.to_ascii_lowercase().as_str() {
        "completed" | "succeeded" | "restored" => 100,
        _ => 0,
    }
}

/// Raw timestamp of the most recent condition transition.
fn latest_transition(conditions: &Value) -> Option<String> {
    conditions
        .as_array()?
        .iter()
        .filter_map(|c| {
            let raw = str_at(c, &["lastTransitionTime"])?;
            parse_time(raw).map(|t| (t, raw.to_string()))
        })
        .max_by_key(|(t, _)| *t)
        .map(|(_, raw)| raw)
}

fn last_condition_message(conditions: &Value) -> Option<String> {
    conditions
        .as_array()?
        .iter()
        .rev()
        .find_map(|c| str_at(c, &["message"]).map(str::to_string))
}

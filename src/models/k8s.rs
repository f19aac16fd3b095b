use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Addressing and metadata for schema-less cluster objects. Object bodies stay
// serde_json::Value; only the envelope pieces this crate writes are typed.

pub const MIGRATION_GROUP: &str = "migration.dcnlab.com";
pub const MIGRATION_VERSION: &str = "v1";

pub const LABEL_BACKUP_ID: &str = "migration.dcnlab.com/backup-id";
pub const LABEL_RECOVERY_ID: &str = "migration.dcnlab.com/recovery-id";
pub const LABEL_REGISTRY_ID: &str = "migration.dcnlab.com/registry-id";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "fleet-backup";

pub const ANNOTATION_DISPLAY_NAME: &str = "migration.dcnlab.com/display-name";
pub const ANNOTATION_DESCRIPTION: &str = "migration.dcnlab.com/description";
pub const ANNOTATION_UPDATED_AT: &str = "migration.dcnlab.com/updated-at";

/// Group, version and plural resource name of an API object type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Gvr {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Derive the resource from a manifest's apiVersion and kind.
    pub fn for_kind(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        Self::new(group, version, &plural(kind))
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// REST path relative to a cluster's API base URL.
    pub fn path(&self, namespace: Option<&str>, name: Option<&str>) -> String {
        let mut p = if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        };
        if let Some(ns) = namespace {
            p.push_str(&format!("/namespaces/{}", ns));
        }
        p.push('/');
        p.push_str(&self.resource);
        if let Some(n) = name {
            p.push('/');
            p.push_str(n);
        }
        p
    }

    pub fn namespaces() -> Self {
        Self::new("", "v1", "namespaces")
    }

    pub fn secrets() -> Self {
        Self::new("", "v1", "secrets")
    }

    pub fn pods() -> Self {
        Self::new("", "v1", "pods")
    }

    pub fn nodes() -> Self {
        Self::new("", "v1", "nodes")
    }

    pub fn deployments() -> Self {
        Self::new("apps", "v1", "deployments")
    }

    pub fn daemonsets() -> Self {
        Self::new("apps", "v1", "daemonsets")
    }

    pub fn backups() -> Self {
        Self::new(MIGRATION_GROUP, MIGRATION_VERSION, "statefulmigrations")
    }

    pub fn recoveries() -> Self {
        Self::new(MIGRATION_GROUP, MIGRATION_VERSION, "migrationrecoveries")
    }

    pub fn checkpoint_backups() -> Self {
        Self::new(MIGRATION_GROUP, MIGRATION_VERSION, "checkpointbackups")
    }

    pub fn checkpoint_restores() -> Self {
        Self::new(MIGRATION_GROUP, MIGRATION_VERSION, "checkpointrestores")
    }

    pub fn propagation_policies() -> Self {
        Self::new("policy.karmada.io", "v1alpha1", "propagationpolicies")
    }

    pub fn cluster_propagation_policies() -> Self {
        Self::new("policy.karmada.io", "v1alpha1", "clusterpropagationpolicies")
    }

    pub fn member_clusters() -> Self {
        Self::new("cluster.karmada.io", "v1alpha1", "clusters")
    }
}

fn plural(kind: &str) -> String {
    let lower = kind.to_lowercase();
    let vowel_y = ["ay", "ey", "oy", "uy"].iter().any(|s| lower.ends_with(s));
    if lower.ends_with('y') && !vowel_y {
        format!("{}ies", &lower[..lower.len() - 1])
    } else if lower.ends_with('s') {
        format!("{}es", lower)
    } else {
        format!("{}s", lower)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub limit: Option<u32>,
}

impl ListOptions {
    pub fn labels(selector: impl Into<String>) -> Self {
        Self {
            label_selector: Some(selector.into()),
            limit: None,
        }
    }

    pub fn limit(n: u32) -> Self {
        Self {
            label_selector: None,
            limit: Some(n),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Metadata stamped with the managed-by label.
    pub fn managed(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: impl Into<String>) -> Self {
        self.annotations.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_and_group_paths() {
        assert_eq!(
            Gvr::secrets().path(Some("ns1"), Some("s1")),
            "/api/v1/namespaces/ns1/secrets/s1"
        );
        assert_eq!(
            Gvr::cluster_propagation_policies().path(None, None),
            "/apis/policy.karmada.io/v1alpha1/clusterpropagationpolicies"
        );
        assert_eq!(Gvr::deployments().api_version(), "apps/v1");
        assert_eq!(Gvr::pods().api_version(), "v1");
    }

    #[test]
    fn test_for_kind_pluralizes() {
        assert_eq!(
            Gvr::for_kind("rbac.authorization.k8s.io/v1", "ClusterRoleBinding"),
            Gvr::new("rbac.authorization.k8s.io", "v1", "clusterrolebindings")
        );
        assert_eq!(
            Gvr::for_kind("policy.karmada.io/v1alpha1", "PropagationPolicy").resource,
            "propagationpolicies"
        );
        assert_eq!(Gvr::for_kind("v1", "ServiceAccount").group, "");
        assert_eq!(
            Gvr::for_kind("apiextensions.k8s.io/v1", "CustomResourceDefinition").resource,
            "customresourcedefinitions"
        );
    }
}

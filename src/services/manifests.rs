//! Typed view over controller install manifests.
//!
//! Every manifest object is classified once into an [`ObjectKind`]; scope,
//! per-member renaming and propagation-rule placement all derive from the
//! variant.

use serde_json::Value;
use std::collections::HashMap;

use crate::clients::propagation::ResourceSelector;
use crate::helpers::{lookup, name_of, set_path, str_at, string_or_default};
use crate::models::k8s::Gvr;

pub const VERSION_MARKER: &str = "migrationBackup_";
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Cluster,
    Namespaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Namespace,
    CustomResourceDefinition,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    Deployment,
    DaemonSet,
    Other(Scope),
}

impl ObjectKind {
    pub fn classify(obj: &Value) -> Self {
        match str_at(obj, &["kind"]).unwrap_or_default() {
            "Namespace" => Self::Namespace,
            "CustomResourceDefinition" => Self::CustomResourceDefinition,
            "ServiceAccount" => Self::ServiceAccount,
            "ClusterRole" => Self::ClusterRole,
            "ClusterRoleBinding" => Self::ClusterRoleBinding,
            "Role" => Self::Role,
            "RoleBinding" => Self::RoleBinding,
            "Deployment" => Self::Deployment,
            "DaemonSet" => Self::DaemonSet,
            _ if str_at(obj, &["metadata", "namespace"]).is_some() => {
                Self::Other(Scope::Namespaced)
            }
            _ => Self::Other(Scope::Cluster),
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            Self::Namespace
            | Self::CustomResourceDefinition
            | Self::ClusterRole
            | Self::ClusterRoleBinding => Scope::Cluster,
            Self::ServiceAccount
            | Self::Role
            | Self::RoleBinding
            | Self::Deployment
            | Self::DaemonSet => Scope::Namespaced,
            Self::Other(scope) => scope,
        }
    }

    /// Objects that would collide on the hub when several members are installed.
    pub fn renamed_per_member(self) -> bool {
        matches!(
            self,
            Self::ServiceAccount | Self::ClusterRole | Self::ClusterRoleBinding | Self::DaemonSet
        )
    }

    /// Namespaces are delivered by the policy engine on its own.
    fn propagated(self) -> bool {
        !matches!(self, Self::Namespace)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestObject {
    pub kind: ObjectKind,
    pub body: Value,
}

impl ManifestObject {
    /// Classify `body`, placing namespaced objects without a namespace into `default_namespace`.
    pub fn new(mut body: Value, default_namespace: &str) -> Self {
        let kind = ObjectKind::classify(&body);
        if kind.scope() == Scope::Namespaced && str_at(&body, &["metadata", "namespace"]).is_none() {
            set_path(
                &mut body,
                &["metadata", "namespace"],
                Value::String(default_namespace.to_string()),
            );
        }
        Self { kind, body }
    }

    pub fn name(&self) -> String {
        name_of(&self.body)
    }

    pub fn namespace(&self) -> Option<&str> {
        match self.kind.scope() {
            Scope::Namespaced => str_at(&self.body, &["metadata", "namespace"]),
            Scope::Cluster => None,
        }
    }

    pub fn gvr(&self) -> Gvr {
        Gvr::for_kind(
            str_at(&self.body, &["apiVersion"]).unwrap_or("v1"),
            str_at(&self.body, &["kind"]).unwrap_or_default(),
        )
    }

    pub fn selector(&self) -> ResourceSelector {
        ResourceSelector::new(
            &string_or_default(&self.body, &["apiVersion"]),
            &string_or_default(&self.body, &["kind"]),
            &self.name(),
            self.namespace(),
        )
    }
}

pub fn classify_all(objects: Vec<Value>, default_namespace: &str) -> Vec<ManifestObject> {
    objects
        .into_iter()
        .map(|o| ManifestObject::new(o, default_namespace))
        .collect()
}

/// Rename the collision-prone objects for one member cluster and rewrite
/// the references between them. The daemonset always becomes
/// `<daemonset_base>-<cluster>`.
pub fn localize_for_member(objects: &mut [ManifestObject], cluster: &str, daemonset_base: &str) {
    let mut renamed: HashMap<(ObjectKind, String), String> = HashMap::new();
    for obj in objects.iter_mut().filter(|o| o.kind.renamed_per_member()) {
        let old = obj.name();
        let new = match obj.kind {
            ObjectKind::DaemonSet => format!("{}-{}", daemonset_base, cluster),
            _ => format!("{}-{}", old, cluster),
        };
        set_path(&mut obj.body, &["metadata", "name"], Value::String(new.clone()));
        renamed.insert((obj.kind, old), new);
    }

    let lookup_new = |kind: ObjectKind, name: &str| renamed.get(&(kind, name.to_string())).cloned();

    for obj in objects.iter_mut() {
        match obj.kind {
            ObjectKind::ClusterRoleBinding | ObjectKind::RoleBinding => {
                if let Some(Value::Array(subjects)) = obj.body.get_mut("subjects") {
                    for subject in subjects.iter_mut() {
                        if str_at(subject, &["kind"]) != Some("ServiceAccount") {
                            continue;
                        }
                        let name = string_or_default(subject, &["name"]);
                        if let Some(new) = lookup_new(ObjectKind::ServiceAccount, &name) {
                            set_path(subject, &["name"], Value::String(new));
                        }
                    }
                }
                if str_at(&obj.body, &["roleRef", "kind"]) == Some("ClusterRole") {
                    let name = string_or_default(&obj.body, &["roleRef", "name"]);
                    if let Some(new) = lookup_new(ObjectKind::ClusterRole, &name) {
                        set_path(&mut obj.body, &["roleRef", "name"], Value::String(new));
                    }
                }
            }
            ObjectKind::DaemonSet | ObjectKind::Deployment => {
                for field in ["serviceAccountName", "serviceAccount"] {
                    let path = ["spec", "template", "spec", field];
                    let name = string_or_default(&obj.body, &path);
                    if let Some(new) = lookup_new(ObjectKind::ServiceAccount, &name) {
                        set_path(&mut obj.body, &path, Value::String(new));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Selectors for the two propagation rules of a member install:
/// namespaced objects first, cluster-scoped second.
pub fn selectors_by_scope(objects: &[ManifestObject]) -> (Vec<ResourceSelector>, Vec<ResourceSelector>) {
    let mut namespaced = Vec::new();
    let mut cluster = Vec::new();
    for obj in objects.iter().filter(|o| o.kind.propagated()) {
        match obj.kind.scope() {
            Scope::Namespaced => namespaced.push(obj.selector()),
            Scope::Cluster => cluster.push(obj.selector()),
        }
    }
    (namespaced, cluster)
}

/// `<base>:migrationBackup_<version>`
pub fn versioned_image(base: &str, version: &str) -> String {
    format!("{}:{}{}", image_base(base), VERSION_MARKER, version)
}

/// Image reference without its tag. A port in the registry host is kept.
pub fn image_base(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    let last_segment = image.rfind('/').map_or(0, |i| i + 1);
    match image[last_segment..].rfind(':') {
        Some(i) => &image[..last_segment + i],
        None => image,
    }
}

/// Version encoded in an image tag, or `"unknown"` when the tag does not
/// follow the `migrationBackup_<version>` convention.
pub fn version_from_image(image: &str) -> String {
    let base = image_base(image);
    image[base.len()..]
        .strip_prefix(':')
        .and_then(|tag| tag.split_once(VERSION_MARKER))
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
        .map_or_else(|| UNKNOWN_VERSION.to_string(), str::to_string)
}

/// First container image of a workload's pod template.
pub fn workload_image(obj: &Value) -> Option<String> {
    lookup(obj, &["spec", "template", "spec", "containers"])?
        .as_array()?
        .iter()
        .find_map(|c| str_at(c, &["image"]).map(str::to_string))
}

/// Point the controller containers of a workload at `version`. Containers
/// running `base` are rewritten; when none do, the first container is.
/// Returns whether any image changed.
pub fn set_image_version(obj: &mut Value, base: &str, version: &str) -> bool {
    let target = versioned_image(base, version);
    let wanted = image_base(base).to_string();
    let Some(Value::Array(containers)) = obj
        .get_mut("spec")
        .and_then(|s| s.get_mut("template"))
        .and_then(|t| t.get_mut("spec"))
        .and_then(|s| s.get_mut("containers"))
    else {
        return false;
    };

    let matching: Vec<usize> = containers
        .iter()
        .enumerate()
        .filter(|(_, c)| str_at(c, &["image"]).is_some_and(|i| image_base(i) == wanted))
        .map(|(i, _)| i)
        .collect();
    let indexes = if matching.is_empty() && !containers.is_empty() {
        vec![0]
    } else {
        matching
    };

    let mut changed = false;
    for i in indexes {
        let container = &mut containers[i];
        if str_at(container, &["image"]) != Some(target.as_str()) {
            set_path(container, &["image"], Value::String(target.clone()));
            changed = true;
        }
    }
    changed
}

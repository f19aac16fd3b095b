//! Ordered field-extraction rules for checkpoint-restore objects.
//!
//! Controller releases disagree on field names, so each canonical field is a
//! priority list of `(path, transform)` candidates. The first candidate whose
//! path exists and whose transform yields a value wins; image lists instead
//! accumulate every match.

use serde_json::Value;

use crate::helpers::{int_at, lookup};

pub const UNKNOWN_SOURCE: &str = "unknown-source";

pub type Transform<T> = fn(&Value) -> Option<T>;

pub struct Candidate<T: 'static> {
    pub path: &'static [&'static str],
    pub transform: Transform<T>,
}

const fn at<T>(path: &'static [&'static str], transform: Transform<T>) -> Candidate<T> {
    Candidate { path, transform }
}

/// Value of the first matching candidate.
pub fn first<T>(obj: &Value, candidates: &[Candidate<T>]) -> Option<T> {
    candidates
        .iter()
        .find_map(|c| lookup(obj, c.path).and_then(c.transform))
}

/// Concatenation of every matching candidate, in candidate order.
pub fn accumulate<T>(obj: &Value, candidates: &[Candidate<Vec<T>>]) -> Vec<T> {
    candidates
        .iter()
        .filter_map(|c| lookup(obj, c.path).and_then(c.transform))
        .flatten()
        .collect()
}

// --- transforms ---

fn text(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn number(v: &Value) -> Option<i64> {
    int_at(v, &[])
}

/// A reference written either as a bare name or as `{name: ...}`.
fn ref_name(v: &Value) -> Option<String> {
    text(v).or_else(|| v.get("name").and_then(text))
}

fn ref_namespace(v: &Value) -> Option<String> {
    v.get("namespace").and_then(text)
}

fn ref_cluster(v: &Value) -> Option<String> {
    ["cluster", "clusterName", "sourceCluster"]
        .iter()
        .find_map(|k| v.get(*k).and_then(text))
}

/// A cluster written either as a bare name or as `{cluster: ...}`.
fn cluster_field(v: &Value) -> Option<String> {
    text(v).or_else(|| ref_cluster(v))
}

const GENERIC_TOKENS: &[&str] = &[
    "checkpoint", "ckpt", "backup", "bak", "restore", "recovery", "migration", "migrate",
    "stateful", "statefulset", "sts", "snapshot", "pod", "job", "cr",
];

fn is_generic(token: &str) -> bool {
    token.len() < 2
        || token.chars().all(|c| c.is_ascii_digit())
        || GENERIC_TOKENS.contains(&token.to_ascii_lowercase().as_str())
}

/// First non-generic token of a hyphenated name: `checkpoint-prod-web` → `prod`.
pub fn name_token(name: &str) -> Option<String> {
    let tokens: Vec<&str> = name.split('-').collect();
    if tokens.len() < 2 {
        return None;
    }
    tokens
        .into_iter()
        .find(|t| !is_generic(t))
        .map(str::to_string)
}

fn ref_name_token(v: &Value) -> Option<String> {
    ref_name(v).as_deref().and_then(name_token)
}

fn is_system_namespace(ns: &str) -> bool {
    matches!(ns, "default" | "stateful-migration")
        || ns.starts_with("kube-")
        || ns.starts_with("karmada-")
        || ns.ends_with("-system")
}

/// `cluster-<x>` names cluster `x`; any other non-system namespace names itself.
pub fn namespace_cluster(ns: &str) -> Option<String> {
    if let Some(rest) = ns.strip_prefix("cluster-").filter(|r| !r.is_empty()) {
        return Some(rest.to_string());
    }
    if ns.is_empty() || is_system_namespace(ns) {
        None
    } else {
        Some(ns.to_string())
    }
}

fn ref_namespace_cluster(v: &Value) -> Option<String> {
    ref_namespace(v).as_deref().and_then(namespace_cluster)
}

fn prefixed_namespace_cluster(v: &Value) -> Option<String> {
    v.as_str()
        .and_then(|ns| ns.strip_prefix("cluster-"))
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

fn present_as_pod(v: &Value) -> Option<String> {
    let present = match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    };
    present.then(|| "Pod".to_string())
}

/// Strings, or objects carrying an `image` field.
fn images(v: &Value) -> Option<Vec<String>> {
    let items = v.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|i| text(i).or_else(|| i.get("image").and_then(text)))
            .collect(),
    )
}

// --- per-field rules ---

pub const TARGET_CLUSTER: &[Candidate<String>] = &[
    at(&["spec", "targetCluster"], cluster_field),
    at(&["spec", "destination"], cluster_field),
    at(&["spec", "destCluster"], cluster_field),
];

pub const BACKUP_REF: &[Candidate<String>] = &[
    at(&["spec", "backupRef"], ref_name),
    at(&["spec", "backup"], ref_name),
    at(&["spec", "source"], ref_name),
];

pub const SOURCE_CLUSTER: &[Candidate<String>] = &[
    at(&["spec", "backupRef"], ref_cluster),
    at(&["spec", "backup"], ref_cluster),
    at(&["spec", "source"], ref_cluster),
    at(&["spec", "backupRef"], ref_name_token),
    at(&["spec", "backup"], ref_name_token),
    at(&["spec", "source"], ref_name_token),
    at(&["spec", "backupRef"], ref_namespace_cluster),
    at(&["spec", "backup"], ref_namespace_cluster),
    at(&["spec", "source"], ref_namespace_cluster),
    at(&["metadata", "namespace"], prefixed_namespace_cluster),
    at(&["metadata", "labels", "source-cluster"], text),
    at(&["metadata", "labels", "sourceCluster"], text),
    at(&["metadata", "labels", "migration.dcnlab.com/source-cluster"], text),
    at(&["metadata", "annotations", "source-cluster"], text),
    at(&["metadata", "annotations", "sourceCluster"], text),
    at(&["metadata", "annotations", "migration.dcnlab.com/source-cluster"], text),
    at(&["status", "sourceCluster"], text),
    at(&["status", "source", "cluster"], text),
];

pub const RESOURCE_TYPE: &[Candidate<String>] = &[
    at(&["spec", "resourceRef", "kind"], text),
    at(&["spec", "podName"], present_as_pod),
    at(&["spec", "containers"], present_as_pod),
    at(&["spec", "workload", "kind"], text),
    at(&["spec", "kind"], text),
];

pub const RESOURCE_NAME: &[Candidate<String>] = &[
    at(&["spec", "resourceRef", "name"], text),
    at(&["spec", "podName"], text),
    at(&["spec", "name"], text),
    at(&["spec", "workload"], ref_name),
    at(&["metadata", "name"], text),
];

pub const RESOURCE_NAMESPACE: &[Candidate<String>] = &[
    at(&["spec", "resourceRef", "namespace"], text),
    at(&["spec", "podNamespace"], text),
    at(&["spec", "namespace"], text),
    at(&["spec", "workload", "namespace"], text),
    at(&["metadata", "namespace"], text),
];

pub const CONTAINER_IMAGES: &[Candidate<Vec<String>>] = &[
    at(&["spec", "containerImages"], images),
    at(&["spec", "containers"], images),
    at(&["spec", "restore", "images"], images),
    at(&["spec", "checkpointInfo", "images"], images),
    at(&["status", "containerImages"], images),
    at(&["status", "restoredImages"], images),
];

pub const PHASE: &[Candidate<String>] = &[
    at(&["status", "phase"], text),
    at(&["spec", "phase"], text),
];

pub const STATUS: &[Candidate<String>] = &[
    at(&["status", "state"], text),
    at(&["status", "status"], text),
];

pub const PROGRESS: &[Candidate<i64>] = &[
    at(&["status", "progress"], number),
    at(&["status", "percentage"], number),
];

pub const MESSAGE: &[Candidate<String>] = &[
    at(&["status", "message"], text),
    at(&["status", "error"], text),
    at(&["status", "reason"], text),
];

//! In-memory fakes for the cluster-facing seams.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::clients::ResourceStore;
use crate::clients::propagation::Propagator;
use crate::clients::inventory::{ClusterDetail, ClusterInventory, MemberCluster};
use crate::error::{Error, Result};
use crate::helpers::{name_of, set_path, str_at};
use crate::models::k8s::{Gvr, ListOptions};
use crate::models::views::{CreateBackupRequest, CreateRegistryRequest, Schedule};
use crate::services::backup::BackupManager;
use crate::services::registry::RegistryStore;

type Key = (String, String, String, String);

fn key(cluster: &str, gvr: &Gvr, namespace: Option<&str>, name: &str) -> Key {
    (
        cluster.to_string(),
        format!("{}/{}", gvr.api_version(), gvr.resource),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    unreachable: Mutex<HashSet<String>>,
    unserved: Mutex<HashSet<(String, String)>>,
    failing_deletes: Mutex<HashSet<String>>,
    creates: Mutex<usize>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, obj: Value) {
        let k = key(cluster, gvr, namespace, &name_of(&obj));
        self.objects.lock().unwrap().insert(k, obj);
    }

    pub fn object(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(cluster, gvr, namespace, name))
            .cloned()
    }

    /// Number of objects of this type on the cluster, across namespaces.
    pub fn count(&self, cluster: &str, gvr: &Gvr) -> usize {
        let t = format!("{}/{}", gvr.api_version(), gvr.resource);
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, r, _, _)| c == cluster && *r == t)
            .count()
    }

    pub fn create_calls(&self) -> usize {
        *self.creates.lock().unwrap()
    }

    /// Every call against the cluster fails as a transport error.
    pub fn make_unreachable(&self, cluster: &str) {
        self.unreachable.lock().unwrap().insert(cluster.to_string());
    }

    /// The cluster answers NotFound for this type, as for an absent CRD.
    pub fn make_unserved(&self, cluster: &str, gvr: &Gvr) {
        self.unserved.lock().unwrap().insert((
            cluster.to_string(),
            format!("{}/{}", gvr.api_version(), gvr.resource),
        ));
    }

    pub fn fail_deletes_of(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    fn check(&self, cluster: &str, gvr: &Gvr) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(cluster) {
            return Err(Error::unavailable(cluster, "connection timed out"));
        }
        let t = (
            cluster.to_string(),
            format!("{}/{}", gvr.api_version(), gvr.resource),
        );
        if self.unserved.lock().unwrap().contains(&t) {
            return Err(Error::not_found(format!(
                "the server could not find the requested resource {}",
                gvr.resource
            )));
        }
        Ok(())
    }
}

fn matches_selector(obj: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        match term.split_once('=') {
            Some((k, v)) => str_at(obj, &["metadata", "labels", k]) == Some(v),
            None => str_at(obj, &["metadata", "labels", term]).is_some(),
        }
    })
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, name: &str) -> Result<Value> {
        self.check(cluster, gvr)?;
        self.object(cluster, gvr, namespace, name)
            .ok_or_else(|| Error::not_found(format!("{} {}", gvr.resource, name)))
    }

    async fn list(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> Result<Vec<Value>> {
        self.check(cluster, gvr)?;
        let t = format!("{}/{}", gvr.api_version(), gvr.resource);
        let mut items: Vec<Value> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, r, ns, _), _)| {
                c == cluster && *r == t && namespace.is_none_or(|n| n == ns)
            })
            .map(|(_, v)| v.clone())
            .filter(|v| {
                opts.label_selector
                    .as_deref()
                    .is_none_or(|s| matches_selector(v, s))
            })
            .collect();
        if let Some(limit) = opts.limit {
            items.truncate(limit as usize);
        }
        Ok(items)
    }

    async fn create(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, obj: &Value) -> Result<Value> {
        self.check(cluster, gvr)?;
        *self.creates.lock().unwrap() += 1;
        let k = key(cluster, gvr, namespace, &name_of(obj));
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&k) {
            return Err(Error::AlreadyExists(format!("{} {}", gvr.resource, k.3)));
        }
        let mut stored = obj.clone();
        if str_at(&stored, &["metadata", "creationTimestamp"]).is_none() {
            set_path(
                &mut stored,
                &["metadata", "creationTimestamp"],
                Value::String("2026-01-01T00:00:00Z".to_string()),
            );
        }
        if let Some(ns) = namespace {
            set_path(&mut stored, &["metadata", "namespace"], Value::String(ns.to_string()));
        }
        objects.insert(k, stored.clone());
        Ok(stored)
    }

    async fn update(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, obj: &Value) -> Result<Value> {
        self.check(cluster, gvr)?;
        let k = key(cluster, gvr, namespace, &name_of(obj));
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&k) {
            return Err(Error::not_found(format!("{} {}", gvr.resource, k.3)));
        }
        objects.insert(k, obj.clone());
        Ok(obj.clone())
    }

    async fn delete(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, name: &str) -> Result<()> {
        self.check(cluster, gvr)?;
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(Error::Upstream {
                target: cluster.to_string(),
                status: 403,
                message: format!("delete {} forbidden", name),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&key(cluster, gvr, namespace, name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("{} {}", gvr.resource, name)))
    }

    async fn pod_logs(&self, cluster: &str, namespace: &str, pod: &str, tail_lines: u32) -> Result<String> {
        self.check(cluster, &Gvr::pods())?;
        Ok(format!("{}/{}/{}: last {} lines", cluster, namespace, pod, tail_lines))
    }
}

/// Inventory backed by a fixed member list.
pub struct FakeInventory {
    pub members: Vec<ClusterDetail>,
}

impl FakeInventory {
    pub fn new(members: &[(&str, bool)]) -> Self {
        Self {
            members: members
                .iter()
                .map(|(name, ready)| ClusterDetail {
                    name: name.to_string(),
                    ready: *ready,
                    kubernetes_version: "v1.30.1".to_string(),
                    node_total: 3,
                    node_ready: 3,
                    ..Default::default()
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ClusterInventory for FakeInventory {
    async fn list_clusters(&self) -> Result<Vec<MemberCluster>> {
        Ok(self
            .members
            .iter()
            .map(|m| MemberCluster {
                name: m.name.clone(),
                ready: m.ready,
            })
            .collect())
    }

    async fn get_cluster(&self, name: &str) -> Result<ClusterDetail> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("cluster {}", name)))
    }
}

pub const HUB: &str = "management";
pub const NS: &str = "stateful-migration";

/// Hub-side services over one fake store, with one registry already created.
pub struct Fixture {
    pub fake: Arc<FakeStore>,
    pub registries: Arc<RegistryStore>,
    pub backups: Arc<BackupManager>,
    pub registry_id: String,
}

pub async fn fixture() -> Fixture {
    let fake = Arc::new(FakeStore::new());
    let store: Arc<dyn ResourceStore> = fake.clone();
    let propagator = Arc::new(Propagator::new(store.clone(), HUB));
    let registries = Arc::new(RegistryStore::new(
        store.clone(),
        propagator,
        HUB,
        NS,
        "registry-credentials",
    ));
    let registry = registries
        .create(CreateRegistryRequest {
            name: "harbor".to_string(),
            registry: "harbor.example.com".to_string(),
            username: "robot".to_string(),
            password: "pw".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    let backups = Arc::new(BackupManager::new(store, registries.clone(), HUB, NS));
    Fixture {
        fake,
        registries,
        backups,
        registry_id: registry.id,
    }
}

pub fn create_backup_request(registry_id: &str) -> CreateBackupRequest {
    CreateBackupRequest {
        name: "web db".to_string(),
        cluster: "member-1".to_string(),
        resource_type: "statefulset".to_string(),
        resource_name: "web".to_string(),
        namespace: "shop".to_string(),
        registry_id: registry_id.to_string(),
        repository: "backups/web".to_string(),
        schedule: Schedule {
            schedule_type: "selection".to_string(),
            value: "15m".to_string(),
            enabled: true,
        },
    }
}

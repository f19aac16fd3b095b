use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::inventory::ClusterInventory;
use crate::clients::manifest::{ManifestFetcher, parse_manifest};
use crate::clients::propagation::Propagator;
use crate::clients::{ResourceStore, create_if_absent, delete_if_present};
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::helpers::{int_at, lookup, name_of};
use crate::models::k8s::{Gvr, ListOptions};
use crate::models::views::{ControllerLogs, ControllerStatus, InstallState};

use super::manifests::{
    ManifestObject, ObjectKind, UNKNOWN_VERSION, classify_all, localize_for_member,
    selectors_by_scope, set_image_version, version_from_image, workload_image,
};

/// Installs, removes and probes the backup controllers. The hub runs two
/// deployments; each member runs a daemonset delivered through the hub's
/// propagation rules.
pub struct LifecycleManager {
    store: Arc<dyn ResourceStore>,
    inventory: Arc<dyn ClusterInventory>,
    fetcher: Arc<dyn ManifestFetcher>,
    propagator: Arc<Propagator>,
    hub: String,
    config: ControllerConfig,
}

fn report(cluster: &str, status: InstallState) -> ControllerStatus {
    ControllerStatus {
        cluster: cluster.to_string(),
        status,
        version: String::new(),
        ready: 0,
        desired: 0,
        error: None,
    }
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty()
        || !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(Error::validation(format!(
            "invalid controller version {:?}",
            version
        )));
    }
    Ok(())
}

/// `matchLabels` of a workload as a label selector string.
fn pod_selector(workload: &Value) -> Option<String> {
    let labels = lookup(workload, &["spec", "selector", "matchLabels"])?.as_object()?;
    let terms: Vec<String> = labels
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| format!("{}={}", k, v)))
        .collect();
    (!terms.is_empty()).then(|| terms.join(","))
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        inventory: Arc<dyn ClusterInventory>,
        fetcher: Arc<dyn ManifestFetcher>,
        propagator: Arc<Propagator>,
        hub: impl Into<String>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            inventory,
            fetcher,
            propagator,
            hub: hub.into(),
            config,
        }
    }

    pub fn is_hub(&self, cluster: &str) -> bool {
        cluster == self.hub
    }

    fn member_daemonset(&self, cluster: &str) -> String {
        format!("{}-{}", self.config.daemonset_name, cluster)
    }

    async fn load(&self, url: &str) -> Result<Vec<ManifestObject>> {
        let text = self.fetcher.fetch(url).await?;
        let objects = parse_manifest(&text)?;
        debug!(url, count = objects.len(), "fetched manifest");
        Ok(classify_all(objects, &self.config.namespace))
    }

    /// Create-only apply; existing objects are left untouched.
    async fn apply(&self, objects: &[ManifestObject]) -> Result<usize> {
        let mut created = 0;
        for obj in objects {
            if create_if_absent(
                self.store.as_ref(),
                &self.hub,
                &obj.gvr(),
                obj.namespace(),
                &obj.body,
            )
            .await?
            {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn ensure_namespace(&self) -> Result<()> {
        let body = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": self.config.namespace}
        });
        create_if_absent(self.store.as_ref(), &self.hub, &Gvr::namespaces(), None, &body).await?;
        Ok(())
    }

    pub async fn install(&self, cluster: &str, version: &str) -> Result<()> {
        validate_version(version)?;
        if self.is_hub(cluster) {
            self.install_hub(version).await
        } else {
            self.install_member(cluster, version).await
        }
    }

    async fn install_hub(&self, version: &str) -> Result<()> {
        self.ensure_namespace().await?;

        let mut created = 0;
        for url in [&self.config.crd_manifest_url, &self.config.rbac_manifest_url] {
            created += self.apply(&self.load(url).await?).await?;
        }
        let deployments = self.load(&self.config.deployment_manifest_url).await?;
        created += self.apply(&deployments).await?;

        for obj in deployments.iter().filter(|o| o.kind == ObjectKind::Deployment) {
            let gvr = obj.gvr();
            let mut live = self
                .store
                .get(&self.hub, &gvr, obj.namespace(), &obj.name())
                .await?;
            if set_image_version(&mut live, &self.config.image, version) {
                self.store.update(&self.hub, &gvr, obj.namespace(), &live).await?;
                info!(deployment = %obj.name(), version, "set controller version");
            }
        }
        info!(cluster = %self.hub, created, version, "installed hub controllers");
        Ok(())
    }

    async fn member_objects(&self, cluster: &str) -> Result<Vec<ManifestObject>> {
        let mut objects = self.load(&self.config.member_rbac_manifest_url).await?;
        objects.extend(self.load(&self.config.daemonset_manifest_url).await?);
        localize_for_member(&mut objects, cluster, &self.config.daemonset_name);
        Ok(objects)
    }

    async fn install_member(&self, cluster: &str, version: &str) -> Result<()> {
        self.inventory.get_cluster(cluster).await?;

        let mut objects = self.member_objects(cluster).await?;
        for obj in objects.iter_mut().filter(|o| o.kind == ObjectKind::DaemonSet) {
            set_image_version(&mut obj.body, &self.config.image, version);
        }

        self.ensure_namespace().await?;
        let created = self.apply(&objects).await?;

        let (namespaced, cluster_scoped) = selectors_by_scope(&objects);
        let policy = self.member_daemonset(cluster);
        let targets = [cluster.to_string()];
        self.propagator
            .create_namespaced(&policy, &self.config.namespace, &namespaced, &targets)
            .await?;
        if !cluster_scoped.is_empty() {
            self.propagator
                .create_cluster_scoped(&policy, &cluster_scoped, &targets)
                .await?;
        }
        info!(cluster, created, version, "installed member controller");
        Ok(())
    }

    /// Best-effort removal; only a failed removal of the controller workloads
    /// fails the call.
    pub async fn uninstall(&self, cluster: &str) -> Result<()> {
        if self.is_hub(cluster) {
            self.uninstall_hub().await
        } else {
            self.uninstall_member(cluster).await
        }
    }

    async fn remove_quietly(&self, obj: &ManifestObject) {
        if let Err(e) = delete_if_present(
            self.store.as_ref(),
            &self.hub,
            &obj.gvr(),
            obj.namespace(),
            &obj.name(),
        )
        .await
        {
            warn!(kind = ?obj.kind, name = %obj.name(), error = %e, "failed to remove object");
        }
    }

    async fn remove_primary(&self, gvr: &Gvr, name: &str, failure: &mut Option<Error>) {
        match delete_if_present(
            self.store.as_ref(),
            &self.hub,
            gvr,
            Some(&self.config.namespace),
            name,
        )
        .await
        {
            Ok(removed) => debug!(name, removed, "removed controller workload"),
            Err(e) => {
                warn!(name, error = %e, "failed to remove controller workload");
                failure.get_or_insert(e);
            }
        }
    }

    async fn uninstall_hub(&self) -> Result<()> {
        let mut failure = None;
        for name in [&self.config.backup_deployment, &self.config.restore_deployment] {
            self.remove_primary(&Gvr::deployments(), name, &mut failure).await;
        }

        // CRDs stay: removing them would delete every stored backup and recovery.
        for url in [&self.config.deployment_manifest_url, &self.config.rbac_manifest_url] {
            match self.load(url).await {
                Ok(objects) => {
                    for obj in objects.iter().filter(|o| {
                        !matches!(o.kind, ObjectKind::Namespace | ObjectKind::CustomResourceDefinition)
                    }) {
                        self.remove_quietly(obj).await;
                    }
                }
                Err(e) => warn!(url = %url, error = %e, "skipping manifest cleanup"),
            }
        }

        match self.namespace_is_empty().await {
            Ok(true) => {
                if let Err(e) = delete_if_present(
                    self.store.as_ref(),
                    &self.hub,
                    &Gvr::namespaces(),
                    None,
                    &self.config.namespace,
                )
                .await
                {
                    warn!(namespace = %self.config.namespace, error = %e, "failed to remove namespace");
                }
            }
            Ok(false) => info!(namespace = %self.config.namespace, "namespace still has workloads, keeping it"),
            Err(e) => warn!(error = %e, "could not inspect namespace, keeping it"),
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!(cluster = %self.hub, "uninstalled hub controllers");
                Ok(())
            }
        }
    }

    async fn namespace_is_empty(&self) -> Result<bool> {
        for gvr in [Gvr::pods(), Gvr::deployments(), Gvr::daemonsets()] {
            let items = self
                .store
                .list(&self.hub, &gvr, Some(&self.config.namespace), &ListOptions::limit(1))
                .await?;
            if !items.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn uninstall_member(&self, cluster: &str) -> Result<()> {
        let policy = self.member_daemonset(cluster);
        if let Err(e) = self
            .propagator
            .delete_namespaced(&policy, &self.config.namespace)
            .await
        {
            warn!(policy = %policy, error = %e, "failed to remove propagation policy");
        }
        if let Err(e) = self.propagator.delete_cluster_scoped(&policy).await {
            warn!(policy = %policy, error = %e, "failed to remove cluster propagation policy");
        }

        let mut failure = None;
        self.remove_primary(&Gvr::daemonsets(), &policy, &mut failure)
            .await;

        match self.member_objects(cluster).await {
            Ok(objects) => {
                for obj in objects.iter().filter(|o| o.kind != ObjectKind::DaemonSet) {
                    self.remove_quietly(obj).await;
                }
            }
            Err(e) => warn!(cluster, error = %e, "skipping member RBAC cleanup"),
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!(cluster, "uninstalled member controller");
                Ok(())
            }
        }
    }

    pub async fn status(&self, cluster: &str) -> Result<ControllerStatus> {
        if self.is_hub(cluster) {
            self.hub_status().await
        } else {
            self.member_status(cluster).await
        }
    }

    async fn hub_deployments(&self) -> Result<Vec<(String, Option<Value>)>> {
        let mut found = Vec::new();
        for name in [&self.config.backup_deployment, &self.config.restore_deployment] {
            let deployment = match self
                .store
                .get(&self.hub, &Gvr::deployments(), Some(&self.config.namespace), name)
                .await
            {
                Ok(d) => Some(d),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            found.push((name.clone(), deployment));
        }
        Ok(found)
    }

    async fn hub_status(&self) -> Result<ControllerStatus> {
        let deployments = self.hub_deployments().await?;
        let desired = deployments.len() as i64;
        if deployments.iter().all(|(_, d)| d.is_none()) {
            return Ok(ControllerStatus {
                desired,
                ..report(&self.hub, InstallState::NotInstalled)
            });
        }

        self.store
            .list(&self.hub, &Gvr::backups(), None, &ListOptions::limit(1))
            .await?;

        let not_ready: Vec<&str> = deployments
            .iter()
            .filter(|(_, d)| {
                d.as_ref()
                    .and_then(|d| int_at(d, &["status", "readyReplicas"]))
                    .unwrap_or(0)
                    < 1
            })
            .map(|(name, _)| name.as_str())
            .collect();
        let ready = desired - not_ready.len() as i64;
        let version = deployments
            .iter()
            .find_map(|(_, d)| d.as_ref().and_then(workload_image))
            .map_or_else(|| UNKNOWN_VERSION.to_string(), |i| version_from_image(&i));

        let (status, error) = if not_ready.is_empty() {
            (InstallState::Installed, None)
        } else {
            (
                InstallState::Partial,
                Some(format!(
                    "{} of {} controller deployments ready; not ready: {}",
                    ready,
                    desired,
                    not_ready.join(", ")
                )),
            )
        };
        Ok(ControllerStatus {
            cluster: self.hub.clone(),
            status,
            version,
            ready,
            desired,
            error,
        })
    }

    /// Per-cluster daemonset first, then the shared name used by hand-deployed installs.
    async fn find_daemonset(&self, cluster: &str) -> Result<Option<Value>> {
        for name in [self.member_daemonset(cluster), self.config.daemonset_name.clone()] {
            match self
                .store
                .get(cluster, &Gvr::daemonsets(), Some(&self.config.namespace), &name)
                .await
            {
                Ok(ds) => return Ok(Some(ds)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn member_status(&self, cluster: &str) -> Result<ControllerStatus> {
        let detail = self.inventory.get_cluster(cluster).await?;
        if !detail.ready {
            return Ok(ControllerStatus {
                error: Some(format!("cluster {} is not ready", cluster)),
                ..report(cluster, InstallState::Unknown)
            });
        }

        for gvr in [Gvr::checkpoint_backups(), Gvr::checkpoint_restores()] {
            match self
                .store
                .list(cluster, &gvr, None, &ListOptions::limit(1))
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(cluster, resource = %gvr.resource, "custom resource not served");
                    return Ok(report(cluster, InstallState::NotInstalled));
                }
                Err(e) => {
                    return Ok(ControllerStatus {
                        error: Some(e.to_string()),
                        ..report(cluster, InstallState::Error)
                    });
                }
            }
        }

        let ds = match self.find_daemonset(cluster).await {
            Ok(Some(ds)) => ds,
            Ok(None) => return Ok(report(cluster, InstallState::NotInstalled)),
            Err(e) => {
                return Ok(ControllerStatus {
                    error: Some(e.to_string()),
                    ..report(cluster, InstallState::Error)
                });
            }
        };

        let desired = int_at(&ds, &["status", "desiredNumberScheduled"]).unwrap_or(0);
        let ready = int_at(&ds, &["status", "numberReady"]).unwrap_or(0);
        let version = workload_image(&ds)
            .map_or_else(|| UNKNOWN_VERSION.to_string(), |i| version_from_image(&i));
        let (status, error) = if ready > 0 && ready >= desired {
            (InstallState::Installed, None)
        } else {
            (
                InstallState::Partial,
                Some(format!("{} of {} daemonset pods ready", ready, desired)),
            )
        };
        Ok(ControllerStatus {
            cluster: cluster.to_string(),
            status,
            version,
            ready,
            desired,
            error,
        })
    }

    pub async fn logs(&self, cluster: &str, lines: u32) -> Result<Vec<ControllerLogs>> {
        let workloads: Vec<Value> = if self.is_hub(cluster) {
            self.hub_deployments()
                .await?
                .into_iter()
                .filter_map(|(_, d)| d)
                .collect()
        } else {
            let ds = self.find_daemonset(cluster).await?.ok_or_else(|| {
                Error::not_found(format!("controller daemonset on cluster {}", cluster))
            })?;
            vec![ds]
        };

        let mut out = Vec::new();
        for workload in &workloads {
            let Some(selector) = pod_selector(workload) else {
                warn!(workload = %name_of(workload), "workload has no pod selector");
                continue;
            };
            let pods = self
                .store
                .list(cluster, &Gvr::pods(), Some(&self.config.namespace), &ListOptions::labels(selector))
                .await?;
            for pod in pods {
                let name = name_of(&pod);
                let logs = self
                    .store
                    .pod_logs(cluster, &self.config.namespace, &name, lines)
                    .await?;
                out.push(ControllerLogs { pod: name, logs });
            }
        }
        Ok(out)
    }
}

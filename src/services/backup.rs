//! Backup definitions, one `StatefulMigration` object per backup.

use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::ResourceStore;
use crate::error::{Error, Result};
use crate::helpers::{
    bool_at, int_at, label_of, lookup, now_rfc3339, set_path, str_at, string_or_default,
};
use crate::models::k8s::{
    ANNOTATION_DISPLAY_NAME, ANNOTATION_UPDATED_AT, Gvr, LABEL_BACKUP_ID, ListOptions,
    MIGRATION_GROUP, MIGRATION_VERSION, ObjectMeta,
};
use crate::models::views::{
    BackupConfiguration, CreateBackupRequest, RegistryInfo, Schedule, UpdateBackupRequest,
};

use super::new_id;
use super::registry::RegistryStore;

pub const DAILY_CRON: &str = "0 0 * * *";

const SELECTION_CRON: &[(&str, &str)] = &[
    ("5m", "*/5 * * * *"),
    ("15m", "*/15 * * * *"),
    ("30m", "*/30 * * * *"),
    ("1h", "0 * * * *"),
];

/// Expand a schedule to the cron string stored on the resource.
pub fn resolve_schedule(schedule: &Schedule) -> Result<String> {
    match schedule.schedule_type.as_str() {
        "cron" => {
            let fields = schedule.value.split_whitespace().count();
            if fields != 5 {
                return Err(Error::validation(format!(
                    "cron expression {:?} must have 5 fields, got {}",
                    schedule.value, fields
                )));
            }
            Ok(schedule.value.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        "selection" => Ok(SELECTION_CRON
            .iter()
            .find(|(token, _)| *token == schedule.value)
            .map(|(_, cron)| *cron)
            .unwrap_or(DAILY_CRON)
            .to_string()),
        other => Err(Error::validation(format!(
            "unknown schedule type {:?}, expected cron or selection",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Pod,
    StatefulSet,
}

impl ResourceType {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pod" => Ok(Self::Pod),
            "statefulset" => Ok(Self::StatefulSet),
            _ => Err(Error::validation(format!(
                "unsupported resource type {:?}, expected pod or statefulset",
                s
            ))),
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::parse(kind).ok()
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Pod => "v1",
            Self::StatefulSet => "apps/v1",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::StatefulSet => "StatefulSet",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::StatefulSet => "statefulset",
        }
    }
}

pub fn resource_name(id: &str) -> String {
    format!("backup-{}", id)
}

pub(crate) fn resource_ref(rt: ResourceType, name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": rt.api_version(),
        "kind": rt.kind(),
        "name": name,
        "namespace": namespace,
    })
}

/// Read a backup object into the canonical shape. Absent fields fall back
/// to defaults; `registry` is the already-resolved credential view.
pub(crate) fn backup_from_resource(obj: &Value, registry: RegistryInfo) -> BackupConfiguration {
    let name = string_or_default(obj, &["metadata", "name"]);
    let id = label_of(obj, LABEL_BACKUP_ID)
        .or_else(|| name.strip_prefix("backup-").map(str::to_string))
        .unwrap_or_default();
    let created = string_or_default(obj, &["metadata", "creationTimestamp"]);
    let updated = str_at(obj, &["metadata", "annotations", ANNOTATION_UPDATED_AT])
        .or_else(|| str_at(obj, &["status", "lastBackupTime"]))
        .map(str::to_string)
        .unwrap_or_else(|| created.clone());
    let kind = string_or_default(obj, &["spec", "resourceRef", "kind"]);

    BackupConfiguration {
        id,
        name: str_at(obj, &["metadata", "annotations", ANNOTATION_DISPLAY_NAME])
            .map(str::to_string)
            .unwrap_or(name),
        cluster: lookup(obj, &["spec", "sourceClusters"])
            .and_then(|c| c.get(0))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        resource_type: ResourceType::from_kind(&kind)
            .map(|rt| rt.as_str().to_string())
            .unwrap_or_else(|| kind.to_ascii_lowercase()),
        resource_name: string_or_default(obj, &["spec", "resourceRef", "name"]),
        namespace: string_or_default(obj, &["spec", "resourceRef", "namespace"]),
        registry,
        repository: string_or_default(obj, &["spec", "repository"]),
        schedule: Schedule {
            schedule_type: "cron".to_string(),
            value: string_or_default(obj, &["spec", "schedule"]),
            enabled: bool_at(obj, &["spec", "scheduleEnabled"]).unwrap_or(true),
        },
        status: str_at(obj, &["status", "phase"])
            .unwrap_or("pending")
            .to_ascii_lowercase(),
        last_execution: int_at(obj, &["spec", "executeNow"]),
        created_at: created,
        updated_at: updated,
    }
}

pub struct BackupManager {
    store: Arc<dyn ResourceStore>,
    registries: Arc<RegistryStore>,
    hub: String,
    namespace: String,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        registries: Arc<RegistryStore>,
        hub: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registries,
            hub: hub.into(),
            namespace: namespace.into(),
        }
    }

    async fn get_resource(&self, id: &str) -> Result<Value> {
        self.store
            .get(&self.hub, &Gvr::backups(), Some(&self.namespace), &resource_name(id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("backup {}", id))
                } else {
                    e
                }
            })
    }

    /// Registry lookups on the read path never fail the read.
    async fn resolve_registry(&self, obj: &Value) -> RegistryInfo {
        let url = string_or_default(obj, &["spec", "registry", "url"]);
        let Some(secret) = str_at(obj, &["spec", "registry", "secretRef", "name"]) else {
            return RegistryInfo {
                registry: url,
                ..Default::default()
            };
        };
        let Some(id) = self.registries.id_from_secret_name(secret) else {
            return RegistryInfo {
                registry: url,
                ..Default::default()
            };
        };
        match self.registries.get(id).await {
            Ok(creds) => creds.info(),
            Err(e) => {
                warn!(registry = %id, error = %e, "backup references an unreadable registry");
                RegistryInfo {
                    id: id.to_string(),
                    registry: url,
                    ..Default::default()
                }
            }
        }
    }

    async fn to_view(&self, obj: &Value) -> BackupConfiguration {
        let registry = self.resolve_registry(obj).await;
        backup_from_resource(obj, registry)
    }

    async fn write(&self, obj: &Value) -> Result<BackupConfiguration> {
        let updated = self
            .store
            .update(&self.hub, &Gvr::backups(), Some(&self.namespace), obj)
            .await?;
        Ok(self.to_view(&updated).await)
    }

    pub async fn list(&self) -> Result<Vec<BackupConfiguration>> {
        let items = self
            .store
            .list(
                &self.hub,
                &Gvr::backups(),
                Some(&self.namespace),
                &ListOptions::labels(LABEL_BACKUP_ID),
            )
            .await?;
        let mut out = Vec::with_capacity(items.len());
        for obj in &items {
            out.push(self.to_view(obj).await);
        }
        Ok(out)
    }

    pub async fn get(&self, id: &str) -> Result<BackupConfiguration> {
        let obj = self.get_resource(id).await?;
        Ok(self.to_view(&obj).await)
    }

    pub async fn create(&self, req: CreateBackupRequest) -> Result<BackupConfiguration> {
        if req.name.trim().is_empty() {
            return Err(Error::validation("backup name is required"));
        }
        if req.cluster.is_empty() || req.resource_name.is_empty() || req.namespace.is_empty() {
            return Err(Error::validation(
                "cluster, resourceName and namespace are required",
            ));
        }
        let rt = ResourceType::parse(&req.resource_type)?;
        let cron = resolve_schedule(&req.schedule)?;
        let registry = self.registries.get(&req.registry_id).await?;

        let id = new_id(&req.name);
        let meta = ObjectMeta::managed(resource_name(&id), &self.namespace)
            .with_label(LABEL_BACKUP_ID, &id)
            .with_annotation(ANNOTATION_DISPLAY_NAME, &req.name);
        let body = json!({
            "apiVersion": format!("{}/{}", MIGRATION_GROUP, MIGRATION_VERSION),
            "kind": "StatefulMigration",
            "metadata": meta,
            "spec": {
                "sourceClusters": [&req.cluster],
                "resourceRef": resource_ref(rt, &req.resource_name, &req.namespace),
                "registry": {
                    "url": &registry.registry,
                    "secretRef": {"name": self.registries.secret_name(&registry.id)},
                },
                "repository": &req.repository,
                "schedule": cron,
                "scheduleEnabled": req.schedule.enabled,
            }
        });

        let created = self
            .store
            .create(&self.hub, &Gvr::backups(), Some(&self.namespace), &body)
            .await?;
        info!(backup = %id, cluster = %req.cluster, schedule = %cron, "created backup");
        Ok(backup_from_resource(&created, registry.info()))
    }

    /// Only fields present in `req` change. Everything is validated before
    /// the resource is written.
    pub async fn update(&self, id: &str, req: UpdateBackupRequest) -> Result<BackupConfiguration> {
        let mut obj = self.get_resource(id).await?;

        let cron = req.schedule.as_ref().map(resolve_schedule).transpose()?;
        let rt = req
            .resource_type
            .as_deref()
            .map(ResourceType::parse)
            .transpose()?;
        let registry = match req.registry_id {
            Some(ref rid) => Some(self.registries.get(rid).await?),
            None => None,
        };

        if let Some(name) = req.name {
            set_path(
                &mut obj,
                &["metadata", "annotations", ANNOTATION_DISPLAY_NAME],
                Value::String(name),
            );
        }
        if let Some(cluster) = req.cluster {
            set_path(&mut obj, &["spec", "sourceClusters"], json!([cluster]));
        }
        if let Some(rt) = rt {
            set_path(
                &mut obj,
                &["spec", "resourceRef", "apiVersion"],
                Value::String(rt.api_version().to_string()),
            );
            set_path(
                &mut obj,
                &["spec", "resourceRef", "kind"],
                Value::String(rt.kind().to_string()),
            );
        }
        if let Some(name) = req.resource_name {
            set_path(&mut obj, &["spec", "resourceRef", "name"], Value::String(name));
        }
        if let Some(ns) = req.namespace {
            set_path(&mut obj, &["spec", "resourceRef", "namespace"], Value::String(ns));
        }
        if let Some(registry) = registry {
            set_path(
                &mut obj,
                &["spec", "registry"],
                json!({
                    "url": &registry.registry,
                    "secretRef": {"name": self.registries.secret_name(&registry.id)},
                }),
            );
        }
        if let Some(repository) = req.repository {
            set_path(&mut obj, &["spec", "repository"], Value::String(repository));
        }
        if let (Some(cron), Some(schedule)) = (cron, req.schedule) {
            set_path(&mut obj, &["spec", "schedule"], Value::String(cron));
            set_path(&mut obj, &["spec", "scheduleEnabled"], Value::Bool(schedule.enabled));
        }
        set_path(
            &mut obj,
            &["metadata", "annotations", ANNOTATION_UPDATED_AT],
            Value::String(now_rfc3339()),
        );

        let view = self.write(&obj).await?;
        info!(backup = %id, "updated backup");
        Ok(view)
    }

    /// Recovery records that reference this backup are left untouched.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store
            .delete(&self.hub, &Gvr::backups(), Some(&self.namespace), &resource_name(id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("backup {}", id))
                } else {
                    e
                }
            })?;
        info!(backup = %id, "deleted backup");
        Ok(())
    }

    /// Stamp `spec.executeNow`; the backup controller runs once per new stamp.
    pub async fn execute_now(&self, id: &str) -> Result<BackupConfiguration> {
        let mut obj = self.get_resource(id).await?;
        let stamp = Utc::now().timestamp();
        set_path(&mut obj, &["spec", "executeNow"], json!(stamp));
        let view = self.write(&obj).await?;
        info!(backup = %id, stamp, "requested immediate backup");
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::views::CreateRegistryRequest;

    use crate::testing::{Fixture, HUB, NS, create_backup_request as create_request, fixture};

    fn schedule(t: &str, v: &str) -> Schedule {
        Schedule {
            schedule_type: t.to_string(),
            value: v.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_selection_table() {
        assert_eq!(resolve_schedule(&schedule("selection", "5m")).unwrap(), "*/5 * * * *");
        assert_eq!(resolve_schedule(&schedule("selection", "15m")).unwrap(), "*/15 * * * *");
        assert_eq!(resolve_schedule(&schedule("selection", "30m")).unwrap(), "*/30 * * * *");
        assert_eq!(resolve_schedule(&schedule("selection", "1h")).unwrap(), "0 * * * *");
        assert_eq!(resolve_schedule(&schedule("selection", "daily")).unwrap(), DAILY_CRON);
        assert_eq!(resolve_schedule(&schedule("selection", "")).unwrap(), DAILY_CRON);
    }

    #[test]
    fn test_cron_field_count() {
        assert_eq!(
            resolve_schedule(&schedule("cron", " 0  2 * * 1 ")).unwrap(),
            "0 2 * * 1"
        );
        assert!(resolve_schedule(&schedule("cron", "0 2 * *")).is_err());
        assert!(resolve_schedule(&schedule("cron", "0 0 2 * * 1")).is_err());
        assert!(resolve_schedule(&schedule("weekly", "x")).is_err());
    }

    #[tokio::test]
    async fn test_create_writes_resource() {
        let Fixture { fake, registries, backups, registry_id: reg_id } = fixture().await;
        let created = backups.create(create_request(&reg_id)).await.unwrap();

        assert!(created.id.starts_with("web-db-"));
        assert_eq!(created.schedule.value, "*/15 * * * *");
        assert_eq!(created.registry.registry, "harbor.example.com");
        assert_eq!(created.resource_type, "statefulset");

        let obj = fake
            .object(HUB, &Gvr::backups(), Some(NS), &resource_name(&created.id))
            .unwrap();
        assert_eq!(obj["spec"]["resourceRef"]["apiVersion"], "apps/v1");
        assert_eq!(obj["spec"]["resourceRef"]["kind"], "StatefulSet");
        assert_eq!(obj["spec"]["sourceClusters"], json!(["member-1"]));
        assert_eq!(
            obj["spec"]["registry"]["secretRef"]["name"],
            registries.secret_name(&reg_id)
        );
        assert_eq!(obj["metadata"]["labels"][LABEL_BACKUP_ID], created.id);
    }

    #[tokio::test]
    async fn test_invalid_cron_writes_nothing() {
        let Fixture { fake, registries: _, backups, registry_id: reg_id } = fixture().await;
        let mut req = create_request(&reg_id);
        req.schedule = schedule("cron", "*/5 * * *");
        let before = fake.create_calls();

        assert!(matches!(
            backups.create(req).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(fake.create_calls(), before);
        assert_eq!(fake.count(HUB, &Gvr::backups()), 0);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let Fixture { fake, registries: _, backups, registry_id: _ } = fixture().await;
        let req = CreateBackupRequest::default();
        assert_eq!(req.schedule.value, "");
        assert!(matches!(backups.create(req).await, Err(Error::Validation(_))));
        assert_eq!(fake.count(HUB, &Gvr::backups()), 0);
    }

    #[tokio::test]
    async fn test_unknown_registry_is_not_found() {
        let Fixture { fake, registries: _, backups, registry_id: _ } = fixture().await;
        let err = backups.create(create_request("missing")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fake.count(HUB, &Gvr::backups()), 0);
    }

    #[tokio::test]
    async fn test_pod_resource_uses_core_api_version() {
        let Fixture { fake, registries: _, backups, registry_id: reg_id } = fixture().await;
        let mut req = create_request(&reg_id);
        req.resource_type = "pod".to_string();
        let created = backups.create(req).await.unwrap();
        let obj = fake
            .object(HUB, &Gvr::backups(), Some(NS), &resource_name(&created.id))
            .unwrap();
        assert_eq!(obj["spec"]["resourceRef"]["apiVersion"], "v1");
    }

    #[tokio::test]
    async fn test_sparse_update() {
        let Fixture { fake: _, registries: _, backups, registry_id: reg_id } = fixture().await;
        let created = backups.create(create_request(&reg_id)).await.unwrap();

        let updated = backups
            .update(
                &created.id,
                UpdateBackupRequest {
                    repository: Some("backups/web-v2".to_string()),
                    schedule: Some(schedule("selection", "1h")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.repository, "backups/web-v2");
        assert_eq!(updated.schedule.value, "0 * * * *");
        assert_eq!(updated.schedule.schedule_type, "cron");
        assert_eq!(updated.resource_name, "web");
        assert_eq!(updated.cluster, "member-1");
        assert_eq!(updated.name, "web db");
    }

    #[tokio::test]
    async fn test_update_registry_reresolves_secret() {
        let Fixture { fake, registries, backups, registry_id: reg_id } = fixture().await;
        let created = backups.create(create_request(&reg_id)).await.unwrap();
        let other = registries
            .create(CreateRegistryRequest {
                name: "quay".to_string(),
                registry: "quay.io".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        let updated = backups
            .update(
                &created.id,
                UpdateBackupRequest {
                    registry_id: Some(other.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.registry.registry, "quay.io");
        assert_eq!(updated.registry.id, other.id);

        let obj = fake
            .object(HUB, &Gvr::backups(), Some(NS), &resource_name(&created.id))
            .unwrap();
        assert_eq!(obj["spec"]["registry"]["url"], "quay.io");
    }

    #[tokio::test]
    async fn test_execute_now_stamps_spec() {
        let Fixture { fake, registries: _, backups, registry_id: reg_id } = fixture().await;
        let created = backups.create(create_request(&reg_id)).await.unwrap();

        let view = backups.execute_now(&created.id).await.unwrap();
        assert!(view.last_execution.is_some());
        backups.execute_now(&created.id).await.unwrap();

        assert_eq!(fake.count(HUB, &Gvr::backups()), 1);
        let obj = fake
            .object(HUB, &Gvr::backups(), Some(NS), &resource_name(&created.id))
            .unwrap();
        assert!(obj["spec"]["executeNow"].as_i64().is_some());
    }

    #[test]
    fn test_read_path_tolerates_missing_fields() {
        let obj = json!({
            "metadata": {"name": "backup-legacy-1", "creationTimestamp": "2026-01-01T00:00:00Z"},
            "spec": {"resourceRef": {"kind": "Pod", "name": "p"}}
        });
        let b = backup_from_resource(&obj, RegistryInfo::default());
        assert_eq!(b.id, "legacy-1");
        assert_eq!(b.name, "backup-legacy-1");
        assert_eq!(b.resource_type, "pod");
        assert_eq!(b.cluster, "");
        assert_eq!(b.status, "pending");
        assert_eq!(b.updated_at, "2026-01-01T00:00:00Z");
        assert!(b.schedule.enabled);
    }

    #[tokio::test]
    async fn test_missing_registry_secret_ref_reads_partially() {
        let Fixture { fake, registries: _, backups, registry_id: _ } = fixture().await;
        fake.insert(
            HUB,
            &Gvr::backups(),
            Some(NS),
            json!({
                "metadata": {"name": "backup-old-1", "labels": {LABEL_BACKUP_ID: "old-1"}},
                "spec": {"registry": {"url": "r.io"}, "schedule": "0 0 * * *"}
            }),
        );
        let b = backups.get("old-1").await.unwrap();
        assert_eq!(b.registry.registry, "r.io");
        assert_eq!(b.registry.id, "");
        assert_eq!(backups.list().await.unwrap().len(), 1);
    }
}

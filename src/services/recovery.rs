//! Recovery records and their pending → running → terminal lifecycle.
//!
//! The orchestrator only moves a record into `running` or `cancelled`.
//! `completed` and `failed` are written by the recovery controller.

use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::clients::ResourceStore;
use crate::error::{Error, Result};
use crate::helpers::{
    int_at, label_of, lookup, name_of, now_rfc3339, set_path, str_at, string_or_default,
};
use crate::models::k8s::{
    ANNOTATION_DISPLAY_NAME, Gvr, LABEL_BACKUP_ID, LABEL_RECOVERY_ID, ListOptions,
    MIGRATION_GROUP, MIGRATION_VERSION, ObjectMeta,
};
use crate::models::views::{
    CreateRecoveryRequest, RecoveryPhase, RecoveryRecord, UpdateRecoveryRequest,
};

use super::backup::{BackupManager, ResourceType, resource_ref};
use super::new_id;
use super::registry::RegistryStore;

pub fn resource_name(id: &str) -> String {
    format!("recovery-{}", id)
}

fn validate_recovery_type(t: &str) -> Result<()> {
    match t {
        "restore" | "migrate" => Ok(()),
        other => Err(Error::validation(format!(
            "unsupported recovery type {:?}, expected restore or migrate",
            other
        ))),
    }
}

fn phase_of(obj: &Value) -> RecoveryPhase {
    str_at(obj, &["status", "phase"])
        .and_then(RecoveryPhase::parse)
        .or_else(|| str_at(obj, &["spec", "phase"]).and_then(RecoveryPhase::parse))
        .unwrap_or(RecoveryPhase::Pending)
}

pub(crate) fn recovery_from_resource(obj: &Value) -> RecoveryRecord {
    let name = name_of(obj);
    let status = phase_of(obj);
    let error = str_at(obj, &["status", "error"])
        .or_else(|| match status {
            RecoveryPhase::Failed => str_at(obj, &["status", "message"]),
            _ => None,
        })
        .map(str::to_string);

    RecoveryRecord {
        id: label_of(obj, LABEL_RECOVERY_ID)
            .or_else(|| name.strip_prefix("recovery-").map(str::to_string))
            .unwrap_or_default(),
        name: str_at(obj, &["metadata", "annotations", ANNOTATION_DISPLAY_NAME])
            .map(str::to_string)
            .unwrap_or(name),
        backup_id: string_or_default(obj, &["spec", "backupRef", "id"]),
        backup_name: string_or_default(obj, &["spec", "backupRef", "name"]),
        source_cluster: string_or_default(obj, &["spec", "sourceCluster"]),
        target_cluster: string_or_default(obj, &["spec", "targetCluster"]),
        resource_type: str_at(obj, &["spec", "resourceRef", "kind"])
            .map(|kind| {
                ResourceType::from_kind(kind)
                    .map(|rt| rt.as_str().to_string())
                    .unwrap_or_else(|| kind.to_ascii_lowercase())
            })
            .unwrap_or_default(),
        resource_name: string_or_default(obj, &["spec", "resourceRef", "name"]),
        namespace: string_or_default(obj, &["spec", "resourceRef", "namespace"]),
        target_name: string_or_default(obj, &["spec", "targetName"]),
        target_namespace: string_or_default(obj, &["spec", "targetNamespace"]),
        recovery_type: str_at(obj, &["spec", "recoveryType"])
            .unwrap_or("restore")
            .to_string(),
        image_repository: string_or_default(obj, &["spec", "imageRepository"]),
        status,
        progress: int_at(obj, &["status", "progress"]).unwrap_or(0).clamp(0, 100),
        error,
        started_at: str_at(obj, &["status", "startedAt"]).map(str::to_string),
        completed_at: str_at(obj, &["status", "completedAt"]).map(str::to_string),
        created_at: string_or_default(obj, &["metadata", "creationTimestamp"]),
    }
}

pub struct RecoveryOrchestrator {
    store: Arc<dyn ResourceStore>,
    backups: Arc<BackupManager>,
    registries: Arc<RegistryStore>,
    hub: String,
    namespace: String,
}

impl RecoveryOrchestrator {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        backups: Arc<BackupManager>,
        registries: Arc<RegistryStore>,
        hub: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backups,
            registries,
            hub: hub.into(),
            namespace: namespace.into(),
        }
    }

    async fn get_resource(&self, id: &str) -> Result<Value> {
        self.store
            .get(&self.hub, &Gvr::recoveries(), Some(&self.namespace), &resource_name(id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("recovery {}", id))
                } else {
                    e
                }
            })
    }

    async fn write(&self, obj: &Value) -> Result<RecoveryRecord> {
        let updated = self
            .store
            .update(&self.hub, &Gvr::recoveries(), Some(&self.namespace), obj)
            .await?;
        Ok(recovery_from_resource(&updated))
    }

    pub async fn list(&self) -> Result<Vec<RecoveryRecord>> {
        let items = self
            .store
            .list(
                &self.hub,
                &Gvr::recoveries(),
                Some(&self.namespace),
                &ListOptions::labels(LABEL_RECOVERY_ID),
            )
            .await?;
        Ok(items.iter().map(recovery_from_resource).collect())
    }

    pub async fn get(&self, id: &str) -> Result<RecoveryRecord> {
        Ok(recovery_from_resource(&self.get_resource(id).await?))
    }

    /// Copies the backup's resource and registry details into the record;
    /// later edits to the backup do not reach existing records.
    pub async fn create(&self, req: CreateRecoveryRequest) -> Result<RecoveryRecord> {
        if req.name.trim().is_empty() {
            return Err(Error::validation("recovery name is required"));
        }
        if req.target_cluster.is_empty() {
            return Err(Error::validation("targetCluster is required"));
        }
        validate_recovery_type(&req.recovery_type)?;

        let backup = self.backups.get(&req.backup_id).await?;
        let target_name = req
            .target_name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| backup.resource_name.clone());
        let target_namespace = req
            .target_namespace
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| backup.namespace.clone());
        let image_repository = format!("{}/{}", backup.registry.registry, backup.repository);
        let secret_ref = if backup.registry.id.is_empty() {
            Value::Null
        } else {
            json!({"name": self.registries.secret_name(&backup.registry.id)})
        };

        // Backups written before the kind was recorded carry it through as-is.
        let source_ref = match ResourceType::from_kind(&backup.resource_type) {
            Some(rt) => resource_ref(rt, &backup.resource_name, &backup.namespace),
            None => json!({
                "kind": &backup.resource_type,
                "name": &backup.resource_name,
                "namespace": &backup.namespace,
            }),
        };

        let id = new_id(&req.name);
        let meta = ObjectMeta::managed(resource_name(&id), &self.namespace)
            .with_label(LABEL_RECOVERY_ID, &id)
            .with_label(LABEL_BACKUP_ID, &backup.id)
            .with_annotation(ANNOTATION_DISPLAY_NAME, &req.name);
        let body = json!({
            "apiVersion": format!("{}/{}", MIGRATION_GROUP, MIGRATION_VERSION),
            "kind": "MigrationRecovery",
            "metadata": meta,
            "spec": {
                "backupRef": {"id": &backup.id, "name": &backup.name},
                "sourceCluster": &backup.cluster,
                "targetCluster": &req.target_cluster,
                "resourceRef": source_ref,
                "targetName": target_name,
                "targetNamespace": target_namespace,
                "recoveryType": &req.recovery_type,
                "imageRepository": image_repository,
                "registry": {
                    "url": &backup.registry.registry,
                    "secretRef": secret_ref,
                },
                "phase": RecoveryPhase::Pending.as_str(),
            }
        });

        let created = self
            .store
            .create(&self.hub, &Gvr::recoveries(), Some(&self.namespace), &body)
            .await?;
        info!(recovery = %id, backup = %backup.id, target = %req.target_cluster, "created recovery");
        Ok(recovery_from_resource(&created))
    }

    /// Only target-side fields are editable; the source snapshot is fixed.
    pub async fn update(&self, id: &str, req: UpdateRecoveryRequest) -> Result<RecoveryRecord> {
        if let Some(ref t) = req.recovery_type {
            validate_recovery_type(t)?;
        }
        let mut obj = self.get_resource(id).await?;

        if let Some(name) = req.name {
            set_path(
                &mut obj,
                &["metadata", "annotations", ANNOTATION_DISPLAY_NAME],
                Value::String(name),
            );
        }
        let fields = [
            ("targetCluster", req.target_cluster),
            ("targetName", req.target_name),
            ("targetNamespace", req.target_namespace),
            ("recoveryType", req.recovery_type),
        ];
        for (field, value) in fields {
            if let Some(v) = value {
                set_path(&mut obj, &["spec", field], Value::String(v));
            }
        }

        self.write(&obj).await
    }

    /// Signal the controller to start; any status from an earlier run is replaced.
    pub async fn execute(&self, id: &str) -> Result<RecoveryRecord> {
        let mut obj = self.get_resource(id).await?;
        if lookup(&obj, &["spec"]).is_none_or(|s| !s.is_object()) {
            return Err(Error::malformed(resource_name(id), "recovery resource has no spec"));
        }

        set_path(&mut obj, &["spec", "executeNow"], json!(Utc::now().timestamp()));
        set_path(
            &mut obj,
            &["spec", "phase"],
            json!(RecoveryPhase::Running.as_str()),
        );
        set_path(
            &mut obj,
            &["status"],
            json!({
                "phase": RecoveryPhase::Running.as_str(),
                "startedAt": now_rfc3339(),
                "progress": 0,
            }),
        );

        let record = self.write(&obj).await?;
        info!(recovery = %id, "recovery started");
        Ok(record)
    }

    /// Bookkeeping only; the state is not checked, so a terminal record can be
    /// overwritten as cancelled.
    pub async fn cancel(&self, id: &str) -> Result<RecoveryRecord> {
        let mut obj = self.get_resource(id).await?;
        if lookup(&obj, &["spec"]).is_none_or(|s| !s.is_object()) {
            return Err(Error::malformed(resource_name(id), "recovery resource has no spec"));
        }

        set_path(
            &mut obj,
            &["spec", "phase"],
            json!(RecoveryPhase::Cancelled.as_str()),
        );
        set_path(
            &mut obj,
            &["status"],
            json!({
                "phase": RecoveryPhase::Cancelled.as_str(),
                "completedAt": now_rfc3339(),
            }),
        );

        let record = self.write(&obj).await?;
        info!(recovery = %id, "recovery cancelled");
        Ok(record)
    }

    /// Deletes in any state; in-flight work is not stopped.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store
            .delete(&self.hub, &Gvr::recoveries(), Some(&self.namespace), &resource_name(id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("recovery {}", id))
                } else {
                    e
                }
            })?;
        info!(recovery = %id, "deleted recovery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::views::UpdateBackupRequest;
    use crate::testing::{HUB, NS, create_backup_request, fixture};

    fn recovery_request(backup_id: &str) -> CreateRecoveryRequest {
        CreateRecoveryRequest {
            name: "restore web".to_string(),
            backup_id: backup_id.to_string(),
            target_cluster: "member-2".to_string(),
            target_name: None,
            target_namespace: None,
            recovery_type: "restore".to_string(),
        }
    }

    async fn setup() -> (
        Arc<crate::testing::FakeStore>,
        Arc<BackupManager>,
        RecoveryOrchestrator,
        String,
    ) {
        let f = fixture().await;
        let backup = f
            .backups
            .create(create_backup_request(&f.registry_id))
            .await
            .unwrap();
        let store: Arc<dyn ResourceStore> = f.fake.clone();
        let recoveries =
            RecoveryOrchestrator::new(store, f.backups.clone(), f.registries.clone(), HUB, NS);
        (f.fake, f.backups, recoveries, backup.id)
    }

    #[tokio::test]
    async fn test_create_defaults_target_to_backup_resource() {
        let (fake, _, recoveries, backup_id) = setup().await;
        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();

        assert_eq!(r.status, RecoveryPhase::Pending);
        assert_eq!(r.backup_id, backup_id);
        assert_eq!(r.backup_name, "web db");
        assert_eq!(r.source_cluster, "member-1");
        assert_eq!(r.target_cluster, "member-2");
        assert_eq!(r.target_name, "web");
        assert_eq!(r.target_namespace, "shop");
        assert_eq!(r.image_repository, "harbor.example.com/backups/web");
        assert!(fake
            .object(HUB, &Gvr::recoveries(), Some(NS), &resource_name(&r.id))
            .is_some());
    }

    #[tokio::test]
    async fn test_create_with_overrides() {
        let (_, _, recoveries, backup_id) = setup().await;
        let mut req = recovery_request(&backup_id);
        req.target_name = Some("web-restored".to_string());
        req.target_namespace = Some("shop-dr".to_string());
        req.recovery_type = "migrate".to_string();
        let r = recoveries.create(req).await.unwrap();
        assert_eq!(r.target_name, "web-restored");
        assert_eq!(r.target_namespace, "shop-dr");
        assert_eq!(r.recovery_type, "migrate");
    }

    #[tokio::test]
    async fn test_create_requires_existing_backup() {
        let (fake, _, recoveries, _) = setup().await;
        let err = recoveries
            .create(recovery_request("no-such-backup"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fake.count(HUB, &Gvr::recoveries()), 0);
    }

    #[tokio::test]
    async fn test_create_from_backup_without_kind() {
        let (fake, _, recoveries, backup_id) = setup().await;
        let name = crate::services::backup::resource_name(&backup_id);
        let mut legacy = fake.object(HUB, &Gvr::backups(), Some(NS), &name).unwrap();
        legacy["spec"]["resourceRef"]
            .as_object_mut()
            .unwrap()
            .retain(|k, _| k != "kind" && k != "apiVersion");
        fake.insert(HUB, &Gvr::backups(), Some(NS), legacy);

        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();
        assert_eq!(r.resource_type, "");
        assert_eq!(r.resource_name, "web");
        assert_eq!(r.target_name, "web");
        let stored = fake
            .object(HUB, &Gvr::recoveries(), Some(NS), &resource_name(&r.id))
            .unwrap();
        assert_eq!(stored["spec"]["resourceRef"]["name"], "web");
        assert!(stored["spec"]["resourceRef"].get("apiVersion").is_none());
    }

    #[tokio::test]
    async fn test_backup_update_does_not_change_recovery() {
        let (_, backups, recoveries, backup_id) = setup().await;
        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();

        backups
            .update(
                &backup_id,
                UpdateBackupRequest {
                    resource_name: Some("web-v2".to_string()),
                    namespace: Some("shop-v2".to_string()),
                    repository: Some("other/repo".to_string()),
                    cluster: Some("member-9".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let after = recoveries.get(&r.id).await.unwrap();
        assert_eq!(after, r);
    }

    #[tokio::test]
    async fn test_backup_delete_leaves_recoveries() {
        let (fake, backups, recoveries, backup_id) = setup().await;
        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();
        let before = fake
            .object(HUB, &Gvr::recoveries(), Some(NS), &resource_name(&r.id))
            .unwrap();

        backups.delete(&backup_id).await.unwrap();

        let after = fake
            .object(HUB, &Gvr::recoveries(), Some(NS), &resource_name(&r.id))
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(recoveries.get(&r.id).await.unwrap().backup_id, backup_id);
    }

    #[tokio::test]
    async fn test_execute_replaces_status() {
        let (fake, _, recoveries, backup_id) = setup().await;
        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();
        let name = resource_name(&r.id);

        let mut obj = fake.object(HUB, &Gvr::recoveries(), Some(NS), &name).unwrap();
        obj["status"] = json!({"phase": "failed", "progress": 70, "error": "disk full"});
        fake.insert(HUB, &Gvr::recoveries(), Some(NS), obj);

        let running = recoveries.execute(&r.id).await.unwrap();
        assert_eq!(running.status, RecoveryPhase::Running);
        assert_eq!(running.progress, 0);
        assert!(running.error.is_none());
        assert!(running.started_at.is_some());

        let obj = fake.object(HUB, &Gvr::recoveries(), Some(NS), &name).unwrap();
        assert_eq!(obj["spec"]["phase"], "running");
        assert!(obj["spec"]["executeNow"].as_i64().is_some());
        assert!(obj["status"].get("error").is_none());
    }

    #[tokio::test]
    async fn test_execute_without_spec_is_structured_error() {
        let (fake, _, recoveries, _) = setup().await;
        fake.insert(
            HUB,
            &Gvr::recoveries(),
            Some(NS),
            json!({"metadata": {"name": "recovery-bare-1", "labels": {LABEL_RECOVERY_ID: "bare-1"}}}),
        );
        assert!(matches!(
            recoveries.execute("bare-1").await,
            Err(Error::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_permissive() {
        let (fake, _, recoveries, backup_id) = setup().await;
        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();
        let name = resource_name(&r.id);

        let mut obj = fake.object(HUB, &Gvr::recoveries(), Some(NS), &name).unwrap();
        obj["status"] = json!({"phase": "completed", "progress": 100});
        fake.insert(HUB, &Gvr::recoveries(), Some(NS), obj);

        let cancelled = recoveries.cancel(&r.id).await.unwrap();
        assert_eq!(cancelled.status, RecoveryPhase::Cancelled);
        assert!(cancelled.completed_at.is_some());
        assert_eq!(cancelled.progress, 0);
    }

    #[test]
    fn test_controller_written_failure_surfaces_error() {
        let obj = json!({
            "metadata": {"name": "recovery-x-1"},
            "spec": {"phase": "running"},
            "status": {"phase": "Failed", "message": "image pull failed", "progress": "40"}
        });
        let r = recovery_from_resource(&obj);
        assert_eq!(r.id, "x-1");
        assert_eq!(r.status, RecoveryPhase::Failed);
        assert_eq!(r.error.as_deref(), Some("image pull failed"));
        assert_eq!(r.progress, 40);
    }

    #[tokio::test]
    async fn test_update_and_delete_in_any_state() {
        let (fake, _, recoveries, backup_id) = setup().await;
        let r = recoveries.create(recovery_request(&backup_id)).await.unwrap();
        recoveries.execute(&r.id).await.unwrap();

        let updated = recoveries
            .update(
                &r.id,
                UpdateRecoveryRequest {
                    target_cluster: Some("member-3".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.target_cluster, "member-3");
        assert_eq!(updated.source_cluster, "member-1");

        assert!(recoveries
            .update(
                &r.id,
                UpdateRecoveryRequest {
                    recovery_type: Some("teleport".to_string()),
                    ..Default::default()
                },
            )
            .await
            .is_err());

        recoveries.delete(&r.id).await.unwrap();
        assert_eq!(fake.count(HUB, &Gvr::recoveries()), 0);
        assert!(recoveries.get(&r.id).await.unwrap_err().is_not_found());
    }
}

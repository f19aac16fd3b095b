use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::Result;
use crate::models::views::*;

const DEFAULT_LOG_LINES: u32 = 100;
const MAX_LOG_LINES: u32 = 10_000;

// --- backups ---

pub async fn handle_list_backups(
    State(state): State<AppState>,
) -> Result<Json<Vec<BackupConfiguration>>> {
    Ok(Json(state.backups.list().await?))
}

pub async fn handle_get_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BackupConfiguration>> {
    Ok(Json(state.backups.get(&id).await?))
}

pub async fn handle_create_backup(
    State(state): State<AppState>,
    Json(req): Json<CreateBackupRequest>,
) -> Result<impl IntoResponse> {
    let backup = state.backups.create(req).await?;
    Ok((StatusCode::CREATED, Json(backup)))
}

pub async fn handle_update_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBackupRequest>,
) -> Result<Json<BackupConfiguration>> {
    Ok(Json(state.backups.update(&id, req).await?))
}

pub async fn handle_delete_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.backups.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_execute_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BackupConfiguration>> {
    Ok(Json(state.backups.execute_now(&id).await?))
}

// --- recoveries ---

pub async fn handle_list_recoveries(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecoveryRecord>>> {
    Ok(Json(state.recoveries.list().await?))
}

pub async fn handle_get_recovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecoveryRecord>> {
    Ok(Json(state.recoveries.get(&id).await?))
}

pub async fn handle_create_recovery(
    State(state): State<AppState>,
    Json(req): Json<CreateRecoveryRequest>,
) -> Result<impl IntoResponse> {
    let recovery = state.recoveries.create(req).await?;
    Ok((StatusCode::CREATED, Json(recovery)))
}

pub async fn handle_update_recovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRecoveryRequest>,
) -> Result<Json<RecoveryRecord>> {
    Ok(Json(state.recoveries.update(&id, req).await?))
}

pub async fn handle_execute_recovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecoveryRecord>> {
    Ok(Json(state.recoveries.execute(&id).await?))
}

pub async fn handle_cancel_recovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecoveryRecord>> {
    Ok(Json(state.recoveries.cancel(&id).await?))
}

pub async fn handle_delete_recovery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.recoveries.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- registries ---

#[derive(Debug, Deserialize)]
pub struct PropagateRequest {
    pub clusters: Vec<String>,
}

pub async fn handle_list_registries(
    State(state): State<AppState>,
) -> Result<Json<Vec<RegistryCredentials>>> {
    Ok(Json(state.registries.list().await?))
}

pub async fn handle_get_registry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RegistryCredentials>> {
    Ok(Json(state.registries.get(&id).await?))
}

pub async fn handle_create_registry(
    State(state): State<AppState>,
    Json(req): Json<CreateRegistryRequest>,
) -> Result<impl IntoResponse> {
    let registry = state.registries.create(req).await?;
    Ok((StatusCode::CREATED, Json(registry)))
}

pub async fn handle_update_registry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRegistryRequest>,
) -> Result<Json<RegistryCredentials>> {
    Ok(Json(state.registries.update(&id, req).await?))
}

pub async fn handle_delete_registry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.registries.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_propagate_registry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PropagateRequest>,
) -> Result<StatusCode> {
    state.registries.propagate(&id, &req.clusters).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- clusters ---

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<u32>,
}

pub async fn handle_list_clusters(State(state): State<AppState>) -> Result<Json<Vec<ClusterInfo>>> {
    Ok(Json(state.clusters.list().await?))
}

pub async fn handle_get_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClusterInfo>> {
    Ok(Json(state.clusters.get(&name).await?))
}

pub async fn handle_controller_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ControllerStatus>> {
    Ok(Json(state.lifecycle.status(&name).await?))
}

pub async fn handle_install_controller(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InstallRequest>,
) -> Result<Json<ControllerStatus>> {
    state.lifecycle.install(&name, &req.version).await?;
    Ok(Json(state.lifecycle.status(&name).await?))
}

pub async fn handle_uninstall_controller(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    state.lifecycle.uninstall(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_controller_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<Vec<ControllerLogs>>> {
    let lines = q.lines.unwrap_or(DEFAULT_LOG_LINES).clamp(1, MAX_LOG_LINES);
    Ok(Json(state.lifecycle.logs(&name, lines).await?))
}

// --- checkpoint-restore events ---

pub async fn handle_list_checkpoint_restores(
    State(state): State<AppState>,
) -> Result<Json<Vec<CheckpointRestoreEvent>>> {
    Ok(Json(state.events.list().await?))
}

pub async fn handle_healthz() -> &'static str {
    "ok\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ResourceStore;
    use crate::clients::aggregator::Aggregator;
    use crate::clients::inventory::ClusterInventory;
    use crate::clients::manifest::MockManifestFetcher;
    use crate::clients::propagation::Propagator;
    use crate::config::Config;
    use crate::error::Error;
    use crate::services::clusters::ClusterView;
    use crate::services::events::EventNormalizer;
    use crate::services::lifecycle::LifecycleManager;
    use crate::services::recovery::RecoveryOrchestrator;
    use crate::testing::{FakeInventory, HUB, NS, create_backup_request, fixture};
    use std::sync::Arc;

    async fn state() -> (AppState, String) {
        let f = fixture().await;
        let config = Config::default();
        let store: Arc<dyn ResourceStore> = f.fake.clone();
        let inventory: Arc<dyn ClusterInventory> = Arc::new(FakeInventory::new(&[("member-1", true)]));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            inventory.clone(),
            Arc::new(MockManifestFetcher::new()),
            Arc::new(Propagator::new(store.clone(), HUB)),
            HUB,
            config.controller.clone(),
        ));
        let state = AppState {
            recoveries: Arc::new(RecoveryOrchestrator::new(
                store.clone(),
                f.backups.clone(),
                f.registries.clone(),
                HUB,
                NS,
            )),
            events: Arc::new(EventNormalizer::new(
                store.clone(),
                Arc::new(Aggregator::new(inventory.clone())),
                &config.checkpoint_restore,
            )),
            clusters: Arc::new(ClusterView::new(store, inventory, lifecycle.clone(), HUB)),
            lifecycle,
            backups: f.backups,
            registries: f.registries,
        };
        (state, f.registry_id)
    }

    #[tokio::test]
    async fn test_create_backup_returns_created() {
        let (state, registry_id) = state().await;
        let resp = handle_create_backup(State(state), Json(create_backup_request(&registry_id)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_missing_backup_maps_to_404() {
        let (state, _) = state().await;
        let resp = handle_get_backup(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_schedule_maps_to_400() {
        let (state, registry_id) = state().await;
        let mut req = create_backup_request(&registry_id);
        req.schedule.schedule_type = "cron".to_string();
        req.schedule.value = "* * *".to_string();
        let err = handle_create_backup(State(state), Json(req)).await.err().unwrap();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_controller_status_of_empty_hub() {
        let (state, _) = state().await;
        let Json(status) = handle_controller_status(State(state), Path(HUB.to_string()))
            .await
            .unwrap();
        assert_eq!(status.status, InstallState::NotInstalled);
    }
}

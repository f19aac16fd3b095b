pub mod api;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Backups
        .route(
            "/api/v1/backups",
            get(api::handle_list_backups).post(api::handle_create_backup),
        )
        .route(
            "/api/v1/backups/{id}",
            get(api::handle_get_backup)
                .put(api::handle_update_backup)
                .delete(api::handle_delete_backup),
        )
        .route("/api/v1/backups/{id}/execute", post(api::handle_execute_backup))
        // Recoveries
        .route(
            "/api/v1/recoveries",
            get(api::handle_list_recoveries).post(api::handle_create_recovery),
        )
        .route(
            "/api/v1/recoveries/{id}",
            get(api::handle_get_recovery)
                .put(api::handle_update_recovery)
                .delete(api::handle_delete_recovery),
        )
        .route("/api/v1/recoveries/{id}/execute", post(api::handle_execute_recovery))
        .route("/api/v1/recoveries/{id}/cancel", post(api::handle_cancel_recovery))
        // Registry credentials
        .route(
            "/api/v1/registries",
            get(api::handle_list_registries).post(api::handle_create_registry),
        )
        .route(
            "/api/v1/registries/{id}",
            get(api::handle_get_registry)
                .put(api::handle_update_registry)
                .delete(api::handle_delete_registry),
        )
        .route(
            "/api/v1/registries/{id}/propagate",
            post(api::handle_propagate_registry),
        )
        // Clusters and controllers
        .route("/api/v1/clusters", get(api::handle_list_clusters))
        .route("/api/v1/clusters/{name}", get(api::handle_get_cluster))
        .route(
            "/api/v1/clusters/{name}/controller",
            get(api::handle_controller_status)
                .post(api::handle_install_controller)
                .delete(api::handle_uninstall_controller),
        )
        .route(
            "/api/v1/clusters/{name}/controller/logs",
            get(api::handle_controller_logs),
        )
        // Checkpoint-restore events
        .route("/api/v1/checkpoint-restores", get(api::handle_list_checkpoint_restores))
        // Health
        .route("/healthz", get(api::handle_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

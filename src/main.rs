mod clients;
mod config;
mod error;
mod helpers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clients::aggregator::Aggregator;
use clients::inventory::{ClusterInventory, HubInventory};
use clients::manifest::{HttpManifestFetcher, ManifestFetcher};
use clients::propagation::Propagator;
use clients::{KubeClient, ResourceStore};
use services::backup::BackupManager;
use services::clusters::ClusterView;
use services::events::EventNormalizer;
use services::lifecycle::LifecycleManager;
use services::recovery::RecoveryOrchestrator;
use services::registry::RegistryStore;

#[derive(Clone)]
pub struct AppState {
    pub backups: Arc<BackupManager>,
    pub recoveries: Arc<RecoveryOrchestrator>,
    pub registries: Arc<RegistryStore>,
    pub events: Arc<EventNormalizer>,
    pub lifecycle: Arc<LifecycleManager>,
    pub clusters: Arc<ClusterView>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleet_backup=info")),
        )
        .init();

    let config_path = std::env::args()
        .skip(1)
        .zip(std::env::args().skip(2))
        .find_map(|(k, v)| {
            if k == "-config" || k == "--config" {
                Some(v)
            } else {
                None
            }
        })
        .or_else(|| std::env::args().nth(1).filter(|a| !a.starts_with('-')))
        .unwrap_or_else(|| "/etc/fleet-backup/config.yaml".to_string());

    let cfg = config::Config::load(&PathBuf::from(&config_path)).unwrap_or_else(|e| {
        eprintln!("error loading config: {}", e);
        std::process::exit(1);
    });

    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    let kube = KubeClient::new(&cfg.hub, timeout).unwrap_or_else(|e| {
        eprintln!("error creating cluster client: {}", e);
        std::process::exit(1);
    });
    let fetcher: Arc<dyn ManifestFetcher> =
        Arc::new(HttpManifestFetcher::new(timeout).unwrap_or_else(|e| {
            eprintln!("error creating manifest client: {}", e);
            std::process::exit(1);
        }));

    let hub = cfg.hub.name.clone();
    let store: Arc<dyn ResourceStore> = Arc::new(kube);
    let inventory: Arc<dyn ClusterInventory> = Arc::new(HubInventory::new(store.clone(), &hub));
    let propagator = Arc::new(Propagator::new(store.clone(), &hub));

    let registries = Arc::new(RegistryStore::new(
        store.clone(),
        propagator.clone(),
        &hub,
        &cfg.backup.namespace,
        &cfg.backup.registry_secret_prefix,
    ));
    let backups = Arc::new(BackupManager::new(
        store.clone(),
        registries.clone(),
        &hub,
        &cfg.backup.namespace,
    ));
    let recoveries = Arc::new(RecoveryOrchestrator::new(
        store.clone(),
        backups.clone(),
        registries.clone(),
        &hub,
        &cfg.backup.namespace,
    ));
    let events = Arc::new(EventNormalizer::new(
        store.clone(),
        Arc::new(Aggregator::new(inventory.clone())),
        &cfg.checkpoint_restore,
    ));
    let lifecycle = Arc::new(LifecycleManager::new(
        store.clone(),
        inventory.clone(),
        fetcher,
        propagator,
        &hub,
        cfg.controller.clone(),
    ));
    let clusters = Arc::new(ClusterView::new(store, inventory, lifecycle.clone(), &hub));

    let state = AppState {
        backups,
        recoveries,
        registries,
        events,
        lifecycle,
        clusters,
    };

    let router = routes::build_router(state);

    let listen_addr = cfg.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {}: {}", listen_addr, e);
        std::process::exit(1);
    });

    info!(hub = %cfg.hub.address, "fleet-backup listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            eprintln!("server error: {}", e);
            std::process::exit(1);
        });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub checkpoint_restore: CheckpointRestoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Cluster name that addresses the hub itself
    #[serde(default = "default_hub_name")]
    pub name: String,
    #[serde(default = "default_hub_address")]
    pub address: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Namespace holding backup, recovery and registry objects on the hub
    #[serde(default = "default_backup_namespace")]
    pub namespace: String,
    #[serde(default = "default_registry_secret_prefix")]
    pub registry_secret_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_backup_namespace")]
    pub namespace: String,
    #[serde(default = "default_controller_image")]
    pub image: String,
    #[serde(default = "default_backup_deployment")]
    pub backup_deployment: String,
    #[serde(default = "default_restore_deployment")]
    pub restore_deployment: String,
    #[serde(default = "default_daemonset_name")]
    pub daemonset_name: String,
    #[serde(default = "default_crd_manifest_url")]
    pub crd_manifest_url: String,
    #[serde(default = "default_rbac_manifest_url")]
    pub rbac_manifest_url: String,
    #[serde(default = "default_deployment_manifest_url")]
    pub deployment_manifest_url: String,
    #[serde(default = "default_member_rbac_manifest_url")]
    pub member_rbac_manifest_url: String,
    #[serde(default = "default_daemonset_manifest_url")]
    pub daemonset_manifest_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointRestoreConfig {
    #[serde(default = "default_migration_group")]
    pub group: String,
    /// Tried in order; controller releases have served different versions
    #[serde(default = "default_checkpoint_versions")]
    pub versions: Vec<String>,
    #[serde(default = "default_checkpoint_resource")]
    pub resource: String,
}

fn default_listen_port() -> u16 {
    8000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_hub_name() -> String {
    "management".to_string()
}

fn default_hub_address() -> String {
    "https://karmada-apiserver.karmada-system.svc:5443".to_string()
}

fn default_backup_namespace() -> String {
    "stateful-migration".to_string()
}

fn default_registry_secret_prefix() -> String {
    "registry-credentials".to_string()
}

fn default_controller_image() -> String {
    "docker.io/stateful-migration/stateful-migration-operator".to_string()
}

fn default_backup_deployment() -> String {
    "migration-backup-controller".to_string()
}

fn default_restore_deployment() -> String {
    "migration-restore-controller".to_string()
}

fn default_daemonset_name() -> String {
    "checkpoint-backup-controller".to_string()
}

const MANIFEST_BASE: &str =
    "https://raw.githubusercontent.com/stateful-migration/stateful-migration-operator/main/config";

fn default_crd_manifest_url() -> String {
    format!("{}/crd/bases/migration.dcnlab.com_all.yaml", MANIFEST_BASE)
}

fn default_rbac_manifest_url() -> String {
    format!("{}/rbac/rbac.yaml", MANIFEST_BASE)
}

fn default_deployment_manifest_url() -> String {
    format!("{}/manager/manager.yaml", MANIFEST_BASE)
}

fn default_member_rbac_manifest_url() -> String {
    format!("{}/rbac/checkpoint_backup_rbac.yaml", MANIFEST_BASE)
}

fn default_daemonset_manifest_url() -> String {
    format!("{}/daemonset/checkpoint_backup_daemonset.yaml", MANIFEST_BASE)
}

fn default_migration_group() -> String {
    "migration.dcnlab.com".to_string()
}

fn default_checkpoint_versions() -> Vec<String> {
    vec!["v1".to_string(), "v1alpha1".to_string()]
}

fn default_checkpoint_resource() -> String {
    "checkpointrestores".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: default_hub_name(),
            address: default_hub_address(),
            token: None,
            token_file: None,
            insecure_skip_tls_verify: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            namespace: default_backup_namespace(),
            registry_secret_prefix: default_registry_secret_prefix(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: default_backup_namespace(),
            image: default_controller_image(),
            backup_deployment: default_backup_deployment(),
            restore_deployment: default_restore_deployment(),
            daemonset_name: default_daemonset_name(),
            crd_manifest_url: default_crd_manifest_url(),
            rbac_manifest_url: default_rbac_manifest_url(),
            deployment_manifest_url: default_deployment_manifest_url(),
            member_rbac_manifest_url: default_member_rbac_manifest_url(),
            daemonset_manifest_url: default_daemonset_manifest_url(),
        }
    }
}

impl Default for CheckpointRestoreConfig {
    fn default() -> Self {
        Self {
            group: default_migration_group(),
            versions: default_checkpoint_versions(),
            resource: default_checkpoint_resource(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            request_timeout_secs: default_request_timeout_secs(),
            hub: HubConfig::default(),
            backup: BackupConfig::default(),
            controller: ControllerConfig::default(),
            checkpoint_restore: CheckpointRestoreConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading config {}: {}", path.display(), e)))?;
        let mut cfg: Config = serde_yaml::from_str(&data)
            .map_err(|e| Error::Config(format!("parsing config: {}", e)))?;

        // token_file overrides an inline token
        if let Some(ref file) = cfg.hub.token_file {
            let token = std::fs::read_to_string(file)
                .map_err(|e| Error::Config(format!("reading token file {}: {}", file, e)))?;
            cfg.hub.token = Some(token.trim().to_string());
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.hub.address.is_empty() {
            return Err(Error::Config("hub.address must be configured".into()));
        }
        if self.checkpoint_restore.versions.is_empty() {
            return Err(Error::Config(
                "checkpoint_restore.versions must list at least one version".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

// Canonical JSON shapes returned to callers, and the request bodies that
// produce them.

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(rename = "type")]
    pub schedule_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    pub id: String,
    pub name: String,
    pub registry: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfiguration {
    pub id: String,
    pub name: String,
    pub cluster: String,
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
    pub registry: RegistryInfo,
    pub repository: String,
    pub schedule: Schedule,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupRequest {
    pub name: String,
    pub cluster: String,
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
    pub registry_id: String,
    pub repository: String,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBackupRequest {
    pub name: Option<String>,
    pub cluster: Option<String>,
    pub resource_type: Option<String>,
    pub resource_name: Option<String>,
    pub namespace: Option<String>,
    pub registry_id: Option<String>,
    pub repository: Option<String>,
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPhase {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RecoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Controllers have written both `Completed` and `completed`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" | "inprogress" | "in-progress" => Some(Self::Running),
            "completed" | "succeeded" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    pub id: String,
    pub name: String,
    pub backup_id: String,
    pub backup_name: String,
    pub source_cluster: String,
    pub target_cluster: String,
    pub resource_type: String,
    pub resource_name: String,
    pub namespace: String,
    pub target_name: String,
    pub target_namespace: String,
    pub recovery_type: String,
    pub image_repository: String,
    pub status: RecoveryPhase,
    pub progress: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecoveryRequest {
    pub name: String,
    pub backup_id: String,
    pub target_cluster: String,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub target_namespace: Option<String>,
    #[serde(default = "default_recovery_type")]
    pub recovery_type: String,
}

fn default_recovery_type() -> String {
    "restore".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecoveryRequest {
    pub name: Option<String>,
    pub target_cluster: Option<String>,
    pub target_name: Option<String>,
    pub target_namespace: Option<String>,
    pub recovery_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRestoreEvent {
    pub name: String,
    pub namespace: String,
    pub cluster: String,
    pub source_cluster: String,
    pub target_cluster: String,
    pub backup_ref: String,
    pub resource_type: String,
    pub resource_name: String,
    pub resource_namespace: String,
    pub phase: String,
    pub status: String,
    pub progress: i64,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
    pub container_images: Vec<String>,
    pub spec: Value,
    pub conditions: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentials {
    pub id: String,
    pub name: String,
    pub registry: String,
    pub username: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegistryRequest {
    pub name: String,
    pub registry: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRegistryRequest {
    pub name: Option<String>,
    pub registry: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClusterType {
    Management,
    Member,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstallState {
    Installed,
    Partial,
    NotInstalled,
    Unknown,
    Error,
}

/// Result of probing one cluster for the controller components.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub cluster: String,
    pub status: InstallState,
    pub version: String,
    pub ready: i64,
    pub desired: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerLogs {
    pub pod: String,
    pub logs: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub ready: bool,
    pub controller_status: InstallState,
    pub controller_version: String,
    pub kubernetes_version: String,
    pub node_count: i64,
    pub ready_nodes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

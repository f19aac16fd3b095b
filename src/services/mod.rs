pub mod backup;
pub mod clusters;
pub mod events;
pub mod extract;
pub mod lifecycle;
pub mod manifests;
pub mod recovery;
pub mod registry;

use chrono::Utc;

use crate::helpers::sanitize_name;

/// Identity for a new record: sanitized display name plus creation epoch.
pub fn new_id(name: &str) -> String {
    id_at(name, Utc::now().timestamp())
}

fn id_at(name: &str, epoch: i64) -> String {
    format!("{}-{}", sanitize_name(name, 40), epoch)
}

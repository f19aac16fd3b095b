//! Registry credentials stored as dockerconfigjson Secrets on the hub.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::ResourceStore;
use crate::clients::propagation::{Propagator, ResourceSelector};
use crate::error::{Error, Result};
use crate::helpers::{label_of, now_rfc3339, set_path, str_at, string_or_default};
use crate::models::k8s::{
    ANNOTATION_DESCRIPTION, ANNOTATION_DISPLAY_NAME, ANNOTATION_UPDATED_AT, Gvr,
    LABEL_REGISTRY_ID, ListOptions, ObjectMeta,
};
use crate::models::views::{
    CreateRegistryRequest, RegistryCredentials, RegistryInfo, UpdateRegistryRequest,
};

use super::new_id;

pub struct RegistryStore {
    store: Arc<dyn ResourceStore>,
    propagator: Arc<Propagator>,
    hub: String,
    namespace: String,
    prefix: String,
}

fn encode(s: &str) -> Value {
    Value::String(STANDARD.encode(s))
}

fn decode(obj: &Value, key: &str) -> String {
    str_at(obj, &["data", key])
        .and_then(|s| STANDARD.decode(s).ok())
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_default()
}

fn secret_data(registry: &str, username: &str, password: &str) -> Value {
    let auth = STANDARD.encode(format!("{}:{}", username, password));
    let docker = json!({
        "auths": {
            registry: {"username": username, "password": password, "auth": auth}
        }
    });
    json!({
        ".dockerconfigjson": encode(&docker.to_string()),
        "registry": encode(registry),
        "username": encode(username),
        "password": encode(password),
    })
}

/// Canonical view of a credential Secret; the password is never read back.
pub(crate) fn credentials_from_secret(obj: &Value) -> RegistryCredentials {
    let created = string_or_default(obj, &["metadata", "creationTimestamp"]);
    let updated = str_at(obj, &["metadata", "annotations", ANNOTATION_UPDATED_AT])
        .map(str::to_string)
        .unwrap_or_else(|| created.clone());
    RegistryCredentials {
        id: label_of(obj, LABEL_REGISTRY_ID).unwrap_or_default(),
        name: string_or_default(obj, &["metadata", "annotations", ANNOTATION_DISPLAY_NAME]),
        registry: decode(obj, "registry"),
        username: decode(obj, "username"),
        description: string_or_default(obj, &["metadata", "annotations", ANNOTATION_DESCRIPTION]),
        created_at: created,
        updated_at: updated,
    }
}

impl RegistryCredentials {
    pub fn info(&self) -> RegistryInfo {
        RegistryInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            registry: self.registry.clone(),
            username: self.username.clone(),
        }
    }
}

impl RegistryStore {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        propagator: Arc<Propagator>,
        hub: impl Into<String>,
        namespace: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            propagator,
            hub: hub.into(),
            namespace: namespace.into(),
            prefix: prefix.into(),
        }
    }

    pub fn secret_name(&self, id: &str) -> String {
        format!("{}-{}", self.prefix, id)
    }

    /// Inverse of [`Self::secret_name`].
    pub fn id_from_secret_name<'a>(&self, secret: &'a str) -> Option<&'a str> {
        secret
            .strip_prefix(self.prefix.as_str())
            .and_then(|s| s.strip_prefix('-'))
            .filter(|s| !s.is_empty())
    }

    async fn get_secret(&self, id: &str) -> Result<Value> {
        self.store
            .get(&self.hub, &Gvr::secrets(), Some(&self.namespace), &self.secret_name(id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("registry {}", id))
                } else {
                    e
                }
            })
    }

    pub async fn list(&self) -> Result<Vec<RegistryCredentials>> {
        let items = self
            .store
            .list(
                &self.hub,
                &Gvr::secrets(),
                Some(&self.namespace),
                &ListOptions::labels(LABEL_REGISTRY_ID),
            )
            .await?;
        Ok(items.iter().map(credentials_from_secret).collect())
    }

    pub async fn get(&self, id: &str) -> Result<RegistryCredentials> {
        Ok(credentials_from_secret(&self.get_secret(id).await?))
    }

    pub async fn create(&self, req: CreateRegistryRequest) -> Result<RegistryCredentials> {
        if req.name.trim().is_empty() {
            return Err(Error::validation("registry name is required"));
        }
        if req.registry.trim().is_empty() {
            return Err(Error::validation("registry URL is required"));
        }

        let id = new_id(&req.name);
        let meta = ObjectMeta::managed(self.secret_name(&id), &self.namespace)
            .with_label(LABEL_REGISTRY_ID, &id)
            .with_annotation(ANNOTATION_DISPLAY_NAME, &req.name)
            .with_annotation(ANNOTATION_DESCRIPTION, &req.description);
        let body = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": meta,
            "type": "kubernetes.io/dockerconfigjson",
            "data": secret_data(&req.registry, &req.username, &req.password),
        });

        let created = self
            .store
            .create(&self.hub, &Gvr::secrets(), Some(&self.namespace), &body)
            .await?;
        info!(registry = %id, url = %req.registry, "created registry credentials");
        Ok(credentials_from_secret(&created))
    }

    pub async fn update(&self, id: &str, req: UpdateRegistryRequest) -> Result<RegistryCredentials> {
        let mut secret = self.get_secret(id).await?;

        if let Some(name) = req.name {
            set_path(
                &mut secret,
                &["metadata", "annotations", ANNOTATION_DISPLAY_NAME],
                Value::String(name),
            );
        }
        if let Some(description) = req.description {
            set_path(
                &mut secret,
                &["metadata", "annotations", ANNOTATION_DESCRIPTION],
                Value::String(description),
            );
        }
        if req.registry.is_some() || req.username.is_some() || req.password.is_some() {
            let registry = req.registry.unwrap_or_else(|| decode(&secret, "registry"));
            let username = req.username.unwrap_or_else(|| decode(&secret, "username"));
            let password = req.password.unwrap_or_else(|| decode(&secret, "password"));
            set_path(
                &mut secret,
                &["data"],
                secret_data(&registry, &username, &password),
            );
        }
        set_path(
            &mut secret,
            &["metadata", "annotations", ANNOTATION_UPDATED_AT],
            Value::String(now_rfc3339()),
        );

        let updated = self
            .store
            .update(&self.hub, &Gvr::secrets(), Some(&self.namespace), &secret)
            .await?;
        Ok(credentials_from_secret(&updated))
    }

    /// Member-cluster copies made by [`Self::propagate`] are only retracted
    /// through the policy engine, on a best-effort basis.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let name = self.secret_name(id);
        self.store
            .delete(&self.hub, &Gvr::secrets(), Some(&self.namespace), &name)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found(format!("registry {}", id))
                } else {
                    e
                }
            })?;

        if let Err(e) = self.propagator.delete_namespaced(&name, &self.namespace).await {
            warn!(registry = %id, error = %e, "failed to delete credential propagation policy");
        }
        info!(registry = %id, "deleted registry credentials");
        Ok(())
    }

    /// Deliver the credential Secret to exactly `clusters`.
    pub async fn propagate(&self, id: &str, clusters: &[String]) -> Result<()> {
        if clusters.is_empty() {
            return Err(Error::validation("at least one target cluster is required"));
        }
        self.get_secret(id).await?;

        let name = self.secret_name(id);
        let selectors = [ResourceSelector::new(
            "v1",
            "Secret",
            &name,
            Some(&self.namespace),
        )];
        self.propagator
            .set_namespaced_targets(&name, &self.namespace, &selectors, clusters)
            .await
    }
}

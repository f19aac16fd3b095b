pub mod aggregator;
pub mod inventory;
pub mod manifest;
pub mod propagation;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::helpers::name_of;
use crate::models::k8s::{Gvr, ListOptions};

/// Uniform CRUD over schema-less objects on any cluster in the fleet.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, name: &str)
    -> Result<Value>;

    async fn list(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> Result<Vec<Value>>;

    async fn create(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        obj: &Value,
    ) -> Result<Value>;

    /// Replace; the object's `metadata.name` selects the target.
    async fn update(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        obj: &Value,
    ) -> Result<Value>;

    async fn delete(&self, cluster: &str, gvr: &Gvr, namespace: Option<&str>, name: &str)
    -> Result<()>;

    async fn pod_logs(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
        tail_lines: u32,
    ) -> Result<String>;
}

/// Create, treating AlreadyExists as success. Returns whether a new object was written.
pub async fn create_if_absent(
    store: &dyn ResourceStore,
    cluster: &str,
    gvr: &Gvr,
    namespace: Option<&str>,
    obj: &Value,
) -> Result<bool> {
    match store.create(cluster, gvr, namespace, obj).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_already_exists() => {
            debug!(cluster, resource = %gvr.resource, name = %name_of(obj), "already exists");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Delete, treating NotFound as success. Returns whether an object was removed.
pub async fn delete_if_present(
    store: &dyn ResourceStore,
    cluster: &str,
    gvr: &Gvr,
    namespace: Option<&str>,
    name: &str,
) -> Result<bool> {
    match store.delete(cluster, gvr, namespace, name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Maps cluster names to API base URLs. The hub is addressed directly,
/// members through the hub's cluster proxy.
#[derive(Debug, Clone)]
pub struct ClusterResolver {
    hub_name: String,
    hub_address: String,
}

impl ClusterResolver {
    pub fn new(hub_name: impl Into<String>, hub_address: impl Into<String>) -> Self {
        Self {
            hub_name: hub_name.into(),
            hub_address: hub_address.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_hub(&self, cluster: &str) -> bool {
        cluster == self.hub_name
    }

    pub fn base_url(&self, cluster: &str) -> String {
        if self.is_hub(cluster) {
            self.hub_address.clone()
        } else {
            format!(
                "{}{}/{}/proxy",
                self.hub_address,
                Gvr::member_clusters().path(None, None),
                cluster
            )
        }
    }
}

/// HTTP implementation of [`ResourceStore`] speaking the Kubernetes REST API.
pub struct KubeClient {
    resolver: ClusterResolver,
    http: Client,
    token: Option<String>,
}

impl KubeClient {
    pub fn new(hub: &HubConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(hub.insecure_skip_tls_verify)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            resolver: ClusterResolver::new(&hub.name, &hub.address),
            http,
            token: hub.token.clone(),
        })
    }

    fn request(&self, method: Method, cluster: &str, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.resolver.base_url(cluster), path);
        let req = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        match self.token {
            Some(ref t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send(&self, cluster: &str, verb: &str, path: &str, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::unavailable(cluster, format!("{} {}: {}", verb, path, e)))?;

        let status = resp.status().as_u16();
        if status < 400 {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        Err(match status {
            404 => Error::NotFound(format!("{} {} on {}: {}", verb, path, cluster, message)),
            409 if verb == "POST" => {
                Error::AlreadyExists(format!("{} on {}: {}", path, cluster, message))
            }
            s if s >= 500 => Error::unavailable(cluster, format!("{} {} returned {}: {}", verb, path, s, message)),
            s => Error::Upstream {
                target: cluster.to_string(),
                status: s,
                message: format!("{} {}: {}", verb, path, message),
            },
        })
    }

    async fn json(&self, cluster: &str, verb: &str, path: &str, req: RequestBuilder) -> Result<Value> {
        let resp = self.send(cluster, verb, path, req).await?;
        resp.json()
            .await
            .map_err(|e| Error::Serialization(format!("{} {} on {}: {}", verb, path, cluster, e)))
    }
}

#[async_trait]
impl ResourceStore for KubeClient {
    async fn get(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let path = gvr.path(namespace, Some(name));
        let req = self.request(Method::GET, cluster, &path);
        self.json(cluster, "GET", &path, req).await
    }

    async fn list(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> Result<Vec<Value>> {
        let path = gvr.path(namespace, None);
        let mut req = self.request(Method::GET, cluster, &path);
        if let Some(ref sel) = opts.label_selector {
            req = req.query(&[("labelSelector", sel)]);
        }
        if let Some(limit) = opts.limit {
            req = req.query(&[("limit", limit)]);
        }
        let mut list = self.json(cluster, "GET", &path, req).await?;
        match list.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(Error::malformed(path, "list items is not an array")),
        }
    }

    async fn create(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        obj: &Value,
    ) -> Result<Value> {
        let path = gvr.path(namespace, None);
        let req = self
            .request(Method::POST, cluster, &path)
            .header("Content-Type", "application/json")
            .json(obj);
        self.json(cluster, "POST", &path, req).await
    }

    async fn update(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        obj: &Value,
    ) -> Result<Value> {
        let name = name_of(obj);
        if name.is_empty() {
            return Err(Error::malformed(&gvr.resource, "update without metadata.name"));
        }
        let path = gvr.path(namespace, Some(&name));
        let req = self
            .request(Method::PUT, cluster, &path)
            .header("Content-Type", "application/json")
            .json(obj);
        self.json(cluster, "PUT", &path, req).await
    }

    async fn delete(
        &self,
        cluster: &str,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let path = gvr.path(namespace, Some(name));
        let req = self.request(Method::DELETE, cluster, &path);
        self.send(cluster, "DELETE", &path, req).await?;
        Ok(())
    }

    async fn pod_logs(
        &self,
        cluster: &str,
        namespace: &str,
        pod: &str,
        tail_lines: u32,
    ) -> Result<String> {
        let path = format!("{}/log", Gvr::pods().path(Some(namespace), Some(pod)));
        let req = self
            .request(Method::GET, cluster, &path)
            .query(&[("tailLines", tail_lines)]);
        let resp = self.send(cluster, "GET", &path, req).await?;
        resp.text()
            .await
            .map_err(|e| Error::unavailable(cluster, format!("reading log of {}: {}", pod, e)))
    }
}

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};

/// Source of controller install manifests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpManifestFetcher {
    http: Client,
}

impl HttpManifestFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::unavailable(url, e))?;

        if resp.status().as_u16() >= 400 {
            return Err(Error::unavailable(
                url,
                format!("manifest fetch returned {}", resp.status()),
            ));
        }
        resp.text().await.map_err(|e| Error::unavailable(url, e))
    }
}

/// Split a multi-document YAML manifest into JSON objects, dropping empty documents.
pub fn parse_manifest(text: &str) -> Result<Vec<Value>> {
    let mut objects = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(text) {
        let v = Value::deserialize(doc)?;
        match v {
            Value::Null => {}
            Value::Object(_) => objects.push(v),
            other => {
                return Err(Error::Serialization(format!(
                    "manifest document is not an object: {}",
                    other
                )));
            }
        }
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_document() {
        let text = "---\napiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: sa\n---\n\n---\napiVersion: apps/v1\nkind: DaemonSet\nmetadata:\n  name: ds\n";
        let objs = parse_manifest(text).unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0]["kind"], "ServiceAccount");
        assert_eq!(objs[1]["metadata"]["name"], "ds");
    }

    #[test]
    fn test_parse_rejects_scalar_document() {
        assert!(parse_manifest("just a string\n").is_err());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Resource;

const SERVICE: &str = "resource directory";

/// Resource directory lookups the pipeline consumes.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// List resources carrying the given name. The directory may return
    /// loose matches; callers apply the exact-match rule.
    async fn list_resources_by_name(&self, name: &str) -> Result<Vec<Resource>>;
}

/// HTTP client for the resource directory.
pub struct ResourceClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ResourceClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl ResourceDirectory for ResourceClient {
    async fn list_resources_by_name(&self, name: &str) -> Result<Vec<Resource>> {
        let url = format!("{}/subscriptions", self.base_url);
        debug!("Listing resources named '{}' from: {}", name, url);

        let response = self
            .client
            .get(&url)
            .query(&[("name", name)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        let envelope: ListEnvelope = super::decode(SERVICE, response).await?;
        Ok(envelope
            .value
            .into_iter()
            .map(|wire| Resource {
                id: wire.id,
                name: wire.display_name,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    value: Vec<ResourceWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceWire {
    id: String,
    display_name: String,
}

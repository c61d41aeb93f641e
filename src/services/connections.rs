use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ConnectionSpec, ConnectionWire};

const SERVICE: &str = "connection service";

/// Connection service operations the pipeline consumes. All calls are
/// scoped to the one project configured for the run.
#[async_trait]
pub trait ConnectionService: Send + Sync {
    /// List every connection record in the project.
    async fn list_connections(&self) -> Result<Vec<ConnectionWire>>;

    /// Create a new connection record.
    async fn create_connection(&self, spec: &ConnectionSpec) -> Result<ConnectionWire>;

    /// Replace a connection record wholesale by its id.
    async fn update_connection(&self, id: &str, payload: &ConnectionWire) -> Result<()>;
}

/// HTTP client for the connection service.
pub struct ConnectionClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl ConnectionClient {
    pub fn new(organization_url: &str, project: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/_apis/connections",
                organization_url.trim_end_matches('/'),
                project
            ),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl ConnectionService for ConnectionClient {
    async fn list_connections(&self) -> Result<Vec<ConnectionWire>> {
        debug!("Listing connections from: {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        let envelope: ListEnvelope = super::decode(SERVICE, response).await?;
        Ok(envelope.value)
    }

    async fn create_connection(&self, spec: &ConnectionSpec) -> Result<ConnectionWire> {
        debug!("Creating connection '{}' at: {}", spec.name, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(spec)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        super::decode(SERVICE, response).await
    }

    async fn update_connection(&self, id: &str, payload: &ConnectionWire) -> Result<()> {
        let url = format!("{}/{}", self.endpoint, id);
        debug!("Updating connection at: {}", url);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        super::check(SERVICE, response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    value: Vec<ConnectionWire>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::Connection;

    #[tokio::test]
    async fn test_list_connections_parses_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/acme/Platform/_apis/connections")
            .match_header("authorization", "Bearer pat")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "count": 1,
                    "value": [{
                        "id": "conn-1",
                        "name": "svc-app-sub-prod",
                        "authorization": {
                            "scheme": "ServicePrincipal",
                            "parameters": { "principalId": "app-1" }
                        },
                        "data": { "resourceName": "sub-prod", "resourceId": "res-1" },
                        "isShared": false
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ConnectionClient::new(&format!("{}/acme", server.url()), "Platform", "pat").unwrap();
        let wires = client.list_connections().await.unwrap();

        assert_eq!(wires.len(), 1);
        assert_eq!(wires[0].extra.get("isShared"), Some(&serde_json::json!(false)));
        let conn = Connection::from_wire(wires[0].clone()).unwrap();
        assert_eq!(conn.bound_app_id, "app-1");
    }

    #[tokio::test]
    async fn test_update_connection_puts_full_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/acme/Platform/_apis/connections/conn-1")
            .match_header("authorization", "Bearer pat")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let wire: ConnectionWire = serde_json::from_value(serde_json::json!({
            "id": "conn-1",
            "name": "svc-app-sub-prod",
            "authorization": { "scheme": "ServicePrincipal", "parameters": {} },
            "data": {}
        }))
        .unwrap();

        let client = ConnectionClient::new(&format!("{}/acme", server.url()), "Platform", "pat").unwrap();
        client.update_connection("conn-1", &wire).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_connection_returns_created_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/acme/Platform/_apis/connections")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": "conn-9",
                    "name": "svc-app-sub-prod",
                    "authorization": { "scheme": "ServicePrincipal", "parameters": {} },
                    "data": {}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let spec = ConnectionSpec {
            name: "svc-app-sub-prod".to_string(),
            authorization: crate::models::ConnectionAuthorization {
                scheme: crate::models::SCHEME_SERVICE_PRINCIPAL.to_string(),
                parameters: Default::default(),
            },
            data: Default::default(),
        };

        let client = ConnectionClient::new(&format!("{}/acme", server.url()), "Platform", "pat").unwrap();
        let created = client.create_connection(&spec).await.unwrap();

        assert_eq!(created.id, "conn-9");
    }

    #[tokio::test]
    async fn test_update_failure_maps_to_external_service() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/acme/Platform/_apis/connections/conn-1")
            .with_status(400)
            .with_body("bad payload")
            .create_async()
            .await;

        let wire: ConnectionWire = serde_json::from_value(serde_json::json!({
            "id": "conn-1",
            "name": "x",
            "authorization": { "scheme": "ServicePrincipal", "parameters": {} },
            "data": {}
        }))
        .unwrap();

        let client = ConnectionClient::new(&format!("{}/acme", server.url()), "Platform", "pat").unwrap();
        let err = client.update_connection("conn-1", &wire).await.unwrap_err();

        assert!(matches!(err, Error::ExternalService { status: 400, .. }));
    }
}

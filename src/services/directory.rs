use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Credential, Identity, Principal, SecretValue};

const SERVICE: &str = "directory service";

/// Directory service operations the pipeline consumes.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// List registered identities with their credential metadata.
    async fn list_identities(&self, include_all: bool) -> Result<Vec<Identity>>;

    /// Invalidate the identity's current secret and issue a new one.
    async fn reset_credential(&self, identity_id: &str) -> Result<IssuedCredential>;

    /// List the owning principals of an identity.
    async fn list_owners(&self, identity_id: &str) -> Result<Vec<Principal>>;
}

/// Credential issued by a reset call. The only point where a secret value
/// enters the pipeline.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub value: SecretValue,
    pub tenant_id: String,
}

/// HTTP client for the directory service.
pub struct DirectoryClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DirectoryClient {
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
impl DirectoryService for DirectoryClient {
    async fn list_identities(&self, include_all: bool) -> Result<Vec<Identity>> {
        let url = format!("{}/applications", self.base_url);
        debug!("Listing identities from: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("includeAll", include_all)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        let envelope: ListEnvelope<IdentityWire> = super::decode(SERVICE, response).await?;
        Ok(envelope.value.into_iter().map(Identity::from).collect())
    }

    async fn reset_credential(&self, identity_id: &str) -> Result<IssuedCredential> {
        let url = format!("{}/applications/{}/resetCredential", self.base_url, identity_id);
        debug!("Resetting credential at: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        let reset: ResetResponse = super::decode(SERVICE, response).await?;
        Ok(IssuedCredential {
            value: SecretValue::new(reset.secret_text),
            tenant_id: reset.tenant_id,
        })
    }

    async fn list_owners(&self, identity_id: &str) -> Result<Vec<Principal>> {
        let url = format!("{}/applications/{}/owners", self.base_url, identity_id);
        debug!("Listing owners from: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| Error::ServiceUnavailable { service: SERVICE, source })?;

        let envelope: ListEnvelope<PrincipalWire> = super::decode(SERVICE, response).await?;
        Ok(envelope.value.into_iter().map(Principal::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityWire {
    id: String,
    app_id: String,
    display_name: String,
    #[serde(default)]
    tenant_id: String,
    #[serde(default)]
    password_credentials: Vec<CredentialWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialWire {
    key_id: String,
    start_date_time: DateTime<Utc>,
    end_date_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetResponse {
    secret_text: String,
    #[serde(default)]
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrincipalWire {
    id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    user_principal_name: String,
}

impl From<IdentityWire> for Identity {
    fn from(wire: IdentityWire) -> Self {
        let mut credentials: Vec<Credential> = wire
            .password_credentials
            .into_iter()
            .map(|c| Credential {
                key_id: c.key_id,
                start: c.start_date_time,
                end: c.end_date_time,
            })
            .collect();
        credentials.sort_by_key(|c| c.start);
        Identity {
            id: wire.id,
            app_id: wire.app_id,
            display_name: wire.display_name,
            tenant_id: wire.tenant_id,
            credentials,
        }
    }
}

impl From<PrincipalWire> for Principal {
    fn from(wire: PrincipalWire) -> Self {
        Principal {
            id: wire.id,
            display_name: wire.display_name,
            principal_name: wire.user_principal_name,
        }
    }
}

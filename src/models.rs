//! Typed records for the directory, connection and resource boundaries.
//!
//! Collaborator services speak loosely-typed JSON; everything is parsed into
//! these records on ingestion and stays typed through the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorization parameter holding the bound identity's application id.
pub const PARAM_PRINCIPAL_ID: &str = "principalId";
/// Authorization parameter the rotated secret is written into.
pub const PARAM_PRINCIPAL_SECRET: &str = "principalSecret";
/// Authorization parameter holding the issuing tenant.
pub const PARAM_TENANT_ID: &str = "tenantId";
/// Data entry naming the bound external resource.
pub const DATA_RESOURCE_NAME: &str = "resourceName";
/// Data entry holding the bound external resource id.
pub const DATA_RESOURCE_ID: &str = "resourceId";
/// Authorization scheme used by identity-credential connections.
pub const SCHEME_SERVICE_PRINCIPAL: &str = "ServicePrincipal";

/// A shared secret value. Debug and Display both redact, so credential
/// values cannot end up in logs; `expose` grants deliberate access.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// A registered application principal holding rotatable credentials.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub app_id: String,
    pub display_name: String,
    pub tenant_id: String,
    /// Sorted by start time at ingestion and never mutated afterwards.
    pub credentials: Vec<Credential>,
}

/// A time-bounded shared secret attached to an identity. Listing endpoints
/// return only the validity window, never the secret value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub key_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Credential {
    /// A credential is expiring when it ends before the threshold date.
    pub fn is_expiring(&self, threshold: DateTime<Utc>) -> bool {
        self.end < threshold
    }
}

/// An owning principal of an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub principal_name: String,
}

/// An identity selected for rotation: at least one credential ends inside
/// the threshold window and none is valid beyond it.
#[derive(Debug, Clone)]
pub struct ExpiringIdentity {
    pub identity: Identity,
    /// Soonest credential end date.
    pub expires: DateTime<Utc>,
    /// Filled in by owner enrichment; empty until then.
    pub owners: Vec<Principal>,
}

/// An external resource a connection authorizes against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub name: String,
}

/// Full connection record as the connection service stores it.
///
/// Unknown fields survive a read-modify-write cycle via `extra`, so a full
/// update can replace the secret parameter and echo everything else back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionWire {
    pub id: String,
    pub name: String,
    pub authorization: ConnectionAuthorization,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionAuthorization {
    pub scheme: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Creation payload for a new connection; the service assigns the id.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSpec {
    pub name: String,
    pub authorization: ConnectionAuthorization,
    pub data: BTreeMap<String, String>,
}

/// Typed view of a connection record bound to a managed identity.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub bound_app_id: String,
    pub bound_resource_name: String,
    pub bound_resource_id: String,
    /// The record as read, retained for full-update round-trips.
    pub wire: ConnectionWire,
}

impl Connection {
    /// Extract the typed view of a wire record. Records without a bound
    /// principal id or resource name are not managed by this tool.
    pub fn from_wire(wire: ConnectionWire) -> Option<Self> {
        let bound_app_id = wire.authorization.parameters.get(PARAM_PRINCIPAL_ID)?.clone();
        let bound_resource_name = wire.data.get(DATA_RESOURCE_NAME)?.clone();
        let bound_resource_id = wire.data.get(DATA_RESOURCE_ID).cloned().unwrap_or_default();
        Some(Self {
            id: wire.id.clone(),
            name: wire.name.clone(),
            bound_app_id,
            bound_resource_name,
            bound_resource_id,
            wire,
        })
    }
}

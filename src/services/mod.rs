//! Collaborator service clients.
//!
//! Each collaborator is consumed through an async trait with one HTTP
//! implementation. Clients are constructed once from configuration and
//! passed to every component that needs them; no global state.

mod connections;
mod directory;
mod resources;

pub use connections::{ConnectionClient, ConnectionService};
pub use directory::{DirectoryClient, DirectoryService, IssuedCredential};
pub use resources::{ResourceClient, ResourceDirectory};

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Check the response status and decode the JSON body.
pub(crate) async fn decode<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let response = check(service, response).await?;
    response
        .json()
        .await
        .map_err(|source| Error::Decode { service, source })
}

/// Check the response status, returning the response for further handling.
pub(crate) async fn check(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ExternalService { service, status, body });
    }
    Ok(response)
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory collaborators with call counters, shared by the component
    //! and pipeline tests.

    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use crate::error::{Error, Result};
    use crate::models::{
        Connection, ConnectionAuthorization, ConnectionSpec, ConnectionWire, Credential, Identity,
        Principal, Resource, SecretValue, DATA_RESOURCE_ID, DATA_RESOURCE_NAME,
        PARAM_PRINCIPAL_ID, PARAM_TENANT_ID,
    };

    use super::{ConnectionService, DirectoryService, IssuedCredential, ResourceDirectory};

    fn unavailable(service: &'static str) -> Error {
        Error::ExternalService {
            service,
            status: 503,
            body: "service unavailable".to_string(),
        }
    }

    /// Build an identity whose credential end dates are offsets from now.
    pub fn identity(id: &str, app_id: &str, display_name: &str, end_offsets: &[i64]) -> Identity {
        let now = Utc::now();
        let credentials = end_offsets
            .iter()
            .enumerate()
            .map(|(i, days)| Credential {
                key_id: format!("{id}-key-{i}"),
                start: now - Duration::days(365),
                end: now + Duration::days(*days),
            })
            .collect();
        Identity {
            id: id.to_string(),
            app_id: app_id.to_string(),
            display_name: display_name.to_string(),
            tenant_id: "tenant-1".to_string(),
            credentials,
        }
    }

    pub fn owner(id: &str, principal_name: &str) -> Principal {
        Principal {
            id: id.to_string(),
            display_name: principal_name.to_string(),
            principal_name: principal_name.to_string(),
        }
    }

    /// Build a stored connection record bound to (app_id, resource_name).
    pub fn connection_wire(
        id: &str,
        name: &str,
        app_id: &str,
        resource_name: &str,
        resource_id: &str,
    ) -> ConnectionWire {
        ConnectionWire {
            id: id.to_string(),
            name: name.to_string(),
            authorization: ConnectionAuthorization {
                scheme: crate::models::SCHEME_SERVICE_PRINCIPAL.to_string(),
                parameters: BTreeMap::from([
                    (PARAM_PRINCIPAL_ID.to_string(), app_id.to_string()),
                    (PARAM_TENANT_ID.to_string(), "tenant-1".to_string()),
                ]),
            },
            data: BTreeMap::from([
                (DATA_RESOURCE_NAME.to_string(), resource_name.to_string()),
                (DATA_RESOURCE_ID.to_string(), resource_id.to_string()),
            ]),
            extra: serde_json::Map::new(),
        }
    }

    #[derive(Default)]
    pub struct MockDirectory {
        pub identities: Vec<Identity>,
        pub owners: HashMap<String, Vec<Principal>>,
        pub issued_tenant: Option<String>,
        pub fail_listing: bool,
        pub fail_owners_for: HashSet<String>,
        pub fail_reset_for: HashSet<String>,
        pub reset_calls: AtomicUsize,
        pub owner_calls: AtomicUsize,
    }

    impl MockDirectory {
        pub fn with_identities(identities: Vec<Identity>) -> Self {
            Self {
                identities,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DirectoryService for MockDirectory {
        async fn list_identities(&self, _include_all: bool) -> Result<Vec<Identity>> {
            if self.fail_listing {
                return Err(unavailable("directory service"));
            }
            Ok(self.identities.clone())
        }

        async fn reset_credential(&self, identity_id: &str) -> Result<IssuedCredential> {
            self.reset_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reset_for.contains(identity_id) {
                return Err(unavailable("directory service"));
            }
            Ok(IssuedCredential {
                value: SecretValue::new(format!("rotated-{identity_id}")),
                tenant_id: self
                    .issued_tenant
                    .clone()
                    .unwrap_or_else(|| "tenant-1".to_string()),
            })
        }

        async fn list_owners(&self, identity_id: &str) -> Result<Vec<Principal>> {
            self.owner_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_owners_for.contains(identity_id) {
                return Err(unavailable("directory service"));
            }
            Ok(self.owners.get(identity_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct MockConnections {
        pub store: Mutex<Vec<ConnectionWire>>,
        pub fail_update_for: HashSet<String>,
        pub fail_create_for: HashSet<String>,
        pub create_calls: AtomicUsize,
        pub update_calls: AtomicUsize,
        pub next_id: AtomicUsize,
    }

    impl MockConnections {
        pub fn with_store(store: Vec<ConnectionWire>) -> Self {
            Self {
                store: Mutex::new(store),
                ..Self::default()
            }
        }

        pub fn stored(&self) -> Vec<ConnectionWire> {
            self.store.lock().unwrap().clone()
        }

        /// Typed view of a stored record, by name.
        pub fn stored_connection(&self, name: &str) -> Option<Connection> {
            self.stored()
                .into_iter()
                .find(|wire| wire.name == name)
                .and_then(Connection::from_wire)
        }
    }

    #[async_trait]
    impl ConnectionService for MockConnections {
        async fn list_connections(&self) -> Result<Vec<ConnectionWire>> {
            Ok(self.stored())
        }

        async fn create_connection(&self, spec: &ConnectionSpec) -> Result<ConnectionWire> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create_for.contains(&spec.name) {
                return Err(unavailable("connection service"));
            }
            let id = format!("conn-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let wire = ConnectionWire {
                id,
                name: spec.name.clone(),
                authorization: spec.authorization.clone(),
                data: spec.data.clone(),
                extra: serde_json::Map::new(),
            };
            self.store.lock().unwrap().push(wire.clone());
            Ok(wire)
        }

        async fn update_connection(&self, id: &str, payload: &ConnectionWire) -> Result<()> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_update_for.contains(id) {
                return Err(unavailable("connection service"));
            }
            let mut store = self.store.lock().unwrap();
            match store.iter_mut().find(|wire| wire.id == id) {
                Some(existing) => {
                    *existing = payload.clone();
                    Ok(())
                }
                None => Err(Error::NotFound {
                    kind: "connection",
                    name: id.to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    pub struct MockResources {
        pub resources: Vec<Resource>,
        pub fail_lookup: bool,
    }

    impl MockResources {
        pub fn with_resources(resources: Vec<Resource>) -> Self {
            Self {
                resources,
                fail_lookup: false,
            }
        }
    }

    #[async_trait]
    impl ResourceDirectory for MockResources {
        async fn list_resources_by_name(&self, name: &str) -> Result<Vec<Resource>> {
            if self.fail_lookup {
                return Err(unavailable("resource directory"));
            }
            Ok(self
                .resources
                .iter()
                .filter(|r| r.name.eq_ignore_ascii_case(name))
                .cloned()
                .collect())
        }
    }
}

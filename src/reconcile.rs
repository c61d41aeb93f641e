//! Idempotent create-or-update of a single connection record.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    Connection, ConnectionAuthorization, ConnectionSpec, Identity, DATA_RESOURCE_ID,
    DATA_RESOURCE_NAME, PARAM_PRINCIPAL_ID, PARAM_PRINCIPAL_SECRET, PARAM_TENANT_ID,
    SCHEME_SERVICE_PRINCIPAL,
};
use crate::resolve::ConnectionResolver;
use crate::rotate::{Mode, RotatedCredential};
use crate::services::ConnectionService;

/// What a reconcile call did (or, in preview, would do).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub connection_name: String,
}

pub struct ConnectionReconciler<'a> {
    connections: &'a dyn ConnectionService,
}

impl<'a> ConnectionReconciler<'a> {
    pub fn new(connections: &'a dyn ConnectionService) -> Self {
        Self { connections }
    }

    /// Bring the connection for `(identity, resource)` in line with the
    /// rotated credential: update the matching record if one exists,
    /// otherwise create one named `"{display_name}-{resource_name}"`.
    pub async fn upsert(
        &self,
        identity: &Identity,
        credential: &RotatedCredential,
        resource_name: &str,
        resource_id: &str,
        mode: Mode,
    ) -> Result<ReconcileOutcome> {
        let resolver = ConnectionResolver::new(self.connections);
        match resolver.find_binding(&identity.app_id, resource_name).await? {
            Some(existing) => self.update_existing(existing, credential, mode).await,
            None => {
                self.create_new(identity, credential, resource_name, resource_id, mode)
                    .await
            }
        }
    }

    /// Full update of the record with only the secret parameter replaced;
    /// every other field is echoed back as read.
    async fn update_existing(
        &self,
        existing: Connection,
        credential: &RotatedCredential,
        mode: Mode,
    ) -> Result<ReconcileOutcome> {
        let mut payload = existing.wire.clone();
        payload.authorization.parameters.insert(
            PARAM_PRINCIPAL_SECRET.to_string(),
            credential.value.expose().to_string(),
        );

        if mode.is_apply() {
            self.connections
                .update_connection(&existing.id, &payload)
                .await
                .map_err(|source| Error::Reconcile {
                    connection: existing.name.clone(),
                    source: Box::new(source),
                })?;
            info!("Updated connection {}", existing.name);
        } else {
            info!("[preview] Would update connection {}", existing.name);
        }

        Ok(ReconcileOutcome {
            action: ReconcileAction::Updated,
            connection_name: existing.name,
        })
    }

    async fn create_new(
        &self,
        identity: &Identity,
        credential: &RotatedCredential,
        resource_name: &str,
        resource_id: &str,
        mode: Mode,
    ) -> Result<ReconcileOutcome> {
        // Name format is a user-visible contract.
        let name = format!("{}-{}", identity.display_name, resource_name);
        let spec = ConnectionSpec {
            name: name.clone(),
            authorization: ConnectionAuthorization {
                scheme: SCHEME_SERVICE_PRINCIPAL.to_string(),
                parameters: BTreeMap::from([
                    (PARAM_PRINCIPAL_ID.to_string(), identity.app_id.clone()),
                    (
                        PARAM_PRINCIPAL_SECRET.to_string(),
                        credential.value.expose().to_string(),
                    ),
                    (PARAM_TENANT_ID.to_string(), credential.tenant_id.clone()),
                ]),
            },
            data: BTreeMap::from([
                (DATA_RESOURCE_NAME.to_string(), resource_name.to_string()),
                (DATA_RESOURCE_ID.to_string(), resource_id.to_string()),
            ]),
        };

        if mode.is_apply() {
            self.connections
                .create_connection(&spec)
                .await
                .map_err(|source| Error::Reconcile {
                    connection: name.clone(),
                    source: Box::new(source),
                })?;
            info!("Created connection {}", name);
        } else {
            info!("[preview] Would create connection {}", name);
        }

        Ok(ReconcileOutcome {
            action: ReconcileAction::Created,
            connection_name: name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SecretValue;
    use crate::services::mock::{connection_wire, identity, MockConnections};
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn credential(value: &str) -> RotatedCredential {
        RotatedCredential {
            value: SecretValue::new(value),
            tenant_id: "tenant-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_creates_connection_with_contract_name() {
        let connections = MockConnections::default();
        let reconciler = ConnectionReconciler::new(&connections);
        let subject = identity("id-1", "app-1", "svc-app", &[-5]);

        let outcome = reconciler
            .upsert(&subject, &credential("new-secret"), "sub-prod", "res-1", Mode::Apply)
            .await
            .unwrap();

        assert_eq!(outcome.action, ReconcileAction::Created);
        assert_eq!(outcome.connection_name, "svc-app-sub-prod");
        assert_eq!(connections.create_calls.load(Ordering::SeqCst), 1);

        let stored = connections.stored_connection("svc-app-sub-prod").unwrap();
        assert_eq!(stored.bound_app_id, "app-1");
        assert_eq!(stored.bound_resource_id, "res-1");
        assert_eq!(
            stored.wire.authorization.parameters.get(PARAM_PRINCIPAL_SECRET),
            Some(&"new-secret".to_string())
        );
    }

    #[tokio::test]
    async fn test_second_upsert_updates_instead_of_duplicating() {
        let connections = MockConnections::default();
        let reconciler = ConnectionReconciler::new(&connections);
        let subject = identity("id-1", "app-1", "svc-app", &[-5]);

        let first = reconciler
            .upsert(&subject, &credential("secret-1"), "sub-prod", "res-1", Mode::Apply)
            .await
            .unwrap();
        let second = reconciler
            .upsert(&subject, &credential("secret-2"), "sub-prod", "res-1", Mode::Apply)
            .await
            .unwrap();

        assert_eq!(first.action, ReconcileAction::Created);
        assert_eq!(second.action, ReconcileAction::Updated);
        assert_eq!(connections.stored().len(), 1);
        assert_eq!(connections.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connections.update_calls.load(Ordering::SeqCst), 1);

        let stored = connections.stored_connection("svc-app-sub-prod").unwrap();
        assert_eq!(
            stored.wire.authorization.parameters.get(PARAM_PRINCIPAL_SECRET),
            Some(&"secret-2".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_replaces_only_the_secret_field() {
        let mut wire = connection_wire("c1", "svc-app-sub-prod", "app-1", "sub-prod", "res-1");
        wire.authorization
            .parameters
            .insert("authorityUrl".to_string(), "https://login.example.com".to_string());
        wire.data
            .insert("environment".to_string(), "production".to_string());
        wire.extra
            .insert("description".to_string(), serde_json::json!("hand-written"));

        let connections = MockConnections::with_store(vec![wire]);
        let reconciler = ConnectionReconciler::new(&connections);
        let subject = identity("id-1", "app-1", "svc-app", &[-5]);

        reconciler
            .upsert(&subject, &credential("fresh"), "sub-prod", "res-1", Mode::Apply)
            .await
            .unwrap();

        let stored = connections.stored_connection("svc-app-sub-prod").unwrap();
        assert_eq!(
            stored.wire.authorization.parameters.get("authorityUrl"),
            Some(&"https://login.example.com".to_string())
        );
        assert_eq!(stored.wire.data.get("environment"), Some(&"production".to_string()));
        assert_eq!(
            stored.wire.extra.get("description"),
            Some(&serde_json::json!("hand-written"))
        );
        assert_eq!(
            stored.wire.authorization.parameters.get(PARAM_PRINCIPAL_SECRET),
            Some(&"fresh".to_string())
        );
    }

    #[tokio::test]
    async fn test_preview_never_writes() {
        let connections = MockConnections::default();
        let reconciler = ConnectionReconciler::new(&connections);
        let subject = identity("id-1", "app-1", "svc-app", &[-5]);

        let outcome = reconciler
            .upsert(&subject, &credential("x"), "sub-prod", "res-1", Mode::Preview)
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Created);

        let existing = MockConnections::with_store(vec![connection_wire(
            "c1",
            "svc-app-sub-prod",
            "app-1",
            "sub-prod",
            "res-1",
        )]);
        let reconciler = ConnectionReconciler::new(&existing);
        let outcome = reconciler
            .upsert(&subject, &credential("x"), "sub-prod", "res-1", Mode::Preview)
            .await
            .unwrap();
        assert_eq!(outcome.action, ReconcileAction::Updated);

        assert_eq!(connections.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(connections.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(existing.update_calls.load(Ordering::SeqCst), 0);
        assert!(connections.stored().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_maps_to_reconcile_error() {
        let connections = MockConnections {
            fail_update_for: HashSet::from(["c1".to_string()]),
            ..MockConnections::with_store(vec![connection_wire(
                "c1",
                "svc-app-sub-prod",
                "app-1",
                "sub-prod",
                "res-1",
            )])
        };
        let reconciler = ConnectionReconciler::new(&connections);
        let subject = identity("id-1", "app-1", "svc-app", &[-5]);

        let err = reconciler
            .upsert(&subject, &credential("x"), "sub-prod", "res-1", Mode::Apply)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Reconcile { .. }));
    }
}

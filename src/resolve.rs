//! Resolution of dependent connections and the resources they bind to.

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Connection, Resource};
use crate::services::{ConnectionService, ResourceDirectory};

pub struct ConnectionResolver<'a> {
    connections: &'a dyn ConnectionService,
}

impl<'a> ConnectionResolver<'a> {
    pub fn new(connections: &'a dyn ConnectionService) -> Self {
        Self { connections }
    }

    /// Dependent connections of an identity, selected by exact equality of
    /// the stored authorization principal id against `app_id`. An empty
    /// result is not an error.
    pub async fn find_connections(&self, app_id: &str) -> Result<Vec<Connection>> {
        let records = self.connections.list_connections().await?;
        debug!("Connection service returned {} records", records.len());

        Ok(records
            .into_iter()
            .filter_map(Connection::from_wire)
            .filter(|conn| conn.bound_app_id == app_id)
            .collect())
    }

    /// The connection binding `(app_id, resource_name)`, if one exists.
    /// At most one is expected per pair; extras are reported and ignored.
    pub async fn find_binding(
        &self,
        app_id: &str,
        resource_name: &str,
    ) -> Result<Option<Connection>> {
        let mut matches: Vec<Connection> = self
            .find_connections(app_id)
            .await?
            .into_iter()
            .filter(|conn| conn.bound_resource_name == resource_name)
            .collect();

        if matches.len() > 1 {
            warn!(
                "{} connections bind ({}, {}); using '{}'",
                matches.len(),
                app_id,
                resource_name,
                matches[0].name
            );
            matches.truncate(1);
        }
        Ok(matches.pop())
    }
}

pub struct SubscriptionResolver<'a> {
    resources: &'a dyn ResourceDirectory,
}

impl<'a> SubscriptionResolver<'a> {
    pub fn new(resources: &'a dyn ResourceDirectory) -> Self {
        Self { resources }
    }

    /// Resolve a resource name to its directory record. Exact
    /// case-insensitive name match; `None` when the directory knows no such
    /// resource, which callers treat as a skip rather than a failure.
    pub async fn resolve(&self, name: &str) -> Result<Option<Resource>> {
        let candidates = self.resources.list_resources_by_name(name).await?;
        Ok(candidates
            .into_iter()
            .find(|resource| resource.name.eq_ignore_ascii_case(name)))
    }
}

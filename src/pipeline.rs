//! Orchestration of the scan → rotate → reconcile run.
//!
//! One logical worker drives identities sequentially, so "rotate once, then
//! fan out reconciliation" holds without cross-identity races. Failures are
//! isolated per identity and per connection; the run itself only aborts on
//! setup failures such as a failed directory listing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::enrich::OwnerEnricher;
use crate::error::Result;
use crate::models::ExpiringIdentity;
use crate::reconcile::ConnectionReconciler;
use crate::resolve::{ConnectionResolver, SubscriptionResolver};
use crate::rotate::{CredentialRotator, Mode};
use crate::scan::CredentialScanner;
use crate::services::{ConnectionService, DirectoryService, ResourceDirectory};

/// Terminal state of one identity's pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// Every dependent connection reconciled (or none existed).
    Done { reconciled: usize, skipped: usize },
    /// At least one connection failed while others went through.
    PartiallyFailed {
        reconciled: usize,
        skipped: usize,
        failed: usize,
    },
    /// Rotation or connection resolution failed; nothing was reconciled.
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct IdentityReport {
    pub display_name: String,
    pub expires: DateTime<Utc>,
    /// Whether a rotation was issued (or previewed) for this identity.
    pub rotated: bool,
    pub outcome: IdentityOutcome,
}

/// Aggregate counts for a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub identities: usize,
    pub rotated: usize,
    pub reconciled: usize,
    pub skipped_connections: usize,
    pub failed_connections: usize,
    pub failed_identities: usize,
    pub reports: Vec<IdentityReport>,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Display-name filter; empty matches every identity.
    pub pattern: String,
    pub threshold_days: u32,
    pub enrich_owners: bool,
    pub mode: Mode,
}

pub struct Pipeline {
    directory: Arc<dyn DirectoryService>,
    connections: Arc<dyn ConnectionService>,
    resources: Arc<dyn ResourceDirectory>,
    owner_workers: usize,
}

impl Pipeline {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        connections: Arc<dyn ConnectionService>,
        resources: Arc<dyn ResourceDirectory>,
        owner_workers: usize,
    ) -> Self {
        Self {
            directory,
            connections,
            resources,
            owner_workers,
        }
    }

    /// Run the full pipeline over every matching expiring identity.
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let scanner = CredentialScanner::new(self.directory.as_ref());
        let expiring = scanner
            .discover(&options.pattern, options.threshold_days)
            .await?;
        info!(
            "{} identities have credentials expiring within {} days",
            expiring.len(),
            options.threshold_days
        );

        let expiring = if options.enrich_owners {
            let mut enriched = OwnerEnricher::new(self.owner_workers)
                .enrich(Arc::clone(&self.directory), expiring)
                .await;
            // Enrichment order is unspecified; restore the scan order.
            enriched.sort_by(|a, b| a.identity.display_name.cmp(&b.identity.display_name));
            enriched
        } else {
            expiring
        };

        let mut summary = RunSummary {
            identities: expiring.len(),
            ..RunSummary::default()
        };

        for entry in &expiring {
            let report = self.process_identity(entry, options.mode).await;
            if report.rotated {
                summary.rotated += 1;
            }
            match &report.outcome {
                IdentityOutcome::Done { reconciled, skipped } => {
                    summary.reconciled += reconciled;
                    summary.skipped_connections += skipped;
                }
                IdentityOutcome::PartiallyFailed {
                    reconciled,
                    skipped,
                    failed,
                } => {
                    summary.reconciled += reconciled;
                    summary.skipped_connections += skipped;
                    summary.failed_connections += failed;
                }
                IdentityOutcome::Failed { .. } => summary.failed_identities += 1,
            }
            summary.reports.push(report);
        }

        Ok(summary)
    }

    /// Drive one identity to a terminal state. Never propagates an error;
    /// the outcome carries what happened.
    async fn process_identity(&self, entry: &ExpiringIdentity, mode: Mode) -> IdentityReport {
        let identity = &entry.identity;
        info!(
            "Processing {} (soonest credential expires {})",
            identity.display_name,
            entry.expires.format("%Y-%m-%d")
        );
        if !entry.owners.is_empty() {
            let owners: Vec<&str> = entry
                .owners
                .iter()
                .map(|o| o.principal_name.as_str())
                .collect();
            info!("  owned by: {}", owners.join(", "));
        }

        let report = |rotated, outcome| IdentityReport {
            display_name: identity.display_name.clone(),
            expires: entry.expires,
            rotated,
            outcome,
        };

        let resolver = ConnectionResolver::new(self.connections.as_ref());
        let dependents = match resolver.find_connections(&identity.app_id).await {
            Ok(dependents) => dependents,
            Err(err) => {
                warn!(
                    "Could not resolve connections for {}: {err}",
                    identity.display_name
                );
                return report(false, IdentityOutcome::Failed { reason: err.to_string() });
            }
        };

        if dependents.is_empty() {
            info!(
                "No dependent connections for {}; nothing to reconcile",
                identity.display_name
            );
            return report(
                false,
                IdentityOutcome::Done {
                    reconciled: 0,
                    skipped: 0,
                },
            );
        }

        // Rotate exactly once, then reuse the credential for every
        // dependent connection.
        let rotator = CredentialRotator::new(self.directory.as_ref());
        let credential = match rotator.rotate(identity, mode).await {
            Ok(credential) => credential,
            Err(err) => {
                warn!("{err}");
                return report(false, IdentityOutcome::Failed { reason: err.to_string() });
            }
        };

        let subscriptions = SubscriptionResolver::new(self.resources.as_ref());
        let reconciler = ConnectionReconciler::new(self.connections.as_ref());
        let (mut reconciled, mut skipped, mut failed) = (0usize, 0usize, 0usize);

        for conn in &dependents {
            let resource = match subscriptions.resolve(&conn.bound_resource_name).await {
                Ok(Some(resource)) => resource,
                Ok(None) => {
                    warn!(
                        "Resource '{}' not found; skipping connection {}",
                        conn.bound_resource_name, conn.name
                    );
                    skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(
                        "Resource lookup for '{}' failed: {err}",
                        conn.bound_resource_name
                    );
                    failed += 1;
                    continue;
                }
            };

            match reconciler
                .upsert(
                    identity,
                    &credential,
                    &conn.bound_resource_name,
                    &resource.id,
                    mode,
                )
                .await
            {
                Ok(_) => reconciled += 1,
                Err(err) => {
                    warn!("{err}");
                    failed += 1;
                }
            }
        }

        let outcome = if failed == 0 {
            IdentityOutcome::Done { reconciled, skipped }
        } else {
            IdentityOutcome::PartiallyFailed {
                reconciled,
                skipped,
                failed,
            }
        };
        report(true, outcome)
    }
}

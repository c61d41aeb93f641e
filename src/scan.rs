//! Discovery of identities whose credentials are about to expire.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ExpiringIdentity, Identity};
use crate::services::DirectoryService;

pub struct CredentialScanner<'a> {
    directory: &'a dyn DirectoryService,
}

impl<'a> CredentialScanner<'a> {
    pub fn new(directory: &'a dyn DirectoryService) -> Self {
        Self { directory }
    }

    /// Find identities whose soonest-expiring credential falls before
    /// `now + threshold_days` and which have no fresher credential already
    /// in place. Results are sorted by display name.
    ///
    /// A non-empty pattern that matches no identity at all is a fatal
    /// `NotFound`; a listing failure fails the whole call with no partial
    /// results.
    pub async fn discover(
        &self,
        pattern: &str,
        threshold_days: u32,
    ) -> Result<Vec<ExpiringIdentity>> {
        let threshold = Utc::now() + Duration::days(i64::from(threshold_days));
        info!(
            "Scanning for credentials expiring before {}",
            threshold.format("%Y-%m-%d")
        );

        let identities = self.directory.list_identities(true).await?;
        debug!("Directory returned {} identities", identities.len());

        if !pattern.is_empty()
            && !identities.iter().any(|i| matches_pattern(&i.display_name, pattern))
        {
            return Err(Error::NotFound {
                kind: "identity",
                name: pattern.to_string(),
            });
        }

        Ok(select_expiring(identities, pattern, threshold))
    }
}

/// Apply the expiring-credential rule against an explicit threshold instant.
///
/// An identity qualifies when at least one credential ends before the
/// threshold and none ends after it: a fresh credential alongside an old one
/// means rotation already happened. Identities without credentials never
/// qualify.
pub fn select_expiring(
    identities: Vec<Identity>,
    pattern: &str,
    threshold: DateTime<Utc>,
) -> Vec<ExpiringIdentity> {
    let mut selected: Vec<ExpiringIdentity> = identities
        .into_iter()
        .filter(|identity| matches_pattern(&identity.display_name, pattern))
        .filter_map(|identity| {
            let soonest = identity.credentials.iter().map(|c| c.end).min()?;
            let any_expiring = identity.credentials.iter().any(|c| c.is_expiring(threshold));
            let has_fresh = identity.credentials.iter().any(|c| c.end > threshold);
            if any_expiring && !has_fresh {
                Some(ExpiringIdentity {
                    identity,
                    expires: soonest,
                    owners: Vec::new(),
                })
            } else {
                None
            }
        })
        .collect();

    selected.sort_by(|a, b| a.identity.display_name.cmp(&b.identity.display_name));
    selected
}

/// An empty pattern matches every identity; callers rely on the no-filter
/// semantics. Otherwise a case-insensitive substring test.
fn matches_pattern(display_name: &str, pattern: &str) -> bool {
    pattern.is_empty() || display_name.to_lowercase().contains(&pattern.to_lowercase())
}

//! Credential rotation against the directory service.

use tracing::info;

use crate::error::{Error, Result};
use crate::models::{Identity, SecretValue};
use crate::services::DirectoryService;

/// Placeholder secret returned by preview rotations.
pub const PREVIEW_SECRET: &str = "preview-secret-not-issued";
/// Nil tenant id returned by preview rotations.
pub const NIL_TENANT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Whether mutating calls are performed or only previewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Apply,
}

impl Mode {
    pub fn from_apply(apply: bool) -> Self {
        if apply {
            Mode::Apply
        } else {
            Mode::Preview
        }
    }

    pub fn is_apply(self) -> bool {
        matches!(self, Mode::Apply)
    }
}

/// A freshly rotated credential, issued once per identity per run and
/// reused across every dependent connection.
#[derive(Debug, Clone)]
pub struct RotatedCredential {
    pub value: SecretValue,
    pub tenant_id: String,
}

pub struct CredentialRotator<'a> {
    directory: &'a dyn DirectoryService,
}

impl<'a> CredentialRotator<'a> {
    pub fn new(directory: &'a dyn DirectoryService) -> Self {
        Self { directory }
    }

    /// Issue a new credential for the identity, invalidating the previous
    /// one. In preview mode nothing is sent; a placeholder credential lets
    /// the rest of the pipeline run without side effects.
    pub async fn rotate(&self, identity: &Identity, mode: Mode) -> Result<RotatedCredential> {
        if !mode.is_apply() {
            info!("[preview] Would rotate credential for {}", identity.display_name);
            return Ok(RotatedCredential {
                value: SecretValue::new(PREVIEW_SECRET),
                tenant_id: NIL_TENANT_ID.to_string(),
            });
        }

        info!("Rotating credential for {}", identity.display_name);
        let issued = self
            .directory
            .reset_credential(&identity.id)
            .await
            .map_err(|source| Error::Rotation {
                identity: identity.display_name.clone(),
                source: Box::new(source),
            })?;

        // Some directory deployments omit the tenant on reset responses.
        let tenant_id = if issued.tenant_id.is_empty() {
            identity.tenant_id.clone()
        } else {
            issued.tenant_id
        };

        Ok(RotatedCredential {
            value: issued.value,
            tenant_id,
        })
    }
}

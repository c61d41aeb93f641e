use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Access token presented to every collaborator service.
    pub token: String,
    pub organization: OrganizationConfig,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub url: String,
    pub project: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub url: String,
    pub resources_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_threshold_days")]
    pub threshold_days: u32,
    #[serde(default = "default_owner_workers")]
    pub owner_workers: usize,
}

fn default_threshold_days() -> u32 {
    30
}

fn default_owner_workers() -> usize {
    8
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
            owner_workers: default_owner_workers(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let organization = OrganizationConfig {
            url: std::env::var("CREDROT_ORG_URL")
                .context("CREDROT_ORG_URL environment variable not set")?,
            project: std::env::var("CREDROT_PROJECT")
                .context("CREDROT_PROJECT environment variable not set")?,
        };

        let directory = DirectoryConfig {
            url: std::env::var("CREDROT_DIRECTORY_URL")
                .context("CREDROT_DIRECTORY_URL environment variable not set")?,
            resources_url: std::env::var("CREDROT_RESOURCES_URL")
                .context("CREDROT_RESOURCES_URL environment variable not set")?,
        };

        let rotation = RotationConfig {
            threshold_days: std::env::var("CREDROT_THRESHOLD_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_threshold_days),
            owner_workers: std::env::var("CREDROT_OWNER_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_owner_workers),
        };

        Ok(Self {
            token: std::env::var("CREDROT_TOKEN")
                .context("CREDROT_TOKEN environment variable not set")?,
            organization,
            directory,
            rotation,
        })
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample = Self {
            token: "your-access-token-here".to_string(),
            organization: OrganizationConfig {
                url: "https://ado.example.com/acme".to_string(),
                project: "Platform".to_string(),
            },
            directory: DirectoryConfig {
                url: "https://directory.example.com/v1".to_string(),
                resources_url: "https://resources.example.com/v1".to_string(),
            },
            rotation: RotationConfig::default(),
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Reject malformed settings before any remote call is made.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if !self.organization.url.starts_with("https://") {
            return Err(Error::Validation {
                field: "organization url",
                reason: format!("'{}' must start with https://", self.organization.url),
            });
        }
        if self.organization.project.trim().is_empty() {
            return Err(Error::Validation {
                field: "project",
                reason: "must not be empty".to_string(),
            });
        }
        if self.token.trim().is_empty() {
            return Err(Error::Validation {
                field: "token",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.directory.url.starts_with("https://") {
            return Err(Error::Validation {
                field: "directory url",
                reason: format!("'{}' must start with https://", self.directory.url),
            });
        }
        if !self.directory.resources_url.starts_with("https://") {
            return Err(Error::Validation {
                field: "resources url",
                reason: format!("'{}' must start with https://", self.directory.resources_url),
            });
        }
        Ok(())
    }
}

//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to
//! the appropriate handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::enrich::OwnerEnricher;
use crate::pipeline::{IdentityOutcome, Pipeline, RunOptions, RunSummary};
use crate::rotate::Mode;
use crate::scan::CredentialScanner;
use crate::services::{
    ConnectionClient, ConnectionService, DirectoryClient, DirectoryService, ResourceClient,
    ResourceDirectory,
};

#[derive(Parser)]
#[command(name = "credrot")]
#[command(about = "Rotates expiring identity credentials and reconciles dependent service connections", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CREDROT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Organization URL (overrides config file)
    #[arg(long, env = "CREDROT_ORG_URL")]
    pub organization: Option<String>,

    /// Project holding the connection records (overrides config file)
    #[arg(long, env = "CREDROT_PROJECT")]
    pub project: Option<String>,

    /// Access token (overrides config file)
    #[arg(long, env = "CREDROT_TOKEN")]
    pub token: Option<String>,

    /// Directory service URL (overrides config file)
    #[arg(long, env = "CREDROT_DIRECTORY_URL")]
    pub directory_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "rotator-config.toml")]
        output: PathBuf,
    },

    /// List identities whose credentials expire inside the threshold window
    Scan {
        /// Display-name filter; empty matches every identity
        #[arg(short, long, default_value = "")]
        pattern: String,

        /// Days ahead to treat a credential as expiring
        #[arg(short, long)]
        threshold_days: Option<u32>,

        /// Also look up and print each identity's owners
        #[arg(long)]
        owners: bool,
    },

    /// Rotate expiring credentials and reconcile dependent connections
    Rotate {
        /// Display-name filter; empty matches every identity
        #[arg(short, long, default_value = "")]
        pattern: String,

        /// Days ahead to treat a credential as expiring
        #[arg(short, long)]
        threshold_days: Option<u32>,

        /// Perform remote changes. Without this flag the run is a preview.
        #[arg(long)]
        apply: bool,

        /// Also look up owners for the run report
        #[arg(long)]
        owners: bool,
    },
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Handle init separately as it needs no configuration or clients
    if let Commands::Init { output } = cli.command {
        Config::create_sample(&output)
            .with_context(|| format!("Failed to create sample config at {:?}", output))?;
        info!("Sample configuration created at {:?}", output);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::from_env().context("Failed to load config from environment")?
    };

    // Override with CLI arguments if provided
    if let Some(url) = cli.organization {
        config.organization.url = url;
    }
    if let Some(project) = cli.project {
        config.organization.project = project;
    }
    if let Some(token) = cli.token {
        config.token = token;
    }
    if let Some(url) = cli.directory_url {
        config.directory.url = url;
    }

    // Setup validation failures are fatal before any remote call
    config.validate()?;

    let directory: Arc<dyn DirectoryService> =
        Arc::new(DirectoryClient::new(&config.directory.url, &config.token)?);
    let connections: Arc<dyn ConnectionService> = Arc::new(ConnectionClient::new(
        &config.organization.url,
        &config.organization.project,
        &config.token,
    )?);
    let resources: Arc<dyn ResourceDirectory> = Arc::new(ResourceClient::new(
        &config.directory.resources_url,
        &config.token,
    )?);

    match cli.command {
        Commands::Init { .. } => unreachable!(), // Handled above

        Commands::Scan {
            pattern,
            threshold_days,
            owners,
        } => {
            let threshold_days = threshold_days.unwrap_or(config.rotation.threshold_days);
            let scanner = CredentialScanner::new(directory.as_ref());
            let mut expiring = scanner
                .discover(&pattern, threshold_days)
                .await
                .context("Failed to scan for expiring credentials")?;

            if owners {
                expiring = OwnerEnricher::new(config.rotation.owner_workers)
                    .enrich(Arc::clone(&directory), expiring)
                    .await;
                expiring.sort_by(|a, b| a.identity.display_name.cmp(&b.identity.display_name));
            }

            if expiring.is_empty() {
                println!("No credentials expire within {} days", threshold_days);
            } else {
                println!(
                    "Identities with credentials expiring within {} days:",
                    threshold_days
                );
                for entry in &expiring {
                    println!(
                        "  - {} (app {}) expires {}",
                        entry.identity.display_name,
                        entry.identity.app_id,
                        entry.expires.format("%Y-%m-%d")
                    );
                    for owner in &entry.owners {
                        println!("      owner: {}", owner.principal_name);
                    }
                }
            }
        }

        Commands::Rotate {
            pattern,
            threshold_days,
            apply,
            owners,
        } => {
            let mode = Mode::from_apply(apply);
            if !mode.is_apply() {
                println!("Preview run: no changes will be applied (pass --apply to rotate)");
            }

            let pipeline = Pipeline::new(
                directory,
                connections,
                resources,
                config.rotation.owner_workers,
            );
            let summary = pipeline
                .run(&RunOptions {
                    pattern,
                    threshold_days: threshold_days.unwrap_or(config.rotation.threshold_days),
                    enrich_owners: owners,
                    mode,
                })
                .await
                .context("Rotation run failed during setup")?;

            print_summary(&summary, mode);
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, mode: Mode) {
    println!();
    for report in &summary.reports {
        match &report.outcome {
            IdentityOutcome::Done {
                reconciled: 0,
                skipped: 0,
            } if !report.rotated => {
                println!("- {}: no dependent connections, skipped", report.display_name);
            }
            IdentityOutcome::Done { reconciled, skipped } => {
                let skipped_note = if *skipped > 0 {
                    format!(", {} skipped", skipped)
                } else {
                    String::new()
                };
                println!(
                    "✓ {}: {} connection(s) reconciled{}",
                    report.display_name, reconciled, skipped_note
                );
            }
            IdentityOutcome::PartiallyFailed {
                reconciled, failed, ..
            } => {
                println!(
                    "⚠ {}: {} connection(s) reconciled, {} failed",
                    report.display_name, reconciled, failed
                );
            }
            IdentityOutcome::Failed { reason } => {
                println!("✗ {}: {}", report.display_name, reason);
            }
        }
    }

    let verb = if mode.is_apply() { "Rotated" } else { "Would rotate" };
    println!(
        "\n{} {} of {} identities; {} connection(s) reconciled, {} skipped, {} failed",
        verb,
        summary.rotated,
        summary.identities,
        summary.reconciled,
        summary.skipped_connections,
        summary.failed_connections
    );
    if summary.failed_identities > 0 {
        println!("{} identities failed; see warnings above", summary.failed_identities);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One diagnostics pass against a freshly seeded dry-run tenant.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use autoreel_core::application::diagnostics::{CheckStatus, DiagnosticsReport, HealthStatus};
use autoreel_core::domain::config::OrchestratorConfigManifest;

use crate::embedded::EmbeddedHost;

#[derive(Args)]
pub struct DiagnoseArgs {
    /// Tenant to diagnose (default: first configured)
    #[arg(long)]
    pub tenant: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: DiagnoseArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let report = diagnose(config, args.tenant.as_deref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub async fn diagnose(config: OrchestratorConfigManifest, tenant: Option<&str>) -> Result<DiagnosticsReport> {
    let host = EmbeddedHost::new(config, true)?;
    let orchestrator = match tenant {
        Some(id) => host
            .orchestrator(id)
            .with_context(|| format!("Unknown tenant '{}'", id))?,
        None => host
            .orchestrators()
            .first()
            .context("No tenants configured")?,
    };
    orchestrator.initialize().await?;
    Ok(orchestrator.trigger_diagnostics().await)
}

fn print_report(report: &DiagnosticsReport) {
    let status = match report.status {
        HealthStatus::Healthy => report.status.to_string().green(),
        HealthStatus::Degraded => report.status.to_string().yellow(),
        HealthStatus::Critical => report.status.to_string().red(),
    };
    println!("{} {}", "Health:".bold(), status.bold());
    println!();

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "✓".green(),
            CheckStatus::Warn => "!".yellow(),
            CheckStatus::Fail => "✗".red(),
        };
        println!("  {} {:<24} {}", marker, check.name, check.detail.dimmed());
    }
    println!();
    println!(
        "{} passed, {} warnings, {} failed",
        report.count(CheckStatus::Pass),
        report.count(CheckStatus::Warn),
        report.count(CheckStatus::Fail)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_diagnose_fresh_tenant_runs_every_check() {
        let report = diagnose(OrchestratorConfigManifest::default(), None).await.unwrap();
        assert_eq!(report.checks.len(), 10);
        assert!(report.checks.iter().any(|c| c.name == "population_health"));
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let err = diagnose(OrchestratorConfigManifest::default(), Some("ghost"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}

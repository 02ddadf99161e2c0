// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use autoreel_core::domain::config::OrchestratorConfigManifest;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./autoreel-config.yaml)
        #[arg(short, long, default_value = "./autoreel-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AUTOREEL_CONFIG_PATH: {}",
            std::env::var("AUTOREEL_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./autoreel-config.yaml");
        println!("  4. ~/.autoreel/config.yaml");
        println!("  5. /etc/autoreel/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    if spec.start_paused {
        println!("  {}", "Starts paused".yellow());
    }
    println!();

    println!("{}", "Tenants:".bold());
    for tenant in &spec.tenants {
        println!(
            "  {} (UTC{:+}, burst from {:02}:00, {} agents per variant)",
            tenant.id.bold(),
            tenant.utc_offset_hours,
            tenant.burst_hour,
            tenant.agents_per_variant
        );
        for brand in &tenant.brands {
            let platforms: Vec<&str> = brand.platforms.iter().map(String::as_str).collect();
            println!(
                "    - {}: {} reels + {} posts/day, offset +{}h → {}",
                brand.name,
                brand.reels_per_day,
                brand.posts_per_day,
                brand.hour_offset,
                platforms.join(", ")
            );
        }
    }
    println!();

    println!("{}", "Dispatch:".bold());
    println!("  Max concurrent jobs: {}", spec.dispatch.max_concurrent_jobs);
    println!("  Stagger: {}", humanize(spec.dispatch.stagger));
    println!("  Job timeout: {}", humanize(spec.dispatch.job_timeout));
    println!(
        "  Quality gate: score ≥ {}, {} regeneration(s)",
        spec.quality_gate.min_composite_score, spec.quality_gate.max_regenerations
    );
    println!();

    println!("{}", "Quotas:".bold());
    for (service, quota) in &spec.quotas.services {
        println!(
            "  {}: {} per {:?} window, {:.0}% reserved",
            service,
            quota.limit,
            quota.window,
            quota.reserved_fraction * 100.0
        );
    }
    for (operation, service) in &spec.quotas.operation_services {
        println!("  {} → {}", operation, service);
    }
    println!();

    println!("{}", "Cadences:".bold());
    let cadences = &spec.cadences;
    for (name, interval) in [
        ("check", cadences.check),
        ("publish", cadences.publish),
        ("observe", cadences.observe),
        ("scout", cadences.scout),
        ("feedback", cadences.feedback),
        ("evolution check", cadences.evolution_check),
        ("diagnostics", cadences.diagnostics),
        ("bootstrap", cadences.bootstrap),
        ("healing", cadences.healing),
    ] {
        println!("  {:<16} every {}", name, humanize(interval));
    }
    println!(
        "  Selection: {} {:02}:00 local",
        spec.evolution.weekday, spec.evolution.hour
    );
    println!();

    Ok(())
}

fn humanize(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s % 3600 == 0 && s > 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 && s > 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

pub(crate) fn template(with_examples: bool) -> &'static str {
    if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    }
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    std::fs::write(output, template(with_examples))
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_templates_are_valid_manifests() {
        for with_examples in [false, true] {
            let config = OrchestratorConfigManifest::from_yaml_str(template(with_examples)).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_examples_template_fields() {
        let config = OrchestratorConfigManifest::from_yaml_str(template(true)).unwrap();
        let tenant = &config.spec.tenants[0];
        assert_eq!(tenant.utc_offset_hours, -5);
        assert_eq!(tenant.brands.len(), 2);
        assert_eq!(tenant.brands[1].hour_offset, 1);
        assert_eq!(config.spec.cadences.observe, std::time::Duration::from_secs(3 * 3600));
        assert_eq!(config.spec.evolution.weekday, chrono::Weekday::Sun);
        let metrics = config.spec.observability.unwrap().metrics.unwrap();
        assert_eq!(metrics.port, 9464);
        assert_eq!(config.spec.quotas.operation_services["examine"], "llm");
        assert_eq!(config.spec.quotas.services["llm"].limit, 300);
    }

    #[tokio::test]
    async fn test_generate_then_validate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autoreel-config.yaml");

        generate(&path, false).await.unwrap();
        validate(Some(path.clone())).await.unwrap();

        let config = OrchestratorConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(config.spec.tenants[0].brands[0].name, "northwind");
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        let yaml = template(false).replace("burst_hour: 6", "burst_hour: 30");
        std::fs::write(&path, yaml).unwrap();

        let err = validate(Some(path)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("burst_hour"));
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(std::time::Duration::from_secs(600)), "10m");
        assert_eq!(humanize(std::time::Duration::from_secs(7200)), "2h");
        assert_eq!(humanize(std::time::Duration::from_secs(5)), "5s");
    }
}

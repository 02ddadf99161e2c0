// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run the orchestrator until Ctrl-C.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use autoreel_core::domain::config::{MetricsConfig, OrchestratorConfigManifest};

use crate::embedded::EmbeddedHost;

#[derive(Args)]
pub struct RunArgs {
    /// Use offline adapters: template generation, simulated rendering and a
    /// publisher that only logs
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    if let Some(metrics) = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled)
    {
        install_metrics_exporter(metrics)?;
    }

    let host = EmbeddedHost::new(config, args.dry_run)?;
    host.initialize().await?;

    let scheduler = host.scheduler();
    let events = host.spawn_event_logger(scheduler.shutdown_token());
    scheduler.start();

    println!(
        "{}",
        format!(
            "✓ autoreel running {} tenant(s) in dry-run mode. Press Ctrl-C to stop.",
            host.orchestrators().len()
        )
        .green()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown requested");
    scheduler.shutdown().await;
    if let Err(e) = events.await {
        warn!(error = %e, "Event logger ended abnormally");
    }
    println!("{}", "✓ Stopped".green());
    Ok(())
}

fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

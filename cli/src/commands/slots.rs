// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Print upcoming publish slots for a brand.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use autoreel_core::domain::config::{OrchestratorConfigManifest, TenantConfig};
use autoreel_core::domain::proposal::{ContentType, ContentVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SlotKind {
    /// Reel slot for light content
    Light,
    /// Reel slot for dark content
    Dark,
    /// Static post slot
    Post,
}

impl SlotKind {
    fn content(self) -> (ContentType, ContentVariant) {
        match self {
            SlotKind::Light => (ContentType::Reel, ContentVariant::Light),
            SlotKind::Dark => (ContentType::Reel, ContentVariant::Dark),
            // posts ignore the variant
            SlotKind::Post => (ContentType::Post, ContentVariant::Light),
        }
    }
}

#[derive(Args)]
pub struct SlotsArgs {
    /// Brand name
    #[arg(long)]
    pub brand: String,

    #[arg(long, value_enum, default_value = "light")]
    pub variant: SlotKind,

    /// Number of slots to print
    #[arg(long, default_value_t = 6)]
    pub count: usize,
}

pub async fn execute(args: SlotsArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let (tenant, slots) = upcoming(&config, &args.brand, args.variant, args.count, Utc::now())?;

    println!(
        "{}",
        format!("Upcoming {:?} slots for {} ({})", args.variant, args.brand, tenant.id)
            .to_lowercase()
            .bold()
    );
    for (i, slot) in slots.iter().enumerate() {
        println!(
            "  {:>2}. {}  {}",
            i + 1,
            slot.to_rfc3339(),
            format!("local {}", tenant.local_time(*slot).format("%a %H:%M")).dimmed()
        );
    }
    Ok(())
}

/// Next `count` free slots for `brand`, assuming nothing is scheduled yet.
pub fn upcoming<'a>(
    config: &'a OrchestratorConfigManifest,
    brand: &str,
    kind: SlotKind,
    count: usize,
    after: DateTime<Utc>,
) -> Result<(&'a TenantConfig, Vec<DateTime<Utc>>)> {
    let tenant = config
        .spec
        .tenants
        .iter()
        .find(|t| t.brands.iter().any(|b| b.name == brand))
        .with_context(|| format!("No tenant has a brand named '{}'", brand))?;

    let (content_type, variant) = kind.content();
    let slots = config
        .spec
        .slots
        .allocator(&tenant.brands)
        .upcoming(brand, content_type, variant, after, count)?;
    Ok((tenant, slots))
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - tenants, their brands and daily targets
// - job dispatch limits and the quality gate
// - external API quotas
// - cycle cadences and evolution parameters
// - slot pattern, healing, diagnostics, bootstrap research
// - logging and metrics exposition

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::DEFAULT_STRATEGIES;
use crate::domain::cycle::CycleKind;
use crate::domain::quota::{
    QuotaGovernor, ServiceQuota, DEFAULT_HIGH_PRIORITY_OPERATIONS, OP_CONTENT_GENERATION, OP_EXAMINE,
    OP_PUBLISH,
};
use crate::domain::slots::{default_reel_pattern, BrandSlots, SlotAllocator, SlotHour, DEFAULT_HORIZON_DAYS};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "OrchestratorConfig";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid apiVersion: '{0}'. Must be '100monkeys.ai/v1'")]
    ApiVersion(String),

    #[error("Invalid kind: '{0}'. Must be 'OrchestratorConfig'")]
    Kind(String),

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Top-level orchestrator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: OrchestratorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigSpec {
    pub tenants: Vec<TenantConfig>,

    /// Start every tenant paused (bursts suppressed) regardless of persisted state.
    #[serde(default)]
    pub start_paused: bool,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub quality_gate: QualityGateConfig,

    #[serde(default)]
    pub quotas: QuotaConfig,

    #[serde(default)]
    pub cadences: CadenceConfig,

    #[serde(default)]
    pub evolution: EvolutionConfig,

    #[serde(default)]
    pub slots: SlotConfig,

    #[serde(default)]
    pub healing: HealingConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,

    /// Offset of the tenant's local day from UTC, in hours.
    #[serde(default)]
    pub utc_offset_hours: i32,

    /// Local hour from which the daily burst may run.
    #[serde(default = "default_burst_hour")]
    pub burst_hour: u32,

    /// Agents seeded per content variant when the tenant has none.
    #[serde(default = "default_agents_per_variant")]
    pub agents_per_variant: usize,

    pub brands: Vec<BrandConfig>,
}

impl TenantConfig {
    /// Wall-clock time in the tenant's local day.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        (now + chrono::Duration::hours(i64::from(self.utc_offset_hours))).naive_utc()
    }

    /// UTC instant of the most recent local midnight at or before `now`.
    pub fn local_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = self.local_time(now).date().and_time(NaiveTime::MIN);
        midnight.and_utc() - chrono::Duration::hours(i64::from(self.utc_offset_hours))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub name: String,

    #[serde(default)]
    pub hour_offset: u32,

    #[serde(default = "default_platforms")]
    pub platforms: BTreeSet<String>,

    #[serde(default = "default_reels_per_day")]
    pub reels_per_day: usize,

    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: usize,

    #[serde(default = "default_post_offset_hours")]
    pub post_offset_hours: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_date: Option<DateTime<Utc>>,
}

impl BrandConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hour_offset: 0,
            platforms: default_platforms(),
            reels_per_day: default_reels_per_day(),
            posts_per_day: default_posts_per_day(),
            post_offset_hours: default_post_offset_hours(),
            launch_date: None,
        }
    }

    pub fn slots(&self) -> BrandSlots {
        BrandSlots {
            hour_offset: self.hour_offset,
            posts_per_day: self.posts_per_day,
            post_offset_hours: self.post_offset_hours,
            launch_date: self.launch_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_concurrent_jobs: usize,

    #[serde(with = "humantime_serde")]
    pub stagger: Duration,

    #[serde(with = "humantime_serde")]
    pub job_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            stagger: Duration::from_secs(5),
            job_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateConfig {
    /// Regenerations allowed per slot after a rejection.
    pub max_regenerations: u32,

    /// Pass threshold used by the built-in heuristic examiner.
    pub min_composite_score: f64,

    #[serde(default)]
    pub banned_phrases: Vec<String>,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            max_regenerations: 1,
            min_composite_score: 6.0,
            banned_phrases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub services: BTreeMap<String, ServiceQuota>,

    pub high_priority_operations: Vec<String>,

    /// Service each pipeline operation is charged against.
    pub operation_services: BTreeMap<String, String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            services: BTreeMap::from([
                ("meta".to_string(), ServiceQuota::hourly(200)),
                ("search".to_string(), ServiceQuota::daily(100)),
                ("llm".to_string(), ServiceQuota::hourly(300)),
            ]),
            high_priority_operations: DEFAULT_HIGH_PRIORITY_OPERATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            operation_services: BTreeMap::from([
                (OP_CONTENT_GENERATION.to_string(), "llm".to_string()),
                (OP_EXAMINE.to_string(), "llm".to_string()),
                (OP_PUBLISH.to_string(), "meta".to_string()),
            ]),
        }
    }
}

impl QuotaConfig {
    pub fn governor(&self) -> QuotaGovernor {
        QuotaGovernor::new(self.services.clone(), self.high_priority_operations.iter().cloned())
            .with_routes(self.operation_services.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    #[serde(with = "humantime_serde")]
    pub check: Duration,
    #[serde(with = "humantime_serde")]
    pub publish: Duration,
    #[serde(with = "humantime_serde")]
    pub observe: Duration,
    #[serde(with = "humantime_serde")]
    pub scout: Duration,
    #[serde(with = "humantime_serde")]
    pub feedback: Duration,
    /// How often the weekly evolution slot is checked for.
    #[serde(with = "humantime_serde")]
    pub evolution_check: Duration,
    #[serde(with = "humantime_serde")]
    pub diagnostics: Duration,
    #[serde(with = "humantime_serde")]
    pub bootstrap: Duration,
    #[serde(with = "humantime_serde")]
    pub healing: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        Self {
            check: minutes(10),
            publish: minutes(5),
            observe: minutes(180),
            scout: minutes(240),
            feedback: minutes(360),
            evolution_check: minutes(60),
            diagnostics: minutes(240),
            bootstrap: minutes(20),
            healing: minutes(15),
        }
    }
}

impl CadenceConfig {
    pub fn interval(&self, kind: CycleKind) -> Duration {
        match kind {
            CycleKind::Check => self.check,
            CycleKind::Publish => self.publish,
            CycleKind::Observe => self.observe,
            CycleKind::Scout => self.scout,
            CycleKind::Feedback => self.feedback,
            CycleKind::Evolution => self.evolution_check,
            CycleKind::Diagnostics => self.diagnostics,
            CycleKind::Bootstrap => self.bootstrap,
            CycleKind::Healing => self.healing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub strategies: Vec<String>,

    // Feedback
    pub feedback_min_age_hours: i64,
    pub feedback_max_age_hours: i64,

    // Adaptation
    pub learning_rate: f64,
    pub temperature_step: f64,
    pub min_samples: usize,
    pub full_confidence_samples: usize,

    // Selection
    pub weekday: Weekday,
    pub hour: u32,
    pub thriving_fraction: f64,
    pub struggling_fraction: f64,
    pub retire_after_runs: u32,
    pub inherit_probability: f64,
    pub mutation_noise: f64,
    pub max_gene_pool: usize,
    pub min_population_for_selection: usize,

    pub patterns: PatternConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            strategies: DEFAULT_STRATEGIES.iter().map(|s| s.to_string()).collect(),
            feedback_min_age_hours: 48,
            feedback_max_age_hours: 72,
            learning_rate: 0.2,
            temperature_step: 0.05,
            min_samples: 3,
            full_confidence_samples: 20,
            weekday: Weekday::Sun,
            hour: 3,
            thriving_fraction: 0.4,
            struggling_fraction: 0.2,
            retire_after_runs: 2,
            inherit_probability: 0.8,
            mutation_noise: 0.05,
            max_gene_pool: 50,
            min_population_for_selection: 3,
            patterns: PatternConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// `k` in `confidence = n / (n + k)`.
    pub confidence_k: f64,
    pub half_life_days: f64,
    pub min_confidence: f64,
    pub max_age_days: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            confidence_k: 10.0,
            half_life_days: 14.0,
            min_confidence: 0.3,
            max_age_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub reel_pattern: Vec<SlotHour>,
    pub horizon_days: u32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            reel_pattern: default_reel_pattern(),
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

impl SlotConfig {
    /// Allocator for one tenant's brands.
    pub fn allocator(&self, brands: &[BrandConfig]) -> SlotAllocator {
        let brands = brands.iter().map(|b| (b.name.clone(), b.slots())).collect();
        SlotAllocator::new(self.reel_pattern.clone(), brands).with_horizon_days(self.horizon_days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub max_auto_retries: u32,
    /// Entries still `Publishing` after this long are put back on the schedule.
    #[serde(with = "humantime_serde")]
    pub publish_timeout: Duration,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_auto_retries: 3,
            publish_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Environment variables holding API keys; missing ones produce a warning.
    pub required_env_vars: Vec<String>,
    pub min_active_agents: usize,
    #[serde(with = "humantime_serde")]
    pub evolution_stale_after: Duration,
    pub publish_failure_warn_ratio: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            required_env_vars: Vec::new(),
            min_active_agents: 2,
            evolution_stale_after: Duration::from_secs(8 * 24 * 3600),
            publish_failure_warn_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub metrics_service: String,
    pub trend_service: String,
    pub trend_kinds: Vec<String>,
    pub trend_limit: usize,
    #[serde(with = "humantime_serde")]
    pub metrics_lookback: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            metrics_service: "meta".to_string(),
            trend_service: "search".to_string(),
            trend_kinds: vec!["topic".to_string()],
            trend_limit: 20,
            metrics_lookback: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub enabled: bool,
    pub calls_per_tick: u32,
    /// Stop once this many performance records exist.
    pub maturity_threshold: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calls_per_tick: 3,
            maturity_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_burst_hour() -> u32 {
    6
}

fn default_agents_per_variant() -> usize {
    3
}

fn default_platforms() -> BTreeSet<String> {
    BTreeSet::from(["instagram".to_string(), "facebook".to_string()])
}

fn default_reels_per_day() -> usize {
    6
}

fn default_posts_per_day() -> usize {
    2
}

fn default_post_offset_hours() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9464
}

/// Convert a configured std duration for chrono arithmetic, saturating.
pub fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

impl Default for OrchestratorConfigSpec {
    fn default() -> Self {
        Self {
            tenants: vec![TenantConfig {
                id: "default".to_string(),
                utc_offset_hours: 0,
                burst_hour: default_burst_hour(),
                agents_per_variant: default_agents_per_variant(),
                brands: vec![BrandConfig::new("northwind")],
            }],
            start_paused: false,
            dispatch: DispatchConfig::default(),
            quality_gate: QualityGateConfig::default(),
            quotas: QuotaConfig::default(),
            cadences: CadenceConfig::default(),
            evolution: EvolutionConfig::default(),
            slots: SlotConfig::default(),
            healing: HealingConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            research: ResearchConfig::default(),
            bootstrap: BootstrapConfig::default(),
            observability: None,
        }
    }
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "autoreel".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: OrchestratorConfigSpec::default(),
        }
    }
}

impl OrchestratorConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AUTOREEL_CONFIG_PATH environment variable
    /// 2. ./autoreel-config.yaml (working directory)
    /// 3. ~/.autoreel/config.yaml (user home)
    /// 4. /etc/autoreel/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AUTOREEL_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./autoreel-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".autoreel").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/autoreel/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AUTOREEL_MAX_CONCURRENT_JOBS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: AUTOREEL_MAX_CONCURRENT_JOBS={}", n);
                    self.spec.dispatch.max_concurrent_jobs = n;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AUTOREEL_MAX_CONCURRENT_JOBS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("AUTOREEL_PAUSED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: AUTOREEL_PAUSED=true");
                    self.spec.start_paused = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: AUTOREEL_PAUSED=false");
                    self.spec.start_paused = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AUTOREEL_PAUSED: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::ApiVersion(self.api_version.clone()));
        }
        if self.kind != KIND {
            return Err(ConfigError::Kind(self.kind.clone()));
        }
        if self.metadata.name.is_empty() {
            return Err(invalid("metadata.name", "cannot be empty"));
        }

        let spec = &self.spec;
        if spec.tenants.is_empty() {
            return Err(invalid("spec.tenants", "at least one tenant is required"));
        }
        let mut tenant_ids = BTreeSet::new();
        for tenant in &spec.tenants {
            if tenant.id.is_empty() {
                return Err(invalid("spec.tenants[].id", "cannot be empty"));
            }
            if !tenant_ids.insert(tenant.id.as_str()) {
                return Err(invalid("spec.tenants[].id", format!("duplicate tenant '{}'", tenant.id)));
            }
            if tenant.burst_hour > 23 {
                return Err(invalid(
                    format!("tenant '{}' burst_hour", tenant.id),
                    "must be 0-23",
                ));
            }
            if !(-12..=14).contains(&tenant.utc_offset_hours) {
                return Err(invalid(
                    format!("tenant '{}' utc_offset_hours", tenant.id),
                    "must be between -12 and 14",
                ));
            }
            if tenant.brands.is_empty() {
                return Err(invalid(
                    format!("tenant '{}' brands", tenant.id),
                    "at least one brand is required",
                ));
            }
            let mut brand_names = BTreeSet::new();
            for brand in &tenant.brands {
                if brand.name.is_empty() {
                    return Err(invalid(format!("tenant '{}' brand name", tenant.id), "cannot be empty"));
                }
                if !brand_names.insert(brand.name.as_str()) {
                    return Err(invalid(
                        format!("tenant '{}' brands", tenant.id),
                        format!("duplicate brand '{}'", brand.name),
                    ));
                }
                if brand.hour_offset > 23 {
                    return Err(invalid(format!("brand '{}' hour_offset", brand.name), "must be 0-23"));
                }
                if brand.platforms.is_empty() {
                    return Err(invalid(
                        format!("brand '{}' platforms", brand.name),
                        "at least one platform is required",
                    ));
                }
            }
        }

        if spec.dispatch.max_concurrent_jobs == 0 {
            return Err(invalid("spec.dispatch.max_concurrent_jobs", "must be at least 1"));
        }

        for (service, quota) in &spec.quotas.services {
            if quota.limit == 0 {
                return Err(invalid(format!("spec.quotas.services.{}.limit", service), "must be at least 1"));
            }
            if !(0.0..=1.0).contains(&quota.reserved_fraction) {
                return Err(invalid(
                    format!("spec.quotas.services.{}.reserved_fraction", service),
                    "must be within [0, 1]",
                ));
            }
        }

        let evo = &spec.evolution;
        if evo.strategies.is_empty() {
            return Err(invalid("spec.evolution.strategies", "at least one strategy is required"));
        }
        if evo.feedback_min_age_hours >= evo.feedback_max_age_hours {
            return Err(invalid(
                "spec.evolution.feedback_min_age_hours",
                "must be below feedback_max_age_hours",
            ));
        }
        for (name, value) in [
            ("thriving_fraction", evo.thriving_fraction),
            ("struggling_fraction", evo.struggling_fraction),
            ("inherit_probability", evo.inherit_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("spec.evolution.{}", name), "must be within [0, 1]"));
            }
        }
        if evo.thriving_fraction + evo.struggling_fraction > 1.0 {
            return Err(invalid(
                "spec.evolution",
                "thriving_fraction + struggling_fraction cannot exceed 1",
            ));
        }
        if evo.hour > 23 {
            return Err(invalid("spec.evolution.hour", "must be 0-23"));
        }
        if evo.full_confidence_samples == 0 {
            return Err(invalid("spec.evolution.full_confidence_samples", "must be at least 1"));
        }

        if spec.slots.reel_pattern.is_empty() {
            return Err(invalid("spec.slots.reel_pattern", "cannot be empty"));
        }
        if spec.slots.reel_pattern.iter().any(|s| s.hour > 23) {
            return Err(invalid("spec.slots.reel_pattern", "hours must be 0-23"));
        }

        for kind in CycleKind::ALL {
            if spec.cadences.interval(kind).is_zero() {
                return Err(invalid(format!("spec.cadences.{}", kind), "must be non-zero"));
            }
        }
        if spec.healing.publish_timeout.is_zero() {
            return Err(invalid("spec.healing.publish_timeout", "must be non-zero"));
        }

        Ok(())
    }
}

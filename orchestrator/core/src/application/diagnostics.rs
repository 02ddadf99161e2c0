// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Diagnostics
//!
//! A battery of ten independent self-tests. Each check reports `Pass`, `Warn`
//! or `Fail` with a human-readable detail; a check that errors internally
//! reports `Fail` instead of aborting the battery.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::repository_factory::Repositories;
use crate::domain::config::{chrono_duration, CadenceConfig, DiagnosticsConfig};
use crate::domain::cycle::CycleKind;
use crate::domain::job::JobStatus;
use crate::domain::proposal::{ContentVariant, ProposalStatus};
use crate::domain::publisher::PublishErrorKind;
use crate::domain::schedule::EntryStatus;

const THROUGHPUT_WINDOW_HOURS: i64 = 48;

/// Cycles that may legitimately go quiet: evolution is weekly, diagnostics is
/// the caller, bootstrap disables itself.
const STALENESS_EXEMPT: &[CycleKind] = &[CycleKind::Evolution, CycleKind::Diagnostics, CycleKind::Bootstrap];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded => f.write_str("degraded"),
            HealthStatus::Critical => f.write_str("critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Pass, detail)
    }

    fn warn(name: &str, detail: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Warn, detail)
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self::with(name, CheckStatus::Fail, detail)
    }

    fn with(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub status: HealthStatus,
    pub checks: Vec<CheckResult>,
    pub ran_at: DateTime<Utc>,
}

impl DiagnosticsReport {
    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

/// `Healthy` with no fails and fewer than three warns, `Critical` from three
/// fails, `Degraded` otherwise.
pub fn aggregate(checks: &[CheckResult]) -> HealthStatus {
    let fails = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
    let warns = checks.iter().filter(|c| c.status == CheckStatus::Warn).count();
    if fails >= 3 {
        HealthStatus::Critical
    } else if fails == 0 && warns < 3 {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

/// Orchestrator state the checks need beyond the repositories.
#[derive(Debug, Clone)]
pub struct DiagnosticsContext {
    pub started_at: DateTime<Utc>,
    pub last_runs: HashMap<CycleKind, DateTime<Utc>>,
    /// Last time selection actually ran (not just the hourly check).
    pub last_evolution: Option<DateTime<Utc>>,
}

impl DiagnosticsContext {
    pub fn fresh(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_runs: HashMap::new(),
            last_evolution: None,
        }
    }
}

pub struct DiagnosticsService {
    repos: Repositories,
    config: DiagnosticsConfig,
    cadences: CadenceConfig,
    job_timeout: Duration,
    publish_timeout: Duration,
}

fn or_fail(name: &str, result: Result<CheckResult>) -> CheckResult {
    result.unwrap_or_else(|e| CheckResult::fail(name, format!("check errored: {:#}", e)))
}

impl DiagnosticsService {
    pub fn new(
        repos: Repositories,
        config: DiagnosticsConfig,
        cadences: CadenceConfig,
        job_timeout: std::time::Duration,
        publish_timeout: std::time::Duration,
    ) -> Self {
        Self {
            repos,
            config,
            cadences,
            job_timeout: chrono_duration(job_timeout),
            publish_timeout: chrono_duration(publish_timeout),
        }
    }

    pub async fn run(&self, ctx: &DiagnosticsContext, now: DateTime<Utc>) -> DiagnosticsReport {
        let (connectivity, population, dna, throughput, liveness, evolution, publish, consistency) = futures::join!(
            self.check_connectivity(),
            self.check_population(),
            self.check_dna(),
            self.check_throughput(now),
            self.check_liveness(now),
            self.check_evolution(ctx, now),
            self.check_publish_pipeline(now),
            self.check_consistency(),
        );

        let checks = vec![
            or_fail("connectivity", connectivity),
            or_fail("population_health", population),
            or_fail("dna_validity", dna),
            or_fail("pipeline_throughput", throughput),
            or_fail("scheduler_liveness", liveness),
            or_fail("evolution_freshness", evolution),
            self.check_api_keys(),
            or_fail("publish_pipeline", publish),
            self.check_cycle_staleness(ctx, now),
            or_fail("referential_consistency", consistency),
        ];

        let status = aggregate(&checks);
        for check in checks.iter().filter(|c| c.status != CheckStatus::Pass) {
            warn!(check = %check.name, status = ?check.status, detail = %check.detail, "Diagnostic check not passing");
        }
        info!(%status, "Diagnostics complete");
        DiagnosticsReport {
            status,
            checks,
            ran_at: now,
        }
    }

    async fn check_connectivity(&self) -> Result<CheckResult> {
        const NAME: &str = "connectivity";
        let mut broken = Vec::new();
        if let Err(e) = self.repos.agents.list_active().await {
            broken.push(format!("agents: {}", e));
        }
        if let Err(e) = self.repos.jobs.find_by_status(JobStatus::Generating).await {
            broken.push(format!("jobs: {}", e));
        }
        if let Err(e) = self.repos.schedule.list_active(None).await {
            broken.push(format!("schedule: {}", e));
        }
        if let Err(e) = self.repos.performance.count().await {
            broken.push(format!("performance: {}", e));
        }
        if let Err(e) = self.repos.tenant_state.load().await {
            broken.push(format!("tenant state: {}", e));
        }
        Ok(if broken.is_empty() {
            CheckResult::pass(NAME, "all repositories answer")
        } else {
            CheckResult::fail(NAME, broken.join("; "))
        })
    }

    async fn check_population(&self) -> Result<CheckResult> {
        const NAME: &str = "population_health";
        let active = self.repos.agents.list_active().await?;
        if active.is_empty() {
            return Ok(CheckResult::fail(NAME, "no active agents"));
        }
        let variants: HashSet<ContentVariant> = active.iter().map(|a| a.variant).collect();
        let missing: Vec<String> = [ContentVariant::Light, ContentVariant::Dark]
            .into_iter()
            .filter(|v| !variants.contains(v))
            .map(|v| v.to_string())
            .collect();
        if active.len() < self.config.min_active_agents {
            return Ok(CheckResult::warn(
                NAME,
                format!("{} active agents, expected at least {}", active.len(), self.config.min_active_agents),
            ));
        }
        if !missing.is_empty() {
            return Ok(CheckResult::warn(NAME, format!("no agents for variant(s): {}", missing.join(", "))));
        }
        Ok(CheckResult::pass(NAME, format!("{} active agents", active.len())))
    }

    async fn check_dna(&self) -> Result<CheckResult> {
        const NAME: &str = "dna_validity";
        let invalid: Vec<String> = self
            .repos
            .agents
            .list_active()
            .await?
            .into_iter()
            .filter_map(|a| a.validate().err().map(|e| format!("{}: {}", a.name, e)))
            .collect();
        Ok(if invalid.is_empty() {
            CheckResult::pass(NAME, "all active DNA within bounds")
        } else {
            CheckResult::fail(NAME, invalid.join("; "))
        })
    }

    async fn check_throughput(&self, now: DateTime<Utc>) -> Result<CheckResult> {
        const NAME: &str = "pipeline_throughput";
        let since = now - Duration::hours(THROUGHPUT_WINDOW_HOURS);
        let proposals = self.repos.proposals.list_since(since).await?;
        let accepted = proposals.iter().filter(|p| p.status == ProposalStatus::Accepted).count();
        let jobs = self.repos.jobs.list_since(since).await?;
        let completed = jobs.iter().filter(|j| j.status == JobStatus::Completed).count();

        let detail = format!(
            "{}h: {} proposals, {} accepted, {} jobs completed",
            THROUGHPUT_WINDOW_HOURS,
            proposals.len(),
            accepted,
            completed
        );
        Ok(if proposals.is_empty() {
            CheckResult::warn(NAME, format!("no proposals in the last {}h", THROUGHPUT_WINDOW_HOURS))
        } else if accepted == 0 {
            CheckResult::warn(NAME, detail)
        } else {
            CheckResult::pass(NAME, detail)
        })
    }

    async fn check_liveness(&self, now: DateTime<Utc>) -> Result<CheckResult> {
        const NAME: &str = "scheduler_liveness";
        let generating = self.repos.jobs.find_by_status(JobStatus::Generating).await?;
        let stuck = generating.iter().filter(|j| j.is_stuck(now, self.job_timeout)).count();
        Ok(if stuck > 0 {
            CheckResult::fail(
                NAME,
                format!("{} job(s) generating longer than {} minutes", stuck, self.job_timeout.num_minutes()),
            )
        } else {
            CheckResult::pass(NAME, format!("{} job(s) generating, none stuck", generating.len()))
        })
    }

    async fn check_evolution(&self, ctx: &DiagnosticsContext, now: DateTime<Utc>) -> Result<CheckResult> {
        const NAME: &str = "evolution_freshness";
        let stale_after = chrono_duration(self.config.evolution_stale_after);
        let last_mutation = self.repos.learning_log.latest().await?.map(|r| r.recorded_at);
        let last_activity = match (ctx.last_evolution, last_mutation) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        Ok(match last_activity {
            Some(at) if now - at > stale_after => CheckResult::warn(
                NAME,
                format!("last evolution activity {} hours ago", (now - at).num_hours()),
            ),
            Some(at) => CheckResult::pass(NAME, format!("last evolution activity at {}", at)),
            None if now - ctx.started_at > stale_after => {
                CheckResult::warn(NAME, "evolution has never run")
            }
            None => CheckResult::pass(NAME, "evolution not due yet"),
        })
    }

    fn check_api_keys(&self) -> CheckResult {
        const NAME: &str = "api_keys";
        if self.config.required_env_vars.is_empty() {
            return CheckResult::pass(NAME, "no keys required");
        }
        let missing: Vec<&str> = self
            .config
            .required_env_vars
            .iter()
            .filter(|var| std::env::var(var.as_str()).map(|v| v.trim().is_empty()).unwrap_or(true))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            CheckResult::pass(NAME, format!("{} key(s) present", self.config.required_env_vars.len()))
        } else {
            CheckResult::warn(NAME, format!("missing: {}", missing.join(", ")))
        }
    }

    async fn check_publish_pipeline(&self, now: DateTime<Utc>) -> Result<CheckResult> {
        const NAME: &str = "publish_pipeline";
        let since = now - Duration::hours(THROUGHPUT_WINDOW_HOURS);
        let entries = self.repos.schedule.list_all().await?;

        let recent: Vec<_> = entries
            .iter()
            .filter(|e| e.scheduled_time >= since && e.scheduled_time <= now)
            .filter(|e| matches!(e.status, EntryStatus::Published | EntryStatus::Failed))
            .collect();
        let failed = recent.iter().filter(|e| e.status == EntryStatus::Failed).count();
        let credential = recent
            .iter()
            .filter(|e| e.retry.error_kind == Some(PublishErrorKind::Credential))
            .count();
        let overdue = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Scheduled && now - e.scheduled_time > Duration::hours(1))
            .count();
        let stalled = entries
            .iter()
            .filter(|e| e.is_publish_stalled(now, self.publish_timeout))
            .count();

        if credential > 0 {
            return Ok(CheckResult::fail(
                NAME,
                format!("{} entr(ies) hit credential errors in {}h", credential, THROUGHPUT_WINDOW_HOURS),
            ));
        }
        let ratio = if recent.is_empty() {
            0.0
        } else {
            failed as f64 / recent.len() as f64
        };
        if ratio > self.config.publish_failure_warn_ratio {
            return Ok(CheckResult::warn(
                NAME,
                format!("{} of {} recent publishes failed", failed, recent.len()),
            ));
        }
        if stalled > 0 {
            return Ok(CheckResult::warn(
                NAME,
                format!(
                    "{} entr(ies) publishing for more than {} minutes",
                    stalled,
                    self.publish_timeout.num_minutes()
                ),
            ));
        }
        if overdue > 0 {
            return Ok(CheckResult::warn(NAME, format!("{} entr(ies) overdue by more than 1h", overdue)));
        }
        Ok(CheckResult::pass(
            NAME,
            format!("{} published, {} failed in {}h", recent.len() - failed, failed, THROUGHPUT_WINDOW_HOURS),
        ))
    }

    fn check_cycle_staleness(&self, ctx: &DiagnosticsContext, now: DateTime<Utc>) -> CheckResult {
        const NAME: &str = "cycle_staleness";
        let stale: Vec<String> = CycleKind::ALL
            .into_iter()
            .filter(|kind| !STALENESS_EXEMPT.contains(kind))
            .filter_map(|kind| {
                let allowance = chrono_duration(self.cadences.interval(kind)) * 3;
                let reference = ctx.last_runs.get(&kind).copied().unwrap_or(ctx.started_at);
                (now - reference > allowance).then(|| kind.to_string())
            })
            .collect();
        if stale.is_empty() {
            CheckResult::pass(NAME, "all cycles within 3x cadence")
        } else {
            CheckResult::warn(NAME, format!("stale: {}", stale.join(", ")))
        }
    }

    async fn check_consistency(&self) -> Result<CheckResult> {
        const NAME: &str = "referential_consistency";
        let mut problems = Vec::new();

        for entry in self.repos.schedule.list_active(None).await? {
            if self.repos.jobs.find_by_id(entry.job_id).await?.is_none() {
                problems.push(format!("entry {} references missing job", entry.id));
            }
        }
        for job in self.repos.jobs.list_since(DateTime::<Utc>::MIN_UTC).await? {
            if self.repos.proposals.find_by_id(job.proposal_id).await?.is_none() {
                problems.push(format!("job {} references missing proposal", job.id));
            }
        }
        for proposal in self.repos.proposals.find_by_status(ProposalStatus::Accepted).await? {
            if let Some(job_id) = proposal.accepted_job_id {
                if self.repos.jobs.find_by_id(job_id).await?.is_none() {
                    problems.push(format!("proposal {} references missing job", proposal.id));
                }
            }
        }

        Ok(if problems.is_empty() {
            CheckResult::pass(NAME, "no dangling references")
        } else {
            let count = problems.len();
            problems.truncate(5);
            CheckResult::warn(NAME, format!("{} dangling reference(s): {}", count, problems.join("; ")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{Agent, AgentDna, DEFAULT_STRATEGIES};
    use crate::domain::job::Job;
    use crate::domain::proposal::{ContentType, Proposal, ProposalPayload};
    use crate::domain::schedule::ScheduledEntry;
    use std::collections::BTreeSet;

    fn check(status: CheckStatus) -> CheckResult {
        CheckResult::with("c", status, "")
    }

    #[test]
    fn test_aggregate_thresholds() {
        use CheckStatus::*;
        assert_eq!(aggregate(&[check(Pass), check(Warn), check(Warn)]), HealthStatus::Healthy);
        assert_eq!(aggregate(&[check(Warn), check(Warn), check(Warn)]), HealthStatus::Degraded);
        assert_eq!(aggregate(&[check(Fail)]), HealthStatus::Degraded);
        assert_eq!(aggregate(&[check(Fail), check(Fail), check(Fail)]), HealthStatus::Critical);
    }

    fn service(repos: Repositories) -> DiagnosticsService {
        DiagnosticsService::new(
            repos,
            DiagnosticsConfig::default(),
            CadenceConfig::default(),
            std::time::Duration::from_secs(30 * 60),
            std::time::Duration::from_secs(30 * 60),
        )
    }

    async fn seed(repos: &Repositories) {
        let strategies: Vec<String> = DEFAULT_STRATEGIES.iter().map(|s| s.to_string()).collect();
        for variant in [ContentVariant::Light, ContentVariant::Dark] {
            let agent = Agent::new(variant.to_string(), variant, AgentDna::seed(&strategies).unwrap());
            repos.agents.save(&agent).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_runs_ten_checks() {
        let repos = Repositories::in_memory();
        seed(&repos).await;
        let now = Utc::now();
        let report = service(repos).run(&DiagnosticsContext::fresh(now), now).await;
        assert_eq!(report.checks.len(), 10);
        assert_eq!(report.count(CheckStatus::Fail), 0);
        // a fresh tenant has produced nothing yet
        let throughput = report.checks.iter().find(|c| c.name == "pipeline_throughput").unwrap();
        assert_eq!(throughput.status, CheckStatus::Warn);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_empty_population_fails() {
        let repos = Repositories::in_memory();
        let now = Utc::now();
        let report = service(repos).run(&DiagnosticsContext::fresh(now), now).await;
        let population = report.checks.iter().find(|c| c.name == "population_health").unwrap();
        assert_eq!(population.status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_stale_cycles_and_dangling_entries_warn() {
        let repos = Repositories::in_memory();
        seed(&repos).await;
        let proposal = Proposal::new(
            crate::domain::agent::AgentId::new(),
            "northwind",
            ContentType::Reel,
            ContentVariant::Light,
            "explainer",
            ProposalPayload::default(),
        );
        let orphan_job = Job::from_proposal(&proposal);
        let entry = ScheduledEntry::for_job(&orphan_job, BTreeSet::new(), Utc::now() + Duration::hours(3));
        repos.schedule.save(&entry).await.unwrap();

        let now = Utc::now();
        let ctx = DiagnosticsContext::fresh(now - Duration::days(2));
        let report = service(repos).run(&ctx, now).await;

        let staleness = report.checks.iter().find(|c| c.name == "cycle_staleness").unwrap();
        assert_eq!(staleness.status, CheckStatus::Warn);
        let consistency = report.checks.iter().find(|c| c.name == "referential_consistency").unwrap();
        assert_eq!(consistency.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn test_stalled_publish_warns() {
        let repos = Repositories::in_memory();
        seed(&repos).await;
        let now = Utc::now();
        let proposal = Proposal::new(
            crate::domain::agent::AgentId::new(),
            "northwind",
            ContentType::Reel,
            ContentVariant::Light,
            "explainer",
            ProposalPayload::default(),
        );
        let job = Job::from_proposal(&proposal);
        repos.jobs.save(&job).await.unwrap();
        let mut entry = ScheduledEntry::for_job(&job, BTreeSet::new(), now + Duration::hours(2));
        entry.begin_publishing(now - Duration::hours(1));
        repos.schedule.save(&entry).await.unwrap();

        let report = service(repos).run(&DiagnosticsContext::fresh(now), now).await;
        let publish = report.checks.iter().find(|c| c.name == "publish_pipeline").unwrap();
        assert_eq!(publish.status, CheckStatus::Warn);
        assert!(publish.detail.contains("publishing for more than 30 minutes"));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant Orchestrator
//!
//! One [`Orchestrator`] per tenant owns the services that make up the content
//! loop (burst, quality gate, dispatcher, publishing, evolution, research,
//! healing, diagnostics) and the live state the status surface reports.
//! Every collaborator is built at construction time from the tenant's
//! configuration, the shared quota governor, and the injected capabilities.
//!
//! [`Orchestrator::run_cycle`] is the single entry point the scheduler uses.
//! It never returns an error: failures are logged, counted per cycle, and
//! reported as [`CycleOutcome::Failed`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::domain::agent::AgentId;
use crate::domain::config::{chrono_duration, OrchestratorConfigSpec, QualityGateConfig, TenantConfig};
use crate::domain::cycle::{BurstMode, CycleKind};
use crate::domain::events::CycleEvent;
use crate::domain::examiner::Examiner;
use crate::domain::generator::GeneratorAgent;
use crate::domain::job::{Job, JobId};
use crate::domain::proposal::{ContentVariant, Proposal, ProposalId, ProposalStatus};
use crate::domain::publisher::Publisher;
use crate::domain::quota::{QuotaGovernor, QuotaUsage};
use crate::domain::runner::JobRunner;
use crate::domain::sources::{MetricsSource, TrendSource};
use crate::infrastructure::dry_run::{
    LogPublisher, SimulatedMetricsSource, SimulatedRunner, StaticTrendSource, TemplateGenerator,
};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::examiner::HeuristicExaminer;

use super::bootstrap::{BootstrapService, BootstrapStatus};
use super::burst::{BurstReport, ContentBurst};
use super::diagnostics::{DiagnosticsContext, DiagnosticsReport, DiagnosticsService};
use super::dispatcher::{DispatchSettings, JobDispatcher};
use super::evolution::EvolutionEngine;
use super::healing::{HealingReport, HealingService};
use super::publishing::PublishScheduler;
use super::quality_gate::{QualityGate, ReviewDecision};
use super::repository_factory::Repositories;
use super::research::ResearchService;

const ACTIVITY_LOG_CAPACITY: usize = 200;

/// External capabilities a tenant's orchestrator is written against.
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn GeneratorAgent>,
    pub examiner: Arc<dyn Examiner>,
    pub runner: Arc<dyn JobRunner>,
    pub publisher: Arc<dyn Publisher>,
    pub metrics: Arc<dyn MetricsSource>,
    pub trends: Arc<dyn TrendSource>,
}

impl Capabilities {
    /// Offline adapters: template generation, heuristic scoring, simulated
    /// rendering and engagement, and a publisher that only logs.
    pub fn dry_run(repos: &Repositories, quality_gate: &QualityGateConfig) -> Self {
        Self {
            generator: Arc::new(TemplateGenerator),
            examiner: Arc::new(HeuristicExaminer::new(
                quality_gate.min_composite_score,
                quality_gate.banned_phrases.clone(),
            )),
            runner: Arc::new(SimulatedRunner::default()),
            publisher: Arc::new(LogPublisher),
            metrics: Arc::new(SimulatedMetricsSource::new(repos.schedule.clone())),
            trends: Arc::new(StaticTrendSource),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Paused,
    Bursting,
    Busy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub cycle: Option<CycleKind>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed { summary: String },
    Skipped { reason: String },
    Failed { error: String },
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped { .. })
    }
}

enum CycleRun {
    Done(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
    pub variant: ContentVariant,
    pub generation: u32,
    pub survival_score: f64,
    pub struggle_streak: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tenant: String,
    pub phase: Phase,
    pub paused: bool,
    pub running_cycles: Vec<CycleKind>,
    pub agents: Vec<AgentSummary>,
    pub jobs_in_flight: usize,
    pub activity: Vec<ActivityEntry>,
    pub quota: Vec<QuotaUsage>,
    pub last_runs: BTreeMap<CycleKind, DateTime<Utc>>,
    pub cycle_errors: BTreeMap<CycleKind, u64>,
    pub last_burst_at: Option<DateTime<Utc>>,
    pub last_burst: Option<BurstReport>,
    pub last_evolution: Option<DateTime<Utc>>,
    pub bootstrap_active: bool,
    pub last_bootstrap: Option<BootstrapStatus>,
    pub diagnostics: Option<DiagnosticsReport>,
}

struct OrchestratorState {
    started_at: DateTime<Utc>,
    running: BTreeSet<CycleKind>,
    activity: VecDeque<ActivityEntry>,
    last_runs: HashMap<CycleKind, DateTime<Utc>>,
    cycle_errors: HashMap<CycleKind, u64>,
    last_burst: Option<BurstReport>,
    last_evolution: Option<DateTime<Utc>>,
    last_bootstrap: Option<BootstrapStatus>,
    diagnostics: Option<DiagnosticsReport>,
}

impl OrchestratorState {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            running: BTreeSet::new(),
            activity: VecDeque::with_capacity(ACTIVITY_LOG_CAPACITY),
            last_runs: HashMap::new(),
            cycle_errors: HashMap::new(),
            last_burst: None,
            last_evolution: None,
            last_bootstrap: None,
            diagnostics: None,
        }
    }

    fn log(&mut self, at: DateTime<Utc>, cycle: Option<CycleKind>, message: String) {
        if self.activity.len() == ACTIVITY_LOG_CAPACITY {
            self.activity.pop_front();
        }
        self.activity.push_back(ActivityEntry { at, cycle, message });
    }
}

pub struct Orchestrator {
    tenant: TenantConfig,
    spec: OrchestratorConfigSpec,
    repos: Repositories,
    quota: Arc<QuotaGovernor>,
    event_bus: EventBus,
    gate: Arc<QualityGate>,
    dispatcher: JobDispatcher,
    publishing: Arc<PublishScheduler>,
    burst: ContentBurst,
    evolution: EvolutionEngine,
    research: Arc<ResearchService>,
    bootstrap: BootstrapService,
    healing: HealingService,
    diagnostics: DiagnosticsService,
    state: RwLock<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(
        tenant: TenantConfig,
        spec: &OrchestratorConfigSpec,
        repos: Repositories,
        capabilities: Capabilities,
        quota: Arc<QuotaGovernor>,
        event_bus: &EventBus,
    ) -> Result<Self> {
        let event_bus = event_bus.scoped(&tenant.id);

        let platforms = tenant
            .brands
            .iter()
            .map(|b| (b.name.clone(), b.platforms.clone()))
            .collect();
        let publishing = Arc::new(PublishScheduler::new(
            Arc::new(spec.slots.allocator(&tenant.brands)),
            repos.schedule.clone(),
            repos.jobs.clone(),
            capabilities.publisher,
            platforms,
            event_bus.clone(),
        )
        .with_quota(quota.clone()));

        let dispatcher = JobDispatcher::new(
            repos.jobs.clone(),
            repos.proposals.clone(),
            capabilities.runner,
            publishing.clone(),
            event_bus.clone(),
            DispatchSettings {
                max_concurrent_jobs: spec.dispatch.max_concurrent_jobs,
                stagger: spec.dispatch.stagger,
                job_timeout: spec.dispatch.job_timeout,
            },
        );

        let gate = Arc::new(QualityGate::new(
            capabilities.examiner,
            repos.proposals.clone(),
            event_bus.clone(),
            spec.quality_gate.max_regenerations,
        )
        .with_quota(quota.clone()));

        let burst = ContentBurst::new(
            tenant.clone(),
            repos.agents.clone(),
            repos.proposals.clone(),
            capabilities.generator,
            gate.clone(),
            dispatcher.clone(),
            event_bus.clone(),
        )
        .with_quota(quota.clone());

        let research = Arc::new(ResearchService::new(
            quota.clone(),
            capabilities.metrics,
            capabilities.trends,
            repos.performance.clone(),
            repos.trends.clone(),
            tenant.brands.iter().map(|b| b.name.clone()).collect(),
            spec.research.clone(),
        ));

        let bootstrap = BootstrapService::new(
            research.clone(),
            repos.performance.clone(),
            repos.tenant_state.clone(),
            spec.bootstrap.clone(),
        );

        let healing = HealingService::new(
            repos.jobs.clone(),
            dispatcher.clone(),
            publishing.clone(),
            event_bus.clone(),
            &spec.healing,
        )
        .context("building failure classifier")?;

        let diagnostics = DiagnosticsService::new(
            repos.clone(),
            spec.diagnostics.clone(),
            spec.cadences.clone(),
            spec.dispatch.job_timeout,
            spec.healing.publish_timeout,
        );

        let evolution = EvolutionEngine::new(repos.clone(), spec.evolution.clone(), event_bus.clone());

        Ok(Self {
            tenant,
            spec: spec.clone(),
            repos,
            quota,
            event_bus,
            gate,
            dispatcher,
            publishing,
            burst,
            evolution,
            research,
            bootstrap,
            healing,
            diagnostics,
            state: RwLock::new(OrchestratorState::new(Utc::now())),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    pub fn tenant(&self) -> &TenantConfig {
        &self.tenant
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn publishing(&self) -> &PublishScheduler {
        &self.publishing
    }

    pub fn research(&self) -> &ResearchService {
        &self.research
    }

    /// Seed the agent population if the tenant has none, and apply the
    /// configured start-paused flag. Returns the active population size.
    pub async fn initialize(&self) -> Result<usize> {
        let population = self
            .evolution
            .seed_population(&ContentVariant::ALL, self.tenant.agents_per_variant)
            .await?;
        if self.spec.start_paused {
            self.pause().await?;
        }
        self.record(Utc::now(), None, format!("initialized with {} agents", population.len()));
        info!(tenant = %self.tenant.id, agents = population.len(), "Orchestrator initialized");
        Ok(population.len())
    }

    pub async fn run_cycle(&self, kind: CycleKind) -> CycleOutcome {
        self.run_cycle_with(kind, Utc::now(), false).await
    }

    pub async fn run_cycle_at(&self, kind: CycleKind, now: DateTime<Utc>) -> CycleOutcome {
        self.run_cycle_with(kind, now, false).await
    }

    /// Run a cycle ignoring its idempotency window and calendar gate.
    pub async fn force_cycle(&self, kind: CycleKind) -> CycleOutcome {
        self.run_cycle_with(kind, Utc::now(), true).await
    }

    pub async fn run_cycle_with(&self, kind: CycleKind, now: DateTime<Utc>, force: bool) -> CycleOutcome {
        if !force {
            if let Some(reason) = self.within_window(kind, now) {
                return CycleOutcome::Skipped { reason };
            }
        }

        self.state.write().running.insert(kind);
        let started = Instant::now();
        let result = self.execute(kind, now, force).await;
        let elapsed = started.elapsed();
        self.state.write().running.remove(&kind);

        histogram!("autoreel_cycle_duration_seconds", "cycle" => kind.as_str()).record(elapsed.as_secs_f64());
        match result {
            Ok(CycleRun::Done(summary)) => {
                counter!("autoreel_cycle_runs_total", "cycle" => kind.as_str(), "outcome" => "completed").increment(1);
                info!(tenant = %self.tenant.id, cycle = %kind, %summary, "Cycle completed");
                {
                    let mut state = self.state.write();
                    state.last_runs.insert(kind, now);
                    state.log(now, Some(kind), summary.clone());
                }
                self.event_bus.publish(CycleEvent::CycleCompleted {
                    kind,
                    duration_ms: elapsed.as_millis() as i64,
                    completed_at: Utc::now(),
                });
                CycleOutcome::Completed { summary }
            }
            Ok(CycleRun::Skipped(reason)) => {
                counter!("autoreel_cycle_runs_total", "cycle" => kind.as_str(), "outcome" => "skipped").increment(1);
                CycleOutcome::Skipped { reason }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                self.record_failure(kind, now, &error);
                CycleOutcome::Failed { error }
            }
        }
    }

    /// Count a cycle failure that happened outside `run_cycle`, such as a panic.
    pub fn record_failure(&self, kind: CycleKind, at: DateTime<Utc>, error: &str) {
        counter!("autoreel_cycle_failures_total", "cycle" => kind.as_str()).increment(1);
        error!(tenant = %self.tenant.id, cycle = %kind, error, "Cycle failed");
        {
            let mut state = self.state.write();
            state.running.remove(&kind);
            *state.cycle_errors.entry(kind).or_insert(0) += 1;
            state.log(at, Some(kind), format!("failed: {}", error));
        }
        self.event_bus.publish(CycleEvent::CycleFailed {
            kind,
            error: error.to_string(),
            failed_at: at,
        });
    }

    /// Reason to skip a guarded cycle whose last run is inside its window.
    fn within_window(&self, kind: CycleKind, now: DateTime<Utc>) -> Option<String> {
        if !kind.is_idempotent_guarded() {
            return None;
        }
        let state = self.state.read();
        let (last, window) = match kind {
            CycleKind::Evolution => (state.last_evolution, chrono::Duration::days(6)),
            _ => {
                let cadence = chrono_duration(self.spec.cadences.interval(kind));
                (state.last_runs.get(&kind).copied(), cadence * 9 / 10)
            }
        };
        let last = last?;
        (now - last < window).then(|| format!("last ran at {}", last.to_rfc3339()))
    }

    async fn execute(&self, kind: CycleKind, now: DateTime<Utc>, force: bool) -> Result<CycleRun> {
        match kind {
            CycleKind::Check => self.check(now, force).await,
            CycleKind::Publish => {
                let plan = self.publishing.cleanup(now).await?;
                let summary = self.publishing.publish_due(now).await?;
                Ok(CycleRun::Done(format!(
                    "moved {} entries, published {} of {} ({} failed)",
                    plan.moves.len(),
                    summary.published,
                    summary.attempted,
                    summary.failed
                )))
            }
            CycleKind::Observe => {
                let report = self.research.observe(now).await?;
                Ok(CycleRun::Done(format!(
                    "{} calls, {} records, {} deferred",
                    report.calls, report.records, report.deferred
                )))
            }
            CycleKind::Scout => {
                let report = self.research.scout(now).await?;
                Ok(CycleRun::Done(format!(
                    "{} scans, {} items, {} deferred",
                    report.calls, report.records, report.deferred
                )))
            }
            CycleKind::Feedback => {
                let outcome = self.evolution.run_feedback(now).await?;
                Ok(CycleRun::Done(format!(
                    "{} items, {} agents scored, {} adapted",
                    outcome.items, outcome.agents_scored, outcome.adapted
                )))
            }
            CycleKind::Evolution => self.evolve(now, force).await,
            CycleKind::Diagnostics => {
                let report = self.run_diagnostics(now).await;
                Ok(CycleRun::Done(format!("status {}", report.status)))
            }
            CycleKind::Bootstrap => {
                let status = self.bootstrap.tick(now).await?;
                self.state.write().last_bootstrap = Some(status.clone());
                match status {
                    BootstrapStatus::Disabled => Ok(CycleRun::Skipped("bootstrap disabled".to_string())),
                    BootstrapStatus::Matured { records } => {
                        Ok(CycleRun::Done(format!("matured at {} records", records)))
                    }
                    BootstrapStatus::Ran { report, .. } => Ok(CycleRun::Done(format!(
                        "{} calls, {} deferred",
                        report.calls, report.deferred
                    ))),
                }
            }
            CycleKind::Healing => {
                let report = self.healing.run(now).await?;
                Ok(CycleRun::Done(healing_summary(&report)))
            }
        }
    }

    /// Daily burst gate: not paused, past the local burst hour, and no burst
    /// yet on this local date.
    async fn check(&self, now: DateTime<Utc>, force: bool) -> Result<CycleRun> {
        let mut tenant_state = self.repos.tenant_state.load().await?;
        if tenant_state.paused {
            return Ok(CycleRun::Skipped("paused".to_string()));
        }
        if !force {
            let local = self.tenant.local_time(now);
            if local.hour() < self.tenant.burst_hour {
                return Ok(CycleRun::Skipped("before burst hour".to_string()));
            }
            if let Some(last) = tenant_state.last_burst_at {
                if self.tenant.local_time(last).date() >= local.date() {
                    return Ok(CycleRun::Skipped("burst already ran today".to_string()));
                }
            }
        }

        let Some(report) = self.burst.run(BurstMode::Smart, now).await? else {
            return Ok(CycleRun::Skipped("burst in progress".to_string()));
        };
        tenant_state.last_burst_at = Some(now);
        self.repos.tenant_state.save(&tenant_state).await?;

        let summary = format!(
            "burst accepted {}, rejected {}",
            report.accepted(),
            report.rejected()
        );
        self.state.write().last_burst = Some(report);
        Ok(CycleRun::Done(summary))
    }

    /// Selection runs once a week at the configured local weekday and hour.
    async fn evolve(&self, now: DateTime<Utc>, force: bool) -> Result<CycleRun> {
        let config = self.evolution.config();
        let local = self.tenant.local_time(now);
        if !force && (local.weekday() != config.weekday || local.hour() != config.hour) {
            return Ok(CycleRun::Skipped("outside evolution window".to_string()));
        }
        let outcome = self.evolution.run_evolution(now).await?;
        self.state.write().last_evolution = Some(now);
        let selection = &outcome.selection;
        Ok(CycleRun::Done(format!(
            "ranked {}, archived {}, retired {}, spawned {}, pruned {} patterns",
            selection.ranked,
            selection.archived.len(),
            selection.retired.len(),
            selection.spawned.len(),
            outcome.patterns_pruned
        )))
    }

    async fn run_diagnostics(&self, now: DateTime<Utc>) -> DiagnosticsReport {
        let ctx = {
            let state = self.state.read();
            DiagnosticsContext {
                started_at: state.started_at,
                last_runs: state.last_runs.clone(),
                last_evolution: state.last_evolution,
            }
        };
        let report = self.diagnostics.run(&ctx, now).await;
        self.state.write().diagnostics = Some(report.clone());
        report
    }

    fn record(&self, at: DateTime<Utc>, cycle: Option<CycleKind>, message: String) {
        self.state.write().log(at, cycle, message);
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let now = Utc::now();
        let tenant_state = self.repos.tenant_state.load().await?;
        let agents = self
            .repos
            .agents
            .list_all()
            .await?
            .into_iter()
            .map(|a| AgentSummary {
                id: a.id,
                name: a.name,
                variant: a.variant,
                generation: a.generation,
                survival_score: a.survival_score,
                struggle_streak: a.struggle_streak,
                active: a.active,
            })
            .collect();
        let bootstrap_active = self.bootstrap.is_active().await?;

        let state = self.state.read();
        let phase = if tenant_state.paused {
            Phase::Paused
        } else if self.burst.is_running() {
            Phase::Bursting
        } else if state.running.is_empty() {
            Phase::Idle
        } else {
            Phase::Busy
        };

        Ok(StatusSnapshot {
            tenant: self.tenant.id.clone(),
            phase,
            paused: tenant_state.paused,
            running_cycles: state.running.iter().copied().collect(),
            agents,
            jobs_in_flight: self.dispatcher.in_flight(),
            activity: state.activity.iter().rev().cloned().collect(),
            quota: self.quota.summary(now),
            last_runs: state.last_runs.iter().map(|(k, v)| (*k, *v)).collect(),
            cycle_errors: state.cycle_errors.iter().map(|(k, v)| (*k, *v)).collect(),
            last_burst_at: tenant_state.last_burst_at,
            last_burst: state.last_burst.clone(),
            last_evolution: state.last_evolution,
            bootstrap_active,
            last_bootstrap: state.last_bootstrap.clone(),
            diagnostics: state.diagnostics.clone(),
        })
    }

    pub async fn pause(&self) -> Result<()> {
        self.set_paused(true).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.set_paused(false).await
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        let mut tenant_state = self.repos.tenant_state.load().await?;
        tenant_state.paused = paused;
        self.repos.tenant_state.save(&tenant_state).await?;

        let now = Utc::now();
        if paused {
            info!(tenant = %self.tenant.id, "Tenant paused");
            self.event_bus.publish(CycleEvent::Paused { paused_at: now });
            self.record(now, None, "paused".to_string());
        } else {
            info!(tenant = %self.tenant.id, "Tenant resumed");
            self.event_bus.publish(CycleEvent::Resumed { resumed_at: now });
            self.record(now, None, "resumed".to_string());
        }
        Ok(())
    }

    /// Manual burst. Runs even while paused; it does not count as the day's
    /// scheduled burst.
    pub async fn trigger_burst(&self, mode: BurstMode) -> Result<Option<BurstReport>> {
        let now = Utc::now();
        let report = self.burst.run(mode, now).await?;
        if let Some(report) = &report {
            let mut state = self.state.write();
            state.log(
                now,
                Some(CycleKind::Check),
                format!("manual {} burst accepted {}", mode, report.accepted()),
            );
            state.last_burst = Some(report.clone());
        }
        Ok(report)
    }

    pub async fn trigger_healing(&self) -> Result<HealingReport> {
        let now = Utc::now();
        let report = self.healing.run(now).await?;
        let mut state = self.state.write();
        state.last_runs.insert(CycleKind::Healing, now);
        state.log(now, Some(CycleKind::Healing), format!("manual: {}", healing_summary(&report)));
        Ok(report)
    }

    pub async fn trigger_diagnostics(&self) -> DiagnosticsReport {
        let now = Utc::now();
        let report = self.run_diagnostics(now).await;
        self.state.write().last_runs.insert(CycleKind::Diagnostics, now);
        report
    }

    pub async fn retry_job(&self, id: JobId) -> Result<Job> {
        let job = self.healing.retry_job(id).await?;
        self.record(Utc::now(), None, format!("manual retry of job {}", id));
        Ok(job)
    }

    /// Human review of a pending proposal. An accepted proposal becomes a job
    /// and is dispatched right away.
    pub async fn review_proposal(&self, id: ProposalId, decision: ReviewDecision) -> Result<Proposal> {
        let now = Utc::now();
        let mut proposal = self.gate.apply_decision(id, decision, now).await?;
        if proposal.status == ProposalStatus::Accepted {
            let job = self.dispatcher.create_job(&proposal).await?;
            proposal.accepted_job_id = Some(job.id);
            self.dispatcher.dispatch(job);
        }
        self.record(now, None, format!("proposal {} reviewed: {:?}", id, proposal.status));
        Ok(proposal)
    }

    /// Wait for every dispatched job to finish.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        if let Some(total) = self.state.read().cycle_errors.values().copied().reduce(|a, b| a + b) {
            warn!(tenant = %self.tenant.id, cycle_errors = total, "Orchestrator stopped with cycle errors");
        }
        info!(tenant = %self.tenant.id, "Orchestrator stopped");
    }
}

fn healing_summary(report: &HealingReport) -> String {
    format!(
        "reset {} stuck, retried {}, {} need attention",
        report.stuck_reset.len(),
        report.retried.len(),
        report.needs_attention.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::performance::PerformanceRecord;
    use crate::domain::repository::{PerformanceRepository, RepositoryError};
    use crate::domain::schedule::EntryId;
    use async_trait::async_trait;
    use std::time::Duration;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn spec() -> OrchestratorConfigSpec {
        let mut spec = OrchestratorConfigSpec::default();
        spec.dispatch.stagger = Duration::ZERO;
        spec.tenants[0].burst_hour = 12;
        spec.tenants[0].agents_per_variant = 2;
        spec
    }

    async fn orchestrator_with(repos: Repositories) -> Orchestrator {
        let spec = spec();
        let mut capabilities = Capabilities::dry_run(&repos, &spec.quality_gate);
        capabilities.runner = Arc::new(SimulatedRunner::new(Duration::ZERO, 0.0));
        let orchestrator = Orchestrator::new(
            spec.tenants[0].clone(),
            &spec,
            repos,
            capabilities,
            Arc::new(spec.quotas.governor()),
            &EventBus::new(256),
        )
        .unwrap();
        orchestrator.initialize().await.unwrap();
        orchestrator
    }

    async fn orchestrator() -> Orchestrator {
        orchestrator_with(Repositories::in_memory()).await
    }

    struct BrokenPerformance;

    #[async_trait]
    impl PerformanceRepository for BrokenPerformance {
        async fn upsert(&self, _record: &PerformanceRecord) -> Result<(), RepositoryError> {
            Err(RepositoryError::Storage("disk full".to_string()))
        }

        async fn latest_for_entry(&self, _entry_id: EntryId) -> Result<Option<PerformanceRecord>, RepositoryError> {
            Err(RepositoryError::Storage("disk full".to_string()))
        }

        async fn count(&self) -> Result<usize, RepositoryError> {
            Err(RepositoryError::Storage("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_initialize_seeds_once() {
        let orchestrator = orchestrator().await;
        assert_eq!(orchestrator.initialize().await.unwrap(), 4);
        let status = orchestrator.status().await.unwrap();
        assert_eq!(status.agents.len(), 4);
        assert_eq!(status.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_check_runs_burst_once_per_local_day() {
        let orchestrator = orchestrator().await;

        let early = orchestrator.run_cycle_at(CycleKind::Check, at("2025-01-16T09:00:00Z")).await;
        assert_eq!(early, CycleOutcome::Skipped { reason: "before burst hour".to_string() });

        let noon = orchestrator.run_cycle_at(CycleKind::Check, at("2025-01-16T13:00:00Z")).await;
        assert!(noon.is_completed(), "{:?}", noon);

        let evening = orchestrator.run_cycle_at(CycleKind::Check, at("2025-01-16T20:00:00Z")).await;
        assert!(evening.is_skipped());

        let next_day = orchestrator.run_cycle_at(CycleKind::Check, at("2025-01-17T13:00:00Z")).await;
        assert!(next_day.is_completed());
        orchestrator.wait_idle().await;
    }

    #[tokio::test]
    async fn test_pause_suppresses_only_the_burst() {
        let orchestrator = orchestrator().await;
        orchestrator.pause().await.unwrap();

        let check = orchestrator.run_cycle_at(CycleKind::Check, at("2025-01-16T13:00:00Z")).await;
        assert_eq!(check, CycleOutcome::Skipped { reason: "paused".to_string() });
        assert!(orchestrator.run_cycle(CycleKind::Scout).await.is_completed());
        assert!(orchestrator.run_cycle(CycleKind::Healing).await.is_completed());
        assert_eq!(orchestrator.status().await.unwrap().phase, Phase::Paused);

        orchestrator.resume().await.unwrap();
        let check = orchestrator.run_cycle_at(CycleKind::Check, at("2025-01-16T13:00:00Z")).await;
        assert!(check.is_completed());
        orchestrator.wait_idle().await;
    }

    #[tokio::test]
    async fn test_guarded_cycle_is_idempotent_within_window() {
        let orchestrator = orchestrator().await;
        let now = Utc::now();
        assert!(orchestrator.run_cycle_at(CycleKind::Feedback, now).await.is_completed());
        assert!(orchestrator
            .run_cycle_at(CycleKind::Feedback, now + chrono::Duration::minutes(5))
            .await
            .is_skipped());
        assert!(orchestrator
            .run_cycle_at(CycleKind::Feedback, now + chrono::Duration::hours(7))
            .await
            .is_completed());
    }

    #[tokio::test]
    async fn test_evolution_waits_for_its_weekly_slot() {
        let orchestrator = orchestrator().await;
        // 2025-01-15 is a Wednesday
        let outcome = orchestrator.run_cycle_at(CycleKind::Evolution, at("2025-01-15T10:00:00Z")).await;
        assert!(outcome.is_skipped());

        let config = orchestrator.evolution.config().clone();
        let mut day = at("2025-01-13T00:00:00Z");
        while day.weekday() != config.weekday {
            day += chrono::Duration::days(1);
        }
        let slot = day + chrono::Duration::hours(i64::from(config.hour));
        assert!(orchestrator.run_cycle_at(CycleKind::Evolution, slot).await.is_completed());
        assert!(orchestrator.status().await.unwrap().last_evolution.is_some());
    }

    #[tokio::test]
    async fn test_failing_cycle_is_counted_and_others_continue() {
        let mut repos = Repositories::in_memory();
        repos.performance = Arc::new(BrokenPerformance);
        let orchestrator = orchestrator_with(repos).await;

        let outcome = orchestrator.run_cycle(CycleKind::Bootstrap).await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert!(orchestrator.run_cycle(CycleKind::Healing).await.is_completed());

        let status = orchestrator.status().await.unwrap();
        assert_eq!(status.cycle_errors.get(&CycleKind::Bootstrap), Some(&1));
        assert!(status.last_runs.contains_key(&CycleKind::Healing));
    }

    #[tokio::test]
    async fn test_manual_review_dispatches_job() {
        let orchestrator = orchestrator().await;
        let agent = orchestrator.repos.agents.list_active().await.unwrap().remove(0);
        let proposal = Proposal::new(
            agent.id,
            "northwind",
            crate::domain::proposal::ContentType::Reel,
            agent.variant,
            "explainer",
            crate::domain::proposal::ProposalPayload {
                title: "Hand written".to_string(),
                lines: vec!["one".to_string()],
                image_prompt: None,
            },
        );
        orchestrator.repos.proposals.save(&proposal).await.unwrap();

        let reviewed = orchestrator
            .review_proposal(proposal.id, ReviewDecision::Accept { note: Some("looks fine".to_string()) })
            .await
            .unwrap();
        let job_id = reviewed.accepted_job_id.unwrap();
        orchestrator.wait_idle().await;

        let job = orchestrator.repos.jobs.find_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, crate::domain::job::JobStatus::Completed);
        assert!(orchestrator
            .repos
            .schedule
            .find_by_job(job_id)
            .await
            .unwrap()
            .is_some());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Daily Burst
//!
//! Generates a day's worth of proposals for every brand of a tenant in two
//! phases: all reels first, then all posts. Each brand's target is split over
//! the active agents, every generated proposal goes through the quality gate,
//! and the accepted ones are handed to the dispatcher at the end of the phase.
//!
//! One agent or one brand failing never aborts the phase. Generation is
//! charged to the quota governor per agent request; a deferred request is
//! counted and skipped.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::agent::Agent;
use crate::domain::config::TenantConfig;
use crate::domain::cycle::BurstMode;
use crate::domain::events::CycleEvent;
use crate::domain::generator::GeneratorAgent;
use crate::domain::proposal::{ContentType, Proposal};
use crate::domain::quota::{QuotaGovernor, OP_CONTENT_GENERATION};
use crate::domain::repository::{AgentRepository, ProposalRepository};
use crate::infrastructure::event_bus::EventBus;

use super::dispatcher::JobDispatcher;
use super::quality_gate::{GateOutcome, QualityGate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub content_type: ContentType,
    pub requested: usize,
    pub generated: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub abandoned: usize,
    pub generation_errors: usize,
    /// Generation requests and examinations held back by quota.
    pub deferred: usize,
}

impl PhaseReport {
    fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            requested: 0,
            generated: 0,
            accepted: 0,
            rejected: 0,
            abandoned: 0,
            generation_errors: 0,
            deferred: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstReport {
    pub mode: BurstMode,
    pub started_at: DateTime<Utc>,
    pub reels: PhaseReport,
    pub posts: PhaseReport,
}

impl BurstReport {
    pub fn accepted(&self) -> usize {
        self.reels.accepted + self.posts.accepted
    }

    pub fn rejected(&self) -> usize {
        self.reels.rejected + self.posts.rejected
    }
}

/// Split `total` over `n` agents: an even share each, the remainder going one
/// apiece to the first agents. Callers order agents by survival score.
pub fn split_target(total: usize, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let base = total / n;
    let remainder = total % n;
    (0..n).map(|i| base + usize::from(i < remainder)).collect()
}

pub struct ContentBurst {
    tenant: TenantConfig,
    agents: Arc<dyn AgentRepository>,
    proposals: Arc<dyn ProposalRepository>,
    generator: Arc<dyn GeneratorAgent>,
    gate: Arc<QualityGate>,
    dispatcher: JobDispatcher,
    event_bus: EventBus,
    quota: Arc<QuotaGovernor>,
    running: Mutex<()>,
}

impl ContentBurst {
    pub fn new(
        tenant: TenantConfig,
        agents: Arc<dyn AgentRepository>,
        proposals: Arc<dyn ProposalRepository>,
        generator: Arc<dyn GeneratorAgent>,
        gate: Arc<QualityGate>,
        dispatcher: JobDispatcher,
        event_bus: EventBus,
    ) -> Self {
        Self {
            tenant,
            agents,
            proposals,
            generator,
            gate,
            dispatcher,
            event_bus,
            quota: Arc::new(QuotaGovernor::unmetered()),
            running: Mutex::new(()),
        }
    }

    pub fn with_quota(mut self, quota: Arc<QuotaGovernor>) -> Self {
        self.quota = quota;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Run one burst. Returns `None` when another burst of this tenant is
    /// still in progress.
    pub async fn run(&self, mode: BurstMode, now: DateTime<Utc>) -> Result<Option<BurstReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            info!(tenant = %self.tenant.id, "Burst already running; skipping");
            return Ok(None);
        };

        let mut agents = self.agents.list_active().await?;
        agents.sort_by(|a, b| {
            b.survival_score
                .total_cmp(&a.survival_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        info!(tenant = %self.tenant.id, %mode, agents = agents.len(), "Starting burst");

        let reels = self.run_phase(ContentType::Reel, mode, &agents, now).await;
        let posts = self.run_phase(ContentType::Post, mode, &agents, now).await;
        let report = BurstReport {
            mode,
            started_at: now,
            reels,
            posts,
        };

        counter!("autoreel_bursts_total", "mode" => mode.to_string()).increment(1);
        info!(
            tenant = %self.tenant.id,
            %mode,
            accepted = report.accepted(),
            rejected = report.rejected(),
            "Burst complete"
        );
        self.event_bus.publish(CycleEvent::BurstCompleted {
            mode,
            accepted: report.accepted(),
            rejected: report.rejected(),
            completed_at: Utc::now(),
        });
        Ok(Some(report))
    }

    async fn target_for(
        &self,
        brand: &str,
        daily: usize,
        content_type: ContentType,
        mode: BurstMode,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        match mode {
            BurstMode::Full => Ok(daily),
            BurstMode::Smart => {
                let since = self.tenant.local_midnight(now);
                let done = self
                    .proposals
                    .count_accepted_since(brand, content_type, since)
                    .await?;
                Ok(daily.saturating_sub(done))
            }
        }
    }

    async fn run_phase(
        &self,
        content_type: ContentType,
        mode: BurstMode,
        agents: &[Agent],
        now: DateTime<Utc>,
    ) -> PhaseReport {
        let mut report = PhaseReport::new(content_type);
        let mut accepted = Vec::new();

        for brand in &self.tenant.brands {
            let daily = match content_type {
                ContentType::Reel => brand.reels_per_day,
                ContentType::Post => brand.posts_per_day,
            };
            let target = match self
                .target_for(&brand.name, daily, content_type, mode, now)
                .await
            {
                Ok(target) => target,
                Err(e) => {
                    warn!(brand = %brand.name, error = %e, "Failed to compute burst target");
                    continue;
                }
            };
            if target == 0 || agents.is_empty() {
                continue;
            }
            report.requested += target;

            for (agent, share) in agents.iter().zip(split_target(target, agents.len())) {
                if share == 0 {
                    continue;
                }
                let calls = u32::try_from(share).unwrap_or(u32::MAX);
                if !self
                    .quota
                    .acquire_for(OP_CONTENT_GENERATION, calls, Some(agent.name.as_str()), now)
                {
                    info!(agent = %agent.name, brand = %brand.name, share, "Generation deferred by quota");
                    report.deferred += 1;
                    continue;
                }
                let generated = match self
                    .generator
                    .run(agent, share, content_type, &brand.name)
                    .await
                {
                    Ok(generated) => generated,
                    Err(e) => {
                        warn!(agent = %agent.name, brand = %brand.name, error = %e, "Agent failed to generate");
                        counter!("autoreel_generation_errors_total").increment(1);
                        report.generation_errors += 1;
                        continue;
                    }
                };
                report.generated += generated.len();
                for proposal in generated {
                    self.review_one(agent, proposal, now, &mut report, &mut accepted)
                        .await;
                }
            }
        }

        info!(
            %content_type,
            requested = report.requested,
            accepted = report.accepted,
            abandoned = report.abandoned,
            deferred = report.deferred,
            "Burst phase complete"
        );
        self.dispatcher.dispatch_batch(accepted);
        report
    }

    async fn review_one(
        &self,
        agent: &Agent,
        proposal: Proposal,
        now: DateTime<Utc>,
        report: &mut PhaseReport,
        accepted: &mut Vec<Proposal>,
    ) {
        match self.gate.review(agent, self.generator.as_ref(), proposal, now).await {
            Ok(outcome) => {
                report.rejected += outcome.rejections() as usize;
                match outcome {
                    GateOutcome::Accepted { proposal, .. } => {
                        report.accepted += 1;
                        accepted.push(proposal);
                    }
                    GateOutcome::Abandoned { .. } => report.abandoned += 1,
                    GateOutcome::Deferred { .. } => report.deferred += 1,
                }
            }
            Err(e) => {
                warn!(agent = %agent.name, error = %e, "Quality gate failed");
                report.abandoned += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::DispatchSettings;
    use crate::application::publishing::PublishScheduler;
    use crate::domain::agent::{AgentDna, DEFAULT_STRATEGIES};
    use crate::domain::config::BrandConfig;
    use crate::domain::generator::GenerationError;
    use crate::domain::proposal::{ContentVariant, ProposalPayload};
    use crate::domain::slots::SlotAllocator;
    use crate::infrastructure::dry_run::{LogPublisher, SimulatedRunner};
    use crate::infrastructure::examiner::HeuristicExaminer;
    use crate::infrastructure::repositories::{
        InMemoryAgentRepository, InMemoryJobRepository, InMemoryProposalRepository,
        InMemoryScheduleRepository,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    /// Records requests; fails for one named agent.
    #[derive(Default)]
    struct RecordingGenerator {
        calls: AsyncMutex<Vec<(String, usize, ContentType)>>,
        broken_agent: Option<String>,
    }

    #[async_trait]
    impl GeneratorAgent for RecordingGenerator {
        async fn run(
            &self,
            agent: &Agent,
            max_proposals: usize,
            content_type: ContentType,
            brand: &str,
        ) -> Result<Vec<Proposal>, GenerationError> {
            self.calls
                .lock()
                .await
                .push((agent.name.clone(), max_proposals, content_type));
            if self.broken_agent.as_deref() == Some(agent.name.as_str()) {
                return Err(GenerationError::Unavailable("offline".to_string()));
            }
            Ok((0..max_proposals)
                .map(|i| {
                    Proposal::new(
                        agent.id,
                        brand,
                        content_type,
                        agent.variant,
                        "explainer",
                        ProposalPayload {
                            title: format!("Why sleep matters, part {}", i + 1),
                            lines: vec![
                                "Sleep consolidates memory".to_string(),
                                "Aim for a fixed wake time".to_string(),
                                "Limit screens late at night".to_string(),
                                "Keep the room cool".to_string(),
                            ],
                            image_prompt: None,
                        },
                    )
                })
                .collect())
        }
    }

    fn agent(name: &str, score: f64) -> Agent {
        let strategies: Vec<String> = DEFAULT_STRATEGIES.iter().map(|s| s.to_string()).collect();
        let mut agent = Agent::new(name, ContentVariant::Light, AgentDna::seed(&strategies).unwrap());
        agent.survival_score = score;
        agent
    }

    async fn fixture(generator: Arc<RecordingGenerator>) -> (ContentBurst, Arc<InMemoryProposalRepository>) {
        let agents = Arc::new(InMemoryAgentRepository::new());
        agents.save(&agent("low", 1.0)).await.unwrap();
        agents.save(&agent("high", 9.0)).await.unwrap();

        let proposals = Arc::new(InMemoryProposalRepository::new());
        let jobs = Arc::new(InMemoryJobRepository::new());
        let event_bus = EventBus::new(64);
        let mut brand = BrandConfig::new("northwind");
        brand.reels_per_day = 3;
        brand.posts_per_day = 1;
        let tenant = TenantConfig {
            id: "acme".to_string(),
            utc_offset_hours: 0,
            burst_hour: 6,
            agents_per_variant: 1,
            brands: vec![brand],
        };
        let publishing = Arc::new(PublishScheduler::new(
            Arc::new(SlotAllocator::default()),
            Arc::new(InMemoryScheduleRepository::new()),
            jobs.clone(),
            Arc::new(LogPublisher),
            HashMap::new(),
            event_bus.clone(),
        ));
        let dispatcher = JobDispatcher::new(
            jobs,
            proposals.clone(),
            Arc::new(SimulatedRunner::new(Duration::ZERO, 0.0)),
            publishing,
            event_bus.clone(),
            DispatchSettings {
                stagger: Duration::ZERO,
                ..DispatchSettings::default()
            },
        );
        let gate = Arc::new(QualityGate::new(
            Arc::new(HeuristicExaminer::default()),
            proposals.clone(),
            event_bus.clone(),
            1,
        ));
        let burst = ContentBurst::new(
            tenant,
            agents,
            proposals.clone(),
            generator,
            gate,
            dispatcher,
            event_bus,
        );
        (burst, proposals)
    }

    #[test]
    fn test_split_target_gives_remainder_to_first() {
        assert_eq!(split_target(7, 3), vec![3, 2, 2]);
        assert_eq!(split_target(2, 4), vec![1, 1, 0, 0]);
        assert!(split_target(5, 0).is_empty());
        assert_eq!(split_target(9, 4).iter().sum::<usize>(), 9);
    }

    #[tokio::test]
    async fn test_reels_phase_precedes_posts() {
        let generator = Arc::new(RecordingGenerator::default());
        let (burst, _) = fixture(generator.clone()).await;

        let report = burst.run(BurstMode::Full, Utc::now()).await.unwrap().unwrap();
        assert_eq!(report.reels.requested, 3);
        assert_eq!(report.posts.requested, 1);

        let calls = generator.calls.lock().await.clone();
        let first_post = calls.iter().position(|c| c.2 == ContentType::Post).unwrap();
        assert!(calls[..first_post].iter().all(|c| c.2 == ContentType::Reel));
        // highest survival score takes the odd reel
        assert_eq!(calls[0], ("high".to_string(), 2, ContentType::Reel));
        assert_eq!(calls[1], ("low".to_string(), 1, ContentType::Reel));
    }

    #[tokio::test]
    async fn test_failing_agent_does_not_abort_burst() {
        let generator = Arc::new(RecordingGenerator {
            broken_agent: Some("high".to_string()),
            ..Default::default()
        });
        let (burst, _) = fixture(generator).await;

        let report = burst.run(BurstMode::Full, Utc::now()).await.unwrap().unwrap();
        assert_eq!(report.reels.generation_errors, 1);
        assert_eq!(report.reels.generated, 1);
    }

    #[tokio::test]
    async fn test_smart_mode_only_fills_shortfall() {
        let generator = Arc::new(RecordingGenerator::default());
        let (burst, proposals) = fixture(generator.clone()).await;
        let now = Utc::now();

        let mut done = Proposal::new(
            agent("high", 9.0).id,
            "northwind",
            ContentType::Reel,
            ContentVariant::Light,
            "explainer",
            ProposalPayload {
                title: "Earlier today".to_string(),
                lines: vec!["a".to_string()],
                image_prompt: None,
            },
        );
        done.accept(None, now).unwrap();
        proposals.save(&done).await.unwrap();

        let report = burst.run(BurstMode::Smart, now).await.unwrap().unwrap();
        assert_eq!(report.reels.requested, 2);
        assert_eq!(report.posts.requested, 1);
    }

    #[tokio::test]
    async fn test_generation_is_charged_to_quota() {
        let quota = Arc::new(
            QuotaGovernor::with_default_priorities(std::collections::BTreeMap::from([(
                "llm".to_string(),
                crate::domain::quota::ServiceQuota::hourly(2),
            )]))
            .with_routes(std::collections::BTreeMap::from([(
                OP_CONTENT_GENERATION.to_string(),
                "llm".to_string(),
            )])),
        );
        let generator = Arc::new(RecordingGenerator::default());
        let (burst, _) = fixture(generator.clone()).await;
        let burst = burst.with_quota(quota.clone());
        let now = Utc::now();

        let report = burst.run(BurstMode::Full, now).await.unwrap().unwrap();
        // "high" spends both calls on its two reels; everything after waits
        assert_eq!(report.reels.generated, 2);
        assert_eq!(report.reels.deferred, 1);
        assert_eq!(report.posts.deferred, 1);
        assert!(generator.calls.lock().await.iter().all(|c| c.0 == "high"));
        let window = quota.window("llm", now).unwrap();
        assert_eq!(window.agent_breakdown.get("high"), Some(&2));
    }

    #[tokio::test]
    async fn test_smart_mode_counts_reviews_at_cycle_time() {
        let generator = Arc::new(RecordingGenerator::default());
        let (burst, _) = fixture(generator).await;
        let later = Utc::now() + chrono::Duration::days(2);

        let full = burst.run(BurstMode::Full, later).await.unwrap().unwrap();
        let smart = burst.run(BurstMode::Smart, later).await.unwrap().unwrap();
        assert_eq!(smart.reels.requested, 3 - full.reels.accepted);
        assert_eq!(smart.posts.requested, 1 - full.posts.accepted);
    }
}

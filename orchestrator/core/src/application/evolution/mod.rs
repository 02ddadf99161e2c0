// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Evolution Engine
//!
//! Closes the loop from published performance back to agent behaviour:
//!
//! - [`feedback`] measures matured content per agent and per strategy
//! - [`adaptation`] nudges each measured agent's DNA
//! - [`selection`] archives the best, retires chronic strugglers and spawns successors
//! - [`patterns`] keeps aggregate observations with confidence and decay
//!
//! Every DNA change is validated before it is saved and appended to the
//! learning log.

pub mod adaptation;
pub mod feedback;
pub mod patterns;
pub mod selection;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::application::repository_factory::Repositories;
use crate::domain::agent::{Agent, AgentDna, AgentId};
use crate::domain::config::EvolutionConfig;
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::gene_pool::GenePoolEntry;
use crate::domain::learning::MutationRecord;
use crate::domain::proposal::ContentVariant;
use crate::infrastructure::event_bus::EventBus;

use adaptation::AdaptationParams;
use feedback::{FeedbackItem, FeedbackReport};
use selection::SelectionParams;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackOutcome {
    pub items: usize,
    pub agents_scored: usize,
    pub adapted: usize,
    pub patterns_updated: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    pub ranked: usize,
    pub archived: Vec<AgentId>,
    pub struggling: Vec<AgentId>,
    pub retired: Vec<AgentId>,
    pub spawned: Vec<Agent>,
    pub evicted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EvolutionOutcome {
    pub selection: SelectionOutcome,
    pub patterns_pruned: usize,
}

pub struct EvolutionEngine {
    repos: Repositories,
    config: EvolutionConfig,
    event_bus: EventBus,
}

impl EvolutionEngine {
    pub fn new(repos: Repositories, config: EvolutionConfig, event_bus: EventBus) -> Self {
        Self {
            repos,
            config,
            event_bus,
        }
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    fn adaptation_params(&self) -> AdaptationParams {
        AdaptationParams {
            learning_rate: self.config.learning_rate,
            temperature_step: self.config.temperature_step,
            min_samples: self.config.min_samples,
            full_confidence_samples: self.config.full_confidence_samples,
        }
    }

    fn selection_params(&self) -> SelectionParams {
        SelectionParams {
            thriving_fraction: self.config.thriving_fraction,
            struggling_fraction: self.config.struggling_fraction,
            retire_after_runs: self.config.retire_after_runs,
            min_population: self.config.min_population_for_selection,
        }
    }

    /// Create `per_variant` agents with uniform DNA for each variant, unless
    /// the tenant already has agents. Returns the active population.
    pub async fn seed_population(&self, variants: &[ContentVariant], per_variant: usize) -> Result<Vec<Agent>> {
        if !self.repos.agents.list_all().await?.is_empty() {
            return Ok(self.repos.agents.list_active().await?);
        }

        let dna = AgentDna::seed(&self.config.strategies)?;
        let mut seeded = Vec::with_capacity(variants.len() * per_variant);
        for variant in variants {
            for i in 1..=per_variant {
                let agent = Agent::new(format!("{}-{}", variant, i), *variant, dna.clone());
                self.repos.agents.save(&agent).await?;
                self.event_bus.publish(AgentLifecycleEvent::AgentSpawned {
                    agent_id: agent.id,
                    variant: agent.variant,
                    generation: agent.generation,
                    parent_id: None,
                    inherited: false,
                    spawned_at: agent.created_at,
                });
                seeded.push(agent);
            }
        }
        info!(agents = seeded.len(), "Seeded initial population");
        Ok(seeded)
    }

    pub async fn collect_feedback(&self, now: DateTime<Utc>) -> Result<FeedbackReport> {
        feedback::collect(
            &self.repos,
            now,
            Duration::hours(self.config.feedback_min_age_hours),
            Duration::hours(self.config.feedback_max_age_hours),
        )
        .await
    }

    /// Feedback cycle body: score agents, learn patterns, adapt DNA.
    pub async fn run_feedback(&self, now: DateTime<Utc>) -> Result<FeedbackOutcome> {
        let report = self.collect_feedback(now).await?;
        if report.is_empty() {
            debug!("No matured content to learn from");
            return Ok(FeedbackOutcome::default());
        }

        let mut outcome = FeedbackOutcome {
            items: report.items.len(),
            ..Default::default()
        };
        for (agent_id, fb) in &report.agents {
            match self.repos.agents.find_by_id(*agent_id).await? {
                Some(mut agent) => {
                    agent.survival_score = fb.survival_score;
                    agent.updated_at = now;
                    self.repos.agents.save(&agent).await?;
                    outcome.agents_scored += 1;
                }
                None => debug!(agent_id = %agent_id, "Feedback for unknown agent"),
            }
        }

        outcome.patterns_updated = self.update_patterns(&report.items, now).await?;
        outcome.adapted = self.adapt(&report, now).await?;
        info!(
            items = outcome.items,
            agents = outcome.agents_scored,
            adapted = outcome.adapted,
            patterns = outcome.patterns_updated,
            "Feedback applied"
        );
        Ok(outcome)
    }

    /// Adapt every active agent that has feedback in `report`.
    pub async fn adapt(&self, report: &FeedbackReport, now: DateTime<Utc>) -> Result<usize> {
        let agents = self.repos.agents.list_active().await?;
        let mut scores: Vec<f64> = agents.iter().map(|a| a.survival_score).collect();
        let population_median = adaptation::median(&mut scores);
        let params = self.adaptation_params();

        let mut adapted = 0;
        for mut agent in agents {
            let Some(fb) = report.agents.get(&agent.id) else {
                continue;
            };
            let result = match adaptation::adapt(&agent.dna, fb, population_median, &params) {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(e) => {
                    warn!(agent = %agent.name, error = %e, "Mutation aborted");
                    continue;
                }
            };

            let before = agent.dna.clone();
            if let Err(e) = agent.apply_dna(result.dna.clone(), now) {
                warn!(agent = %agent.name, error = %e, "Mutation rejected by invariants");
                continue;
            }
            self.repos.agents.save(&agent).await?;
            self.repos
                .learning_log
                .append(&MutationRecord {
                    agent_id: agent.id,
                    before,
                    after: result.dna,
                    survival_score: agent.survival_score,
                    sample_size: fb.sample_size,
                    confidence: result.confidence,
                    reason: result.reason,
                    recorded_at: now,
                })
                .await?;
            self.event_bus.publish(AgentLifecycleEvent::AgentAdapted {
                agent_id: agent.id,
                confidence: result.confidence,
                survival_score: agent.survival_score,
                adapted_at: now,
            });
            adapted += 1;
        }
        Ok(adapted)
    }

    pub async fn update_patterns(&self, items: &[FeedbackItem], now: DateTime<Utc>) -> Result<usize> {
        let observations = patterns::extract(items);
        for obs in &observations {
            let existing = self.repos.patterns.find_by_subject(&obs.subject).await?;
            let merged = patterns::merge(existing, obs, &self.config.patterns, now);
            self.repos.patterns.save(&merged).await?;
        }
        Ok(observations.len())
    }

    /// Refresh decay weights and drop stale, low-confidence patterns.
    pub async fn prune_patterns(&self, now: DateTime<Utc>) -> Result<usize> {
        let cfg = &self.config.patterns;
        let mut pruned = 0;
        for mut pattern in self.repos.patterns.list_all().await? {
            if patterns::should_prune(&pattern, cfg, now) {
                self.repos.patterns.delete(pattern.id).await?;
                pruned += 1;
            } else {
                pattern.refresh_decay(now, cfg.half_life_days);
                self.repos.patterns.save(&pattern).await?;
            }
        }
        if pruned > 0 {
            info!(pruned, "Pruned stale patterns");
        }
        Ok(pruned)
    }

    pub async fn run_selection(&self, now: DateTime<Utc>) -> Result<SelectionOutcome> {
        let mut rng = StdRng::from_os_rng();
        self.run_selection_with(now, &mut rng).await
    }

    /// Selection with an injected random source.
    pub async fn run_selection_with(&self, now: DateTime<Utc>, rng: &mut StdRng) -> Result<SelectionOutcome> {
        let agents = self.repos.agents.list_active().await?;
        let plan = selection::plan(&agents, &self.selection_params());
        let mut by_id: HashMap<AgentId, Agent> = agents.into_iter().map(|a| (a.id, a)).collect();

        let mut outcome = SelectionOutcome {
            ranked: by_id.len(),
            ..Default::default()
        };

        for id in &plan.thriving {
            let Some(agent) = by_id.get(id) else { continue };
            match self.archive(agent, now).await {
                Ok(()) => outcome.archived.push(*id),
                Err(e) => warn!(agent = %agent.name, error = %e, "Failed to archive agent"),
            }
        }

        let pool = self.repos.gene_pool.list_all().await?;
        for gene_id in selection::evictions(&pool, self.config.max_gene_pool) {
            match self.repos.gene_pool.delete(gene_id).await {
                Ok(()) => outcome.evicted += 1,
                Err(e) => warn!(gene = %gene_id, error = %e, "Failed to evict gene pool entry"),
            }
        }

        for id in plan.thriving.iter().chain(plan.steady.iter()) {
            if let Some(agent) = by_id.get_mut(id) {
                if agent.struggle_streak != 0 {
                    agent.struggle_streak = 0;
                    agent.updated_at = now;
                    if let Err(e) = self.repos.agents.save(agent).await {
                        warn!(agent = %agent.name, error = %e, "Failed to reset struggle streak");
                    }
                }
            }
        }
        for id in &plan.struggling {
            if let Some(agent) = by_id.get_mut(id) {
                agent.struggle_streak += 1;
                agent.updated_at = now;
                match self.repos.agents.save(agent).await {
                    Ok(()) => outcome.struggling.push(*id),
                    Err(e) => warn!(agent = %agent.name, error = %e, "Failed to record struggle"),
                }
            }
        }

        for id in &plan.retiring {
            let Some(parent) = by_id.get_mut(id) else { continue };
            match self.replace(parent, now, rng).await {
                Ok(child) => {
                    outcome.retired.push(parent.id);
                    outcome.spawned.push(child);
                }
                Err(e) => warn!(agent = %parent.name, error = %e, "Agent replacement failed"),
            }
        }

        info!(
            ranked = outcome.ranked,
            archived = outcome.archived.len(),
            struggling = outcome.struggling.len(),
            retired = outcome.retired.len(),
            "Selection complete"
        );
        Ok(outcome)
    }

    async fn archive(&self, agent: &Agent, now: DateTime<Utc>) -> Result<()> {
        let entry = match self.repos.gene_pool.find_by_source_agent(agent.id).await? {
            Some(mut existing) => {
                existing.refresh_from(agent, now);
                existing
            }
            None => GenePoolEntry::archive(agent, now),
        };
        self.repos.gene_pool.save(&entry).await?;
        Ok(())
    }

    /// Spawn and persist a successor, then retire `parent`.
    ///
    /// The parent stays active unless its successor was saved.
    async fn replace(&self, parent: &mut Agent, now: DateTime<Utc>, rng: &mut StdRng) -> Result<Agent> {
        let pool = self.repos.gene_pool.list_all().await?;
        let (dna, source) = selection::successor_dna(
            parent,
            &pool,
            &self.config.strategies,
            self.config.inherit_probability,
            self.config.mutation_noise,
            rng,
        )?;

        let child = Agent::successor_of(parent, dna);
        self.repos.agents.save(&child).await?;

        parent.retire(now);
        if let Err(e) = self.repos.agents.save(parent).await {
            warn!(agent = %parent.name, error = %e, "Successor saved but parent could not be retired");
            parent.active = true;
            return Err(e.into());
        }

        if let Some(gene_id) = source {
            if let Some(mut gene) = pool.into_iter().find(|g| g.id == gene_id) {
                gene.times_inherited += 1;
                if let Err(e) = self.repos.gene_pool.save(&gene).await {
                    warn!(gene = %gene_id, error = %e, "Failed to record inheritance");
                }
            }
        }

        self.event_bus.publish(AgentLifecycleEvent::AgentRetired {
            agent_id: parent.id,
            survival_score: parent.survival_score,
            retired_at: now,
        });
        self.event_bus.publish(AgentLifecycleEvent::AgentSpawned {
            agent_id: child.id,
            variant: child.variant,
            generation: child.generation,
            parent_id: child.parent_id,
            inherited: source.is_some(),
            spawned_at: now,
        });
        info!(
            retired = %parent.name,
            spawned = %child.name,
            generation = child.generation,
            inherited = source.is_some(),
            "Agent replaced"
        );
        Ok(child)
    }

    /// Weekly evolution cycle body.
    pub async fn run_evolution(&self, now: DateTime<Utc>) -> Result<EvolutionOutcome> {
        let selection = self.run_selection(now).await?;
        let patterns_pruned = self.prune_patterns(now).await?;
        Ok(EvolutionOutcome {
            selection,
            patterns_pruned,
        })
    }
}

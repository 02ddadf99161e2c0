// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dry-run adapters for every external capability.
//!
//! They let the full cycle loop run locally with no network access: proposals
//! come from templates, rendering is a short sleep, publishing only logs, and
//! engagement numbers are synthesised for whatever has been published.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;

use crate::domain::agent::Agent;
use crate::domain::generator::{GenerationError, GeneratorAgent};
use crate::domain::job::{Job, JobError, JobOutput};
use crate::domain::performance::{PerformanceRecord, TrendingItem};
use crate::domain::proposal::{ContentType, Proposal, ProposalPayload};
use crate::domain::publisher::{PlatformResult, Publisher};
use crate::domain::repository::ScheduleRepository;
use crate::domain::runner::JobRunner;
use crate::domain::sources::{MetricsSource, SourceError, TrendSource};

const TOPICS: &[&str] = &[
    "sleep",
    "hydration",
    "posture",
    "focus",
    "stretching",
    "breakfast",
    "stress",
    "walking",
];

fn title_for(strategy: &str, topic: &str) -> String {
    match strategy {
        "myth_buster" => format!("The biggest myth about {}", topic),
        "listicle" => format!("Five quick wins for better {}", topic),
        "comparison" => format!("{}: what works and what does not", topic),
        "protocol" => format!("A simple daily {} protocol", topic),
        _ => format!("Why {} matters more than you think", topic),
    }
}

/// Template-driven generator. Higher temperature picks strategies more freely
/// and produces longer scripts.
#[derive(Default)]
pub struct TemplateGenerator;

#[async_trait]
impl GeneratorAgent for TemplateGenerator {
    async fn run(
        &self,
        agent: &Agent,
        max_proposals: usize,
        content_type: ContentType,
        brand: &str,
    ) -> Result<Vec<Proposal>, GenerationError> {
        let mut rng = rand::rng();
        let mut proposals = Vec::with_capacity(max_proposals);
        for _ in 0..max_proposals {
            let weights = &agent.dna.strategy_weights;
            let explore = rng.random_bool(agent.dna.temperature.clamp(0.0, 1.0) * 0.2);
            let picked = if explore && !weights.is_empty() {
                let index = rng.random_range(0..weights.len());
                weights.iter().nth(index).map(|(k, _)| k.as_str())
            } else {
                weights.sample(&mut rng)
            };
            let strategy = picked
                .ok_or_else(|| GenerationError::Malformed("agent has no strategies".to_string()))?
                .to_string();

            let topic = TOPICS[rng.random_range(0..TOPICS.len())];
            let line_count = 3 + (agent.dna.temperature * 4.0).round() as usize;
            let lines = (1..=line_count)
                .map(|i| format!("Point {} about {}", i, topic))
                .collect();
            proposals.push(Proposal::new(
                agent.id,
                brand,
                content_type,
                agent.variant,
                strategy.clone(),
                ProposalPayload {
                    title: title_for(&strategy, topic),
                    lines,
                    image_prompt: (content_type == ContentType::Post)
                        .then(|| format!("flat illustration of {}", topic)),
                },
            ));
        }
        Ok(proposals)
    }
}

/// Pretends to render: waits, then returns a media reference.
pub struct SimulatedRunner {
    render_time: Duration,
    failure_rate: f64,
}

impl SimulatedRunner {
    pub fn new(render_time: Duration, failure_rate: f64) -> Self {
        Self {
            render_time,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimulatedRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), 0.0)
    }
}

#[async_trait]
impl JobRunner for SimulatedRunner {
    async fn process(&self, job: &Job) -> Result<JobOutput, JobError> {
        tokio::time::sleep(self.render_time).await;
        if self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate) {
            return Err(JobError::Render("simulated render timeout".to_string()));
        }
        Ok(JobOutput {
            media_ref: format!("dry-run://{}/{}.mp4", job.brand, job.id),
            caption: format!("{} {} for {}", job.variant, job.content_type, job.brand),
        })
    }
}

/// Logs instead of publishing; every platform succeeds.
#[derive(Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        platforms: &BTreeSet<String>,
        media_ref: &str,
        caption: &str,
    ) -> BTreeMap<String, PlatformResult> {
        platforms
            .iter()
            .map(|platform| {
                info!(platform = %platform, media = media_ref, caption, "Dry-run publish");
                (
                    platform.clone(),
                    PlatformResult::ok(format!("dry-{}-{}", platform, uuid::Uuid::new_v4())),
                )
            })
            .collect()
    }
}

/// Synthesises engagement for entries that were actually published.
pub struct SimulatedMetricsSource {
    schedule: Arc<dyn ScheduleRepository>,
}

impl SimulatedMetricsSource {
    pub fn new(schedule: Arc<dyn ScheduleRepository>) -> Self {
        Self { schedule }
    }
}

#[async_trait]
impl MetricsSource for SimulatedMetricsSource {
    async fn collect(
        &self,
        brand: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceRecord>, SourceError> {
        let now = Utc::now();
        let entries = self
            .schedule
            .list_published_between(since, now)
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;
        let mut rng = rand::rng();
        Ok(entries
            .into_iter()
            .filter(|e| e.brand == brand)
            .filter_map(|e| {
                let published_at = e.published_at?;
                let views = rng.random_range(100..5_000u64);
                Some(PerformanceRecord {
                    entry_id: e.id,
                    job_id: e.job_id,
                    brand: e.brand,
                    views,
                    likes: views / rng.random_range(10..40u64),
                    saves: views / rng.random_range(80..400u64),
                    shares: views / rng.random_range(100..600u64),
                    comments: views / rng.random_range(150..800u64),
                    published_at,
                    collected_at: now,
                })
            })
            .collect())
    }
}

/// Fixed trend list, re-stamped on each scan.
#[derive(Default)]
pub struct StaticTrendSource;

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn scan(&self, kind: &str, limit: usize) -> Result<Vec<TrendingItem>, SourceError> {
        let now = Utc::now();
        Ok(TOPICS
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, topic)| TrendingItem {
                kind: kind.to_string(),
                title: topic.to_string(),
                source: "dry-run".to_string(),
                score: 1.0 - i as f64 / TOPICS.len() as f64,
                discovered_at: now,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentDna;
    use crate::domain::proposal::ContentVariant;

    #[tokio::test]
    async fn test_template_generator_respects_agent() {
        let strategies = vec!["listicle".to_string(), "protocol".to_string()];
        let agent = Agent::new("a", ContentVariant::Dark, AgentDna::seed(&strategies).unwrap());
        let proposals = TemplateGenerator
            .run(&agent, 4, ContentType::Post, "northwind")
            .await
            .unwrap();
        assert_eq!(proposals.len(), 4);
        for p in &proposals {
            assert_eq!(p.agent_id, agent.id);
            assert_eq!(p.variant, ContentVariant::Dark);
            assert!(strategies.contains(&p.strategy));
            assert!(p.payload.image_prompt.is_some());
            assert!(p.is_pending());
        }
    }

    #[test]
    fn test_log_publisher_succeeds_everywhere() {
        let platforms = BTreeSet::from(["instagram".to_string(), "facebook".to_string()]);
        let results = tokio_test::block_on(LogPublisher.publish(&platforms, "m", "c"));
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.success));
    }

    #[test]
    fn test_static_trends_respect_limit() {
        let items = tokio_test::block_on(StaticTrendSource.scan("health", 2)).unwrap();
        assert!(items.len() <= 2);
    }
}

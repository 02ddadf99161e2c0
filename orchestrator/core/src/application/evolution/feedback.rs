// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feedback: attribute published content to the agents that proposed it.
//!
//! Only content in the maturity window (by default published 48 to 72 hours
//! ago) is measured, so engagement has settled but is still recent. This is
//! pure measurement; nothing here mutates an agent.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::repository_factory::Repositories;
use crate::domain::agent::AgentId;
use crate::domain::proposal::ContentVariant;
use crate::domain::schedule::EntryId;

/// One published entry joined back to its agent and scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub entry_id: EntryId,
    pub agent_id: AgentId,
    pub strategy: String,
    pub variant: ContentVariant,
    pub title: String,
    /// UTC hour of the slot the entry was published in.
    pub posting_hour: u32,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub sample_size: usize,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFeedback {
    pub agent_id: AgentId,
    /// Mean item score; becomes the agent's survival score.
    pub survival_score: f64,
    pub sample_size: usize,
    pub strategies: BTreeMap<String, StrategyPerformance>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackReport {
    pub items: Vec<FeedbackItem>,
    pub agents: BTreeMap<AgentId, AgentFeedback>,
}

impl FeedbackReport {
    pub fn from_items(items: Vec<FeedbackItem>) -> Self {
        let agents = aggregate(&items);
        Self { items, agents }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mean score over every item in the report.
    pub fn population_mean(&self) -> Option<f64> {
        mean(self.items.iter().map(|i| i.score))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Group items per agent and per strategy.
pub fn aggregate(items: &[FeedbackItem]) -> BTreeMap<AgentId, AgentFeedback> {
    let mut grouped: BTreeMap<AgentId, Vec<&FeedbackItem>> = BTreeMap::new();
    for item in items {
        grouped.entry(item.agent_id).or_default().push(item);
    }

    grouped
        .into_iter()
        .map(|(agent_id, items)| {
            let mut by_strategy: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for item in &items {
                by_strategy.entry(item.strategy.clone()).or_default().push(item.score);
            }
            let strategies = by_strategy
                .into_iter()
                .map(|(strategy, scores)| {
                    let perf = StrategyPerformance {
                        sample_size: scores.len(),
                        mean_score: scores.iter().sum::<f64>() / scores.len() as f64,
                    };
                    (strategy, perf)
                })
                .collect();
            let feedback = AgentFeedback {
                agent_id,
                survival_score: mean(items.iter().map(|i| i.score)).unwrap_or(0.0),
                sample_size: items.len(),
                strategies,
            };
            (agent_id, feedback)
        })
        .collect()
}

/// Collect feedback items for entries published in `[now - max_age, now - min_age]`.
///
/// Entries whose job, proposal or metrics are missing are skipped.
pub async fn collect(
    repos: &Repositories,
    now: DateTime<Utc>,
    min_age: Duration,
    max_age: Duration,
) -> Result<FeedbackReport> {
    let entries = repos
        .schedule
        .list_published_between(now - max_age, now - min_age)
        .await?;

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(job) = repos.jobs.find_by_id(entry.job_id).await? else {
            debug!(entry_id = %entry.id, "Feedback skipped: job missing");
            continue;
        };
        let Some(proposal) = repos.proposals.find_by_id(job.proposal_id).await? else {
            debug!(entry_id = %entry.id, "Feedback skipped: proposal missing");
            continue;
        };
        let Some(record) = repos.performance.latest_for_entry(entry.id).await? else {
            debug!(entry_id = %entry.id, "Feedback skipped: no metrics yet");
            continue;
        };
        items.push(FeedbackItem {
            entry_id: entry.id,
            agent_id: proposal.agent_id,
            strategy: proposal.strategy,
            variant: proposal.variant,
            title: proposal.payload.title,
            posting_hour: entry.scheduled_time.hour(),
            score: record.engagement_score(),
        });
    }
    Ok(FeedbackReport::from_items(items))
}

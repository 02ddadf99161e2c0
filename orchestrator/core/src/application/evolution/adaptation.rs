// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptation: nudge an agent's DNA towards the strategies that worked for it.

use std::collections::BTreeMap;

use crate::domain::agent::{AgentDna, DnaError, StrategyWeights, TEMPERATURE_MAX, TEMPERATURE_MIN};

use super::feedback::AgentFeedback;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptationParams {
    pub learning_rate: f64,
    pub temperature_step: f64,
    pub min_samples: usize,
    pub full_confidence_samples: usize,
}

impl Default for AdaptationParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.2,
            temperature_step: 0.05,
            min_samples: 3,
            full_confidence_samples: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Adaptation {
    pub dna: AgentDna,
    pub confidence: f64,
    pub reason: String,
}

/// `min(1, n / full)`.
pub fn confidence(sample_size: usize, full_confidence_samples: usize) -> f64 {
    if full_confidence_samples == 0 {
        return 1.0;
    }
    (sample_size as f64 / full_confidence_samples as f64).min(1.0)
}

/// Compute the adapted DNA for one agent.
///
/// Returns `Ok(None)` when the sample is too small to act on. The returned DNA
/// has been validated; an `Err` means the mutation must be discarded.
pub fn adapt(
    dna: &AgentDna,
    feedback: &AgentFeedback,
    population_median: f64,
    params: &AdaptationParams,
) -> Result<Option<Adaptation>, DnaError> {
    if feedback.sample_size < params.min_samples {
        return Ok(None);
    }
    let confidence = confidence(feedback.sample_size, params.full_confidence_samples);
    let agent_mean = feedback.survival_score;
    let scale = agent_mean.max(1.0);

    let raw: BTreeMap<String, f64> = dna
        .strategy_weights
        .iter()
        .map(|(strategy, weight)| {
            let delta = feedback
                .strategies
                .get(strategy)
                .map(|perf| {
                    let relative = ((perf.mean_score - agent_mean) / scale).clamp(-1.0, 1.0);
                    params.learning_rate * confidence * relative
                })
                .unwrap_or(0.0);
            (strategy.clone(), (weight + delta).clamp(0.0, 1.0))
        })
        .collect();
    let weights = StrategyWeights::normalized(raw)?;

    let step = params.temperature_step * confidence;
    let (temperature, direction) = if agent_mean < population_median {
        (dna.temperature + step, "explore")
    } else if agent_mean > population_median {
        (dna.temperature - step, "exploit")
    } else {
        (dna.temperature, "hold")
    };
    let temperature = temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);

    let adapted = AgentDna::new(weights, temperature)?;
    let reason = format!(
        "{} samples, mean {:.1} vs median {:.1}: {}",
        feedback.sample_size, agent_mean, population_median, direction
    );
    Ok(Some(Adaptation {
        dna: adapted,
        confidence,
        reason,
    }))
}

/// Median of the given scores; `0.0` when empty.
pub fn median(scores: &mut [f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.sort_by(|a, b| a.total_cmp(b));
    let mid = scores.len() / 2;
    if scores.len() % 2 == 0 {
        (scores[mid - 1] + scores[mid]) / 2.0
    } else {
        scores[mid]
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Selection: weekly ranking of the active population.
//!
//! The top band is archived to the gene pool, the bottom band accumulates a
//! struggle streak, and agents that stay at the bottom for `retire_after_runs`
//! consecutive runs are replaced by a successor.

use rand::Rng;

use crate::domain::agent::{Agent, AgentDna, AgentId, DnaError};
use crate::domain::gene_pool::{GeneId, GenePoolEntry};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionParams {
    pub thriving_fraction: f64,
    pub struggling_fraction: f64,
    pub retire_after_runs: u32,
    pub min_population: usize,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            thriving_fraction: 0.4,
            struggling_fraction: 0.2,
            retire_after_runs: 2,
            min_population: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionPlan {
    /// Best first.
    pub thriving: Vec<AgentId>,
    pub struggling: Vec<AgentId>,
    /// Everyone else; their streaks reset.
    pub steady: Vec<AgentId>,
    /// Struggling agents whose streak reaches the retirement threshold this run.
    pub retiring: Vec<AgentId>,
}

/// Rank active agents and split them into bands.
///
/// Populations smaller than `min_population` still archive their thriving
/// agents but nobody is marked struggling.
pub fn plan(agents: &[Agent], params: &SelectionParams) -> SelectionPlan {
    let mut ranked: Vec<&Agent> = agents.iter().filter(|a| a.active).collect();
    ranked.sort_by(|a, b| {
        b.survival_score
            .total_cmp(&a.survival_score)
            .then(a.created_at.cmp(&b.created_at))
    });
    let n = ranked.len();
    if n == 0 {
        return SelectionPlan::default();
    }

    let thriving_count = ((n as f64 * params.thriving_fraction).ceil() as usize).min(n);
    let struggling_count = if n < params.min_population {
        0
    } else {
        ((n as f64 * params.struggling_fraction).floor() as usize).min(n - thriving_count)
    };

    let mut plan = SelectionPlan::default();
    for (rank, agent) in ranked.iter().enumerate() {
        if rank < thriving_count {
            plan.thriving.push(agent.id);
        } else if rank >= n - struggling_count {
            plan.struggling.push(agent.id);
            if agent.struggle_streak + 1 >= params.retire_after_runs {
                plan.retiring.push(agent.id);
            }
        } else {
            plan.steady.push(agent.id);
        }
    }
    plan
}

/// DNA for a successor: inherited from a random pool entry with probability
/// `inherit_probability` (preferring entries of the parent's variant), then
/// perturbed by `noise`; otherwise random.
pub fn successor_dna<R: Rng + ?Sized>(
    parent: &Agent,
    pool: &[GenePoolEntry],
    strategies: &[String],
    inherit_probability: f64,
    noise: f64,
    rng: &mut R,
) -> Result<(AgentDna, Option<GeneId>), DnaError> {
    let same_variant: Vec<&GenePoolEntry> = pool.iter().filter(|g| g.variant == parent.variant).collect();
    let candidates: Vec<&GenePoolEntry> = if same_variant.is_empty() {
        pool.iter().collect()
    } else {
        same_variant
    };

    if !candidates.is_empty() && rng.random_bool(inherit_probability.clamp(0.0, 1.0)) {
        let gene = candidates[rng.random_range(0..candidates.len())];
        return Ok((gene.dna.mutated(noise, rng)?, Some(gene.id)));
    }
    Ok((AgentDna::random(strategies, rng)?, None))
}

/// Enforce the pool cap by evicting the lowest scores. Returns the evicted ids.
pub fn evictions(pool: &[GenePoolEntry], max_size: usize) -> Vec<GeneId> {
    if pool.len() <= max_size {
        return Vec::new();
    }
    let mut ranked: Vec<&GenePoolEntry> = pool.iter().collect();
    ranked.sort_by(|a, b| {
        a.survival_score
            .total_cmp(&b.survival_score)
            .then(a.archived_at.cmp(&b.archived_at))
    });
    ranked
        .into_iter()
        .take(pool.len() - max_size)
        .map(|g| g.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proposal::ContentVariant;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn strategies() -> Vec<String> {
        vec!["listicle".to_string(), "protocol".to_string(), "explainer".to_string()]
    }

    fn population(scores: &[f64]) -> Vec<Agent> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let mut agent = Agent::new(
                    format!("agent-{}", i),
                    ContentVariant::Light,
                    AgentDna::seed(&strategies()).unwrap(),
                );
                agent.survival_score = *score;
                agent
            })
            .collect()
    }

    #[test]
    fn test_bands() {
        let agents = population(&[10.0, 50.0, 30.0, 20.0, 40.0]);
        let plan = plan(&agents, &SelectionParams::default());
        // ceil(0.4 * 5) = 2 thriving, floor(0.2 * 5) = 1 struggling
        assert_eq!(plan.thriving, vec![agents[1].id, agents[4].id]);
        assert_eq!(plan.struggling, vec![agents[0].id]);
        assert_eq!(plan.steady.len(), 2);
        assert!(plan.retiring.is_empty());
    }

    #[test]
    fn test_second_struggling_run_retires() {
        let mut agents = population(&[10.0, 50.0, 30.0, 20.0, 40.0]);
        agents[0].struggle_streak = 1;
        let plan = plan(&agents, &SelectionParams::default());
        assert_eq!(plan.retiring, vec![agents[0].id]);
    }

    #[test]
    fn test_small_population_not_culled() {
        let mut agents = population(&[10.0, 50.0]);
        agents[0].struggle_streak = 5;
        let plan = plan(&agents, &SelectionParams::default());
        assert!(plan.struggling.is_empty());
        assert!(plan.retiring.is_empty());
        assert_eq!(plan.thriving, vec![agents[1].id]);
    }

    #[test]
    fn test_inherited_dna_round_trip() {
        let agents = population(&[80.0]);
        let parent = &agents[0];
        let gene = GenePoolEntry::archive(parent, Utc::now());
        let mut rng = StdRng::seed_from_u64(7);

        let (dna, source) =
            successor_dna(parent, std::slice::from_ref(&gene), &strategies(), 1.0, 0.0, &mut rng).unwrap();
        assert_eq!(source, Some(gene.id));
        assert_eq!(dna, parent.dna);
    }

    #[test]
    fn test_empty_pool_gives_random_valid_dna() {
        let agents = population(&[5.0]);
        let mut rng = StdRng::seed_from_u64(11);
        let (dna, source) = successor_dna(&agents[0], &[], &strategies(), 1.0, 0.05, &mut rng).unwrap();
        assert!(source.is_none());
        assert!(dna.validate().is_ok());
    }

    #[test]
    fn test_evictions_drop_lowest() {
        let agents = population(&[10.0, 30.0, 20.0]);
        let pool: Vec<GenePoolEntry> = agents.iter().map(|a| GenePoolEntry::archive(a, Utc::now())).collect();
        assert_eq!(evictions(&pool, 2), vec![pool[0].id]);
        assert!(evictions(&pool, 3).is_empty());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! A content-generation persona. Its behaviour is described by [`AgentDna`]:
//! a typed strategy-weight map plus a sampling temperature. DNA is mutated only
//! by the adaptation step of the evolution engine, and agents are retired
//! (deactivated) by selection.
//!
//! ## Invariants
//!
//! - every strategy weight is in `[0, 1]`
//! - strategy weights sum to `1.0 ± 0.01`
//! - temperature is in `[0.50, 1.0]`

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::proposal::ContentVariant;

pub const TEMPERATURE_MIN: f64 = 0.50;
pub const TEMPERATURE_MAX: f64 = 1.0;
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Strategies seeded into fresh agents when the configuration names none.
pub const DEFAULT_STRATEGIES: &[&str] = &[
    "explainer",
    "myth_buster",
    "listicle",
    "comparison",
    "protocol",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DnaError {
    #[error("strategy weights are empty")]
    EmptyWeights,

    #[error("weight for strategy '{strategy}' out of range: {weight}")]
    WeightOutOfRange { strategy: String, weight: f64 },

    #[error("strategy weights sum to {0:.4}, expected 1.0 ± 0.01")]
    BadSum(f64),

    #[error("temperature {0} outside [0.50, 1.0]")]
    TemperatureOutOfRange(f64),
}

/// Named strategy → weight map, validated on construction and deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct StrategyWeights(BTreeMap<String, f64>);

impl StrategyWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, DnaError> {
        let weights = Self(weights);
        weights.validate()?;
        Ok(weights)
    }

    /// Equal weight for every strategy.
    pub fn uniform(strategies: &[String]) -> Result<Self, DnaError> {
        if strategies.is_empty() {
            return Err(DnaError::EmptyWeights);
        }
        let share = 1.0 / strategies.len() as f64;
        Self::new(strategies.iter().map(|s| (s.clone(), share)).collect())
    }

    /// Clamps every raw value into `[0, 1]` and rescales so the weights sum to one.
    /// A map whose values are all zero collapses to a uniform distribution.
    pub fn normalized(raw: BTreeMap<String, f64>) -> Result<Self, DnaError> {
        if raw.is_empty() {
            return Err(DnaError::EmptyWeights);
        }
        let clamped: BTreeMap<String, f64> = raw
            .into_iter()
            .map(|(k, v)| (k, if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }))
            .collect();
        let total: f64 = clamped.values().sum();
        if total <= f64::EPSILON {
            let keys: Vec<String> = clamped.into_keys().collect();
            return Self::uniform(&keys);
        }
        Self::new(clamped.into_iter().map(|(k, v)| (k, v / total)).collect())
    }

    pub fn validate(&self) -> Result<(), DnaError> {
        if self.0.is_empty() {
            return Err(DnaError::EmptyWeights);
        }
        for (strategy, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 || *weight > 1.0 {
                return Err(DnaError::WeightOutOfRange {
                    strategy: strategy.clone(),
                    weight: *weight,
                });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(DnaError::BadSum(sum));
        }
        Ok(())
    }

    pub fn get(&self, strategy: &str) -> f64 {
        self.0.get(strategy).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }

    /// Strategy with the highest weight (ties resolve alphabetically).
    pub fn dominant(&self) -> Option<&str> {
        self.0
            .iter()
            .fold(None::<(&String, f64)>, |best, (k, v)| match best {
                Some((_, bv)) if bv >= *v => best,
                _ => Some((k, *v)),
            })
            .map(|(k, _)| k.as_str())
    }

    /// Weighted random pick of a strategy.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        let mut roll = rng.random::<f64>() * self.sum();
        let mut last = None;
        for (strategy, weight) in &self.0 {
            last = Some(strategy.as_str());
            if roll < *weight {
                return last;
            }
            roll -= weight;
        }
        last
    }
}

impl TryFrom<BTreeMap<String, f64>> for StrategyWeights {
    type Error = DnaError;

    fn try_from(value: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StrategyWeights> for BTreeMap<String, f64> {
    fn from(value: StrategyWeights) -> Self {
        value.0
    }
}

/// Mutable behavioural genome of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDna {
    pub strategy_weights: StrategyWeights,
    pub temperature: f64,
}

impl AgentDna {
    pub fn new(strategy_weights: StrategyWeights, temperature: f64) -> Result<Self, DnaError> {
        let dna = Self {
            strategy_weights,
            temperature,
        };
        dna.validate()?;
        Ok(dna)
    }

    pub fn validate(&self) -> Result<(), DnaError> {
        self.strategy_weights.validate()?;
        if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&self.temperature) {
            return Err(DnaError::TemperatureOutOfRange(self.temperature));
        }
        Ok(())
    }

    /// Uniform weights at the midpoint temperature.
    pub fn seed(strategies: &[String]) -> Result<Self, DnaError> {
        Self::new(
            StrategyWeights::uniform(strategies)?,
            (TEMPERATURE_MIN + TEMPERATURE_MAX) / 2.0,
        )
    }

    /// Freshly randomised DNA within valid ranges.
    pub fn random<R: Rng + ?Sized>(strategies: &[String], rng: &mut R) -> Result<Self, DnaError> {
        if strategies.is_empty() {
            return Err(DnaError::EmptyWeights);
        }
        let raw = strategies
            .iter()
            .map(|s| (s.clone(), rng.random_range(0.05..1.0)))
            .collect();
        Self::new(
            StrategyWeights::normalized(raw)?,
            rng.random_range(TEMPERATURE_MIN..=TEMPERATURE_MAX),
        )
    }

    /// Copy with bounded uniform noise applied to every gene. Zero noise is an exact copy.
    pub fn mutated<R: Rng + ?Sized>(&self, noise: f64, rng: &mut R) -> Result<Self, DnaError> {
        if noise <= 0.0 {
            return Ok(self.clone());
        }
        let raw = self
            .strategy_weights
            .iter()
            .map(|(k, v)| (k.clone(), v + rng.random_range(-noise..=noise)))
            .collect();
        let temperature = (self.temperature + rng.random_range(-noise..=noise) * 0.5)
            .clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
        Self::new(StrategyWeights::normalized(raw)?, temperature)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub variant: ContentVariant,
    pub dna: AgentDna,
    pub survival_score: f64,
    pub generation: u32,
    pub active: bool,
    /// Consecutive selection runs spent in the struggling band.
    pub struggle_streak: u32,
    pub parent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_adapted_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(name: impl Into<String>, variant: ContentVariant, dna: AgentDna) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            variant,
            dna,
            survival_score: 0.0,
            generation: 0,
            active: true,
            struggle_streak: 0,
            parent_id: None,
            created_at: now,
            updated_at: now,
            last_adapted_at: None,
        }
    }

    /// Replacement for a retired agent: same variant, next generation.
    pub fn successor_of(parent: &Agent, dna: AgentDna) -> Self {
        let generation = parent.generation + 1;
        let base = parent
            .name
            .rsplit_once("-g")
            .map(|(base, _)| base)
            .unwrap_or(&parent.name);
        let mut child = Self::new(format!("{}-g{}", base, generation), parent.variant, dna);
        child.generation = generation;
        child.parent_id = Some(parent.id);
        child
    }

    pub fn validate(&self) -> Result<(), DnaError> {
        self.dna.validate()
    }

    /// Replace the DNA after validating it; the previous DNA stays on error.
    pub fn apply_dna(&mut self, dna: AgentDna, at: DateTime<Utc>) -> Result<(), DnaError> {
        dna.validate()?;
        self.dna = dna;
        self.updated_at = at;
        self.last_adapted_at = Some(at);
        Ok(())
    }

    pub fn retire(&mut self, at: DateTime<Utc>) {
        self.active = false;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn strategies() -> Vec<String> {
        DEFAULT_STRATEGIES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_uniform_weights_are_valid() {
        let weights = StrategyWeights::uniform(&strategies()).unwrap();
        assert_eq!(weights.len(), 5);
        assert!((weights.sum() - 1.0).abs() < 1e-9);
        assert!((weights.get("explainer") - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_new_rejects_bad_sum() {
        let raw = BTreeMap::from([("a".to_string(), 0.7), ("b".to_string(), 0.7)]);
        assert!(matches!(StrategyWeights::new(raw), Err(DnaError::BadSum(_))));
    }

    #[test]
    fn test_normalized_clamps_and_rescales() {
        let raw = BTreeMap::from([
            ("a".to_string(), 3.0),
            ("b".to_string(), -1.0),
            ("c".to_string(), 1.0),
        ]);
        let weights = StrategyWeights::normalized(raw).unwrap();
        assert!((weights.get("a") - 0.5).abs() < 1e-9);
        assert_eq!(weights.get("b"), 0.0);
        assert!((weights.get("c") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_all_zero_falls_back_to_uniform() {
        let raw = BTreeMap::from([("a".to_string(), 0.0), ("b".to_string(), f64::NAN)]);
        let weights = StrategyWeights::normalized(raw).unwrap();
        assert!((weights.get("a") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_bounds() {
        let weights = StrategyWeights::uniform(&strategies()).unwrap();
        assert!(AgentDna::new(weights.clone(), 0.49).is_err());
        assert!(AgentDna::new(weights.clone(), 1.01).is_err());
        assert!(AgentDna::new(weights, 0.5).is_ok());
    }

    #[test]
    fn test_deserialize_rejects_invalid_weights() {
        let json = r#"{"strategy_weights":{"a":0.9,"b":0.9},"temperature":0.7}"#;
        assert!(serde_json::from_str::<AgentDna>(json).is_err());
    }

    #[test]
    fn test_random_and_mutated_dna_stay_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let dna = AgentDna::random(&strategies(), &mut rng).unwrap();
            assert!(dna.validate().is_ok());
            let child = dna.mutated(0.2, &mut rng).unwrap();
            assert!(child.validate().is_ok());
        }
    }

    #[test]
    fn test_zero_noise_mutation_is_exact_copy() {
        let mut rng = StdRng::seed_from_u64(1);
        let dna = AgentDna::random(&strategies(), &mut rng).unwrap();
        assert_eq!(dna.mutated(0.0, &mut rng).unwrap(), dna);
    }

    #[test]
    fn test_successor_increments_generation() {
        let parent = Agent::new(
            "scout",
            ContentVariant::Dark,
            AgentDna::seed(&strategies()).unwrap(),
        );
        let child = Agent::successor_of(&parent, parent.dna.clone());
        assert_eq!(child.generation, 1);
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.variant, ContentVariant::Dark);
        assert_eq!(child.name, "scout-g1");

        let grandchild = Agent::successor_of(&child, child.dna.clone());
        assert_eq!(grandchild.name, "scout-g2");
    }

    #[test]
    fn test_dominant_and_sample() {
        let raw = BTreeMap::from([("a".to_string(), 0.1), ("b".to_string(), 0.9)]);
        let weights = StrategyWeights::new(raw).unwrap();
        assert_eq!(weights.dominant(), Some("b"));
        let mut rng = StdRng::seed_from_u64(3);
        let picks: Vec<&str> = (0..100).filter_map(|_| weights.sample(&mut rng)).collect();
        assert!(picks.iter().filter(|p| **p == "b").count() > 60);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Learned Patterns
//!
//! Aggregated observations extracted from feedback ("explainers score above
//! average", "the 16:00 slot underperforms"). Each pattern is keyed by its
//! [`PatternData`] subject and accumulates samples across feedback runs.
//!
//! Confidence grows with samples as `n / (n + k)`. Relevance fades with age
//! through an exponential half-life, and stale low-confidence patterns are
//! pruned by the evolution cycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::proposal::ContentVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    StrategyPerformance,
    PostingHour,
    Variant,
    TitleLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleLengthBucket {
    /// Up to 30 characters.
    Short,
    /// 31 to 60 characters.
    Medium,
    Long,
}

impl TitleLengthBucket {
    pub fn of(title: &str) -> Self {
        match title.chars().count() {
            0..=30 => TitleLengthBucket::Short,
            31..=60 => TitleLengthBucket::Medium,
            _ => TitleLengthBucket::Long,
        }
    }
}

/// Subject of a pattern. Two patterns with equal subjects are the same pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternSubject {
    Strategy { strategy: String },
    PostingHour { hour: u32 },
    Variant { variant: ContentVariant },
    TitleLength { bucket: TitleLengthBucket },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternData {
    pub subject: PatternSubject,
    /// Mean item score over all samples.
    pub mean_score: f64,
    /// Mean item score relative to the population mean of the run that last
    /// updated it; positive means above average.
    pub lift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: PatternId,
    pub pattern_type: PatternType,
    pub data: PatternData,
    pub confidence_score: f64,
    pub decay_weight: f64,
    pub sample_size: usize,
    pub first_seen: DateTime<Utc>,
    pub last_validated: DateTime<Utc>,
}

impl PatternSubject {
    pub fn pattern_type(&self) -> PatternType {
        match self {
            PatternSubject::Strategy { .. } => PatternType::StrategyPerformance,
            PatternSubject::PostingHour { .. } => PatternType::PostingHour,
            PatternSubject::Variant { .. } => PatternType::Variant,
            PatternSubject::TitleLength { .. } => PatternType::TitleLength,
        }
    }
}

impl LearnedPattern {
    pub fn new(
        subject: PatternSubject,
        mean_score: f64,
        lift: f64,
        sample_size: usize,
        confidence_k: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PatternId::new(),
            pattern_type: subject.pattern_type(),
            data: PatternData {
                subject,
                mean_score,
                lift,
            },
            confidence_score: confidence(sample_size, confidence_k),
            decay_weight: 1.0,
            sample_size,
            first_seen: at,
            last_validated: at,
        }
    }

    /// Merge a new batch of observations into the running mean.
    pub fn observe(
        &mut self,
        mean_score: f64,
        lift: f64,
        samples: usize,
        confidence_k: f64,
        at: DateTime<Utc>,
    ) {
        if samples == 0 {
            return;
        }
        let total = self.sample_size + samples;
        self.data.mean_score = (self.data.mean_score * self.sample_size as f64
            + mean_score * samples as f64)
            / total as f64;
        self.data.lift = lift;
        self.sample_size = total;
        self.confidence_score = confidence(total, confidence_k);
        self.last_validated = at;
        self.decay_weight = 1.0;
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_validated).num_seconds().max(0) as f64 / 86_400.0
    }

    pub fn refresh_decay(&mut self, now: DateTime<Utc>, half_life_days: f64) {
        self.decay_weight = decay_weight(self.age_days(now), half_life_days);
    }

    /// Effective weight of the pattern for ranking.
    pub fn weight(&self) -> f64 {
        self.confidence_score * self.decay_weight
    }
}

/// `n / (n + k)`, in `[0, 1)`.
pub fn confidence(sample_size: usize, k: f64) -> f64 {
    let n = sample_size as f64;
    if n + k <= 0.0 {
        return 0.0;
    }
    (n / (n + k)).clamp(0.0, 1.0)
}

/// `0.5 ^ (age / half_life)`.
pub fn decay_weight(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    0.5f64.powf(age_days.max(0.0) / half_life_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_confidence_grows_with_samples() {
        assert_eq!(confidence(0, 10.0), 0.0);
        assert!((confidence(10, 10.0) - 0.5).abs() < 1e-12);
        assert!(confidence(90, 10.0) > confidence(10, 10.0));
        assert!(confidence(10_000, 10.0) < 1.0);
    }

    #[test]
    fn test_decay_half_life() {
        assert!((decay_weight(0.0, 14.0) - 1.0).abs() < 1e-12);
        assert!((decay_weight(14.0, 14.0) - 0.5).abs() < 1e-12);
        assert!((decay_weight(28.0, 14.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_observe_merges_means() {
        let t0 = Utc::now();
        let mut p = LearnedPattern::new(
            PatternSubject::Strategy {
                strategy: "listicle".to_string(),
            },
            40.0,
            0.1,
            2,
            10.0,
            t0,
        );
        p.observe(70.0, 0.3, 1, 10.0, t0 + Duration::days(1));
        assert_eq!(p.sample_size, 3);
        assert!((p.data.mean_score - 50.0).abs() < 1e-9);
        assert_eq!(p.pattern_type, PatternType::StrategyPerformance);
        assert_eq!(p.last_validated, t0 + Duration::days(1));
    }

    #[test]
    fn test_title_buckets() {
        assert_eq!(TitleLengthBucket::of("Short"), TitleLengthBucket::Short);
        assert_eq!(TitleLengthBucket::of(&"x".repeat(45)), TitleLengthBucket::Medium);
        assert_eq!(TitleLengthBucket::of(&"x".repeat(61)), TitleLengthBucket::Long);
    }
}

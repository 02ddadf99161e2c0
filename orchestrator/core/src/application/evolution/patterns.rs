// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern extraction and pruning.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::config::PatternConfig;
use crate::domain::pattern::{LearnedPattern, PatternSubject, TitleLengthBucket};

use super::feedback::FeedbackItem;

/// Aggregate observation for one subject in one feedback run.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub subject: PatternSubject,
    pub mean_score: f64,
    pub lift: f64,
    pub samples: usize,
}

/// Group feedback items by every pattern subject they belong to.
pub fn extract(items: &[FeedbackItem]) -> Vec<Observation> {
    if items.is_empty() {
        return Vec::new();
    }
    let population_mean = items.iter().map(|i| i.score).sum::<f64>() / items.len() as f64;

    let mut grouped: HashMap<PatternSubject, (f64, usize)> = HashMap::new();
    for item in items {
        let subjects = [
            PatternSubject::Strategy {
                strategy: item.strategy.clone(),
            },
            PatternSubject::PostingHour {
                hour: item.posting_hour,
            },
            PatternSubject::Variant { variant: item.variant },
            PatternSubject::TitleLength {
                bucket: TitleLengthBucket::of(&item.title),
            },
        ];
        for subject in subjects {
            let slot = grouped.entry(subject).or_insert((0.0, 0));
            slot.0 += item.score;
            slot.1 += 1;
        }
    }

    let mut observations: Vec<Observation> = grouped
        .into_iter()
        .map(|(subject, (sum, samples))| {
            let mean_score = sum / samples as f64;
            Observation {
                subject,
                mean_score,
                lift: mean_score - population_mean,
                samples,
            }
        })
        .collect();
    observations.sort_by(|a, b| b.samples.cmp(&a.samples).then(b.lift.total_cmp(&a.lift)));
    observations
}

/// Fold an observation into the stored pattern, or start a new one.
pub fn merge(existing: Option<LearnedPattern>, obs: &Observation, cfg: &PatternConfig, at: DateTime<Utc>) -> LearnedPattern {
    match existing {
        Some(mut pattern) => {
            pattern.observe(obs.mean_score, obs.lift, obs.samples, cfg.confidence_k, at);
            pattern
        }
        None => LearnedPattern::new(
            obs.subject.clone(),
            obs.mean_score,
            obs.lift,
            obs.samples,
            cfg.confidence_k,
            at,
        ),
    }
}

/// Low confidence and old: no longer worth keeping.
pub fn should_prune(pattern: &LearnedPattern, cfg: &PatternConfig, now: DateTime<Utc>) -> bool {
    pattern.confidence_score < cfg.min_confidence && pattern.age_days(now) > cfg.max_age_days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::proposal::ContentVariant;
    use crate::domain::schedule::EntryId;
    use chrono::Duration;

    fn item(strategy: &str, hour: u32, score: f64) -> FeedbackItem {
        FeedbackItem {
            entry_id: EntryId::new(),
            agent_id: AgentId::new(),
            strategy: strategy.to_string(),
            variant: ContentVariant::Dark,
            title: "Short title".to_string(),
            posting_hour: hour,
            score,
        }
    }

    #[test]
    fn test_extract_covers_every_subject_type() {
        let obs = extract(&[item("listicle", 8, 60.0), item("protocol", 8, 20.0)]);
        let strategy = obs
            .iter()
            .find(|o| o.subject == PatternSubject::Strategy { strategy: "listicle".to_string() })
            .unwrap();
        assert!((strategy.lift - 20.0).abs() < 1e-9);

        let hour = obs
            .iter()
            .find(|o| o.subject == PatternSubject::PostingHour { hour: 8 })
            .unwrap();
        assert_eq!(hour.samples, 2);
        assert!(hour.lift.abs() < 1e-9);
        assert!(obs.iter().any(|o| matches!(o.subject, PatternSubject::Variant { .. })));
        assert!(obs.iter().any(|o| matches!(o.subject, PatternSubject::TitleLength { .. })));
    }

    #[test]
    fn test_merge_accumulates_samples() {
        let cfg = PatternConfig::default();
        let now = Utc::now();
        let obs = Observation {
            subject: PatternSubject::PostingHour { hour: 4 },
            mean_score: 30.0,
            lift: 2.0,
            samples: 5,
        };
        let first = merge(None, &obs, &cfg, now);
        let second = merge(Some(first.clone()), &obs, &cfg, now);
        assert_eq!(second.id, first.id);
        assert_eq!(second.sample_size, 10);
        assert!(second.confidence_score > first.confidence_score);
    }

    #[test]
    fn test_prune_requires_low_confidence_and_age() {
        let cfg = PatternConfig::default();
        let now = Utc::now();
        let old = now - Duration::days(60);
        let weak = LearnedPattern::new(PatternSubject::PostingHour { hour: 0 }, 1.0, 0.0, 1, cfg.confidence_k, old);
        let strong = LearnedPattern::new(PatternSubject::PostingHour { hour: 4 }, 1.0, 0.0, 100, cfg.confidence_k, old);
        let fresh = LearnedPattern::new(PatternSubject::PostingHour { hour: 8 }, 1.0, 0.0, 1, cfg.confidence_k, now);
        assert!(should_prune(&weak, &cfg, now));
        assert!(!should_prune(&strong, &cfg, now));
        assert!(!should_prune(&fresh, &cfg, now));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::JobId;
use crate::domain::schedule::EntryId;

/// Engagement snapshot for one published entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub entry_id: EntryId,
    pub job_id: JobId,
    pub brand: String,
    pub views: u64,
    pub likes: u64,
    pub saves: u64,
    pub shares: u64,
    pub comments: u64,
    pub published_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
}

impl PerformanceRecord {
    /// `20 * log10(1 + views + 5*likes + 20*saves + 25*shares + 10*comments)`.
    pub fn engagement_score(&self) -> f64 {
        let weighted = self.views as f64
            + 5.0 * self.likes as f64
            + 20.0 * self.saves as f64
            + 25.0 * self.shares as f64
            + 10.0 * self.comments as f64;
        20.0 * (1.0 + weighted).log10()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingItem {
    /// Trend category, e.g. `topic` or `audio`.
    pub kind: String,
    pub title: String,
    pub source: String,
    pub score: f64,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(views: u64, likes: u64, saves: u64, shares: u64, comments: u64) -> PerformanceRecord {
        let now = Utc::now();
        PerformanceRecord {
            entry_id: EntryId::new(),
            job_id: JobId::new(),
            brand: "northwind".to_string(),
            views,
            likes,
            saves,
            shares,
            comments,
            published_at: now,
            collected_at: now,
        }
    }

    #[test]
    fn test_engagement_score_zero() {
        assert_eq!(record(0, 0, 0, 0, 0).engagement_score(), 0.0);
    }

    #[test]
    fn test_engagement_score_weights() {
        // 99 + 5*10 + 20*5 + 25*2 + 10*10 = 399 -> 1 + 399 = 400
        let score = record(99, 10, 5, 2, 10).engagement_score();
        assert!((score - 20.0 * 400f64.log10()).abs() < 1e-9);
        assert!(record(0, 0, 1, 0, 0).engagement_score() > record(0, 1, 0, 0, 0).engagement_score());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Heuristic examiner that scores proposals from the shape of their payload.
//!
//! Used by the dry-run host and tests in place of a model-backed examiner.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::examiner::{Examiner, ExaminerError, ScoreResult};
use crate::domain::proposal::{ContentType, Proposal};

pub const DEFAULT_BANNED_PHRASES: &[&str] = &["click here", "guaranteed", "miracle", "100% cure"];

pub struct HeuristicExaminer {
    threshold: f64,
    banned_phrases: Vec<String>,
}

impl HeuristicExaminer {
    pub fn new(threshold: f64, banned_phrases: Vec<String>) -> Self {
        let banned_phrases = if banned_phrases.is_empty() {
            DEFAULT_BANNED_PHRASES.iter().map(|s| s.to_string()).collect()
        } else {
            banned_phrases
        };
        Self {
            threshold,
            banned_phrases: banned_phrases.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn title_score(title: &str) -> f64 {
        match title.trim().chars().count() {
            0 => 0.0,
            1..=9 => 5.0,
            10..=70 => 10.0,
            _ => 6.0,
        }
    }

    fn structure_score(content_type: ContentType, lines: usize) -> f64 {
        let (min, max) = match content_type {
            ContentType::Reel => (3, 8),
            ContentType::Post => (3, 10),
        };
        if lines == 0 {
            0.0
        } else if lines < min {
            10.0 * lines as f64 / min as f64
        } else if lines > max {
            (10.0 - (lines - max) as f64).max(2.0)
        } else {
            10.0
        }
    }

    fn clarity_score(lines: &[String]) -> f64 {
        let empty = lines.iter().filter(|l| l.trim().is_empty()).count();
        let overlong = lines.iter().filter(|l| l.chars().count() > 140).count();
        (10.0 - 3.0 * empty as f64 - 1.5 * overlong as f64).max(0.0)
    }
}

impl Default for HeuristicExaminer {
    fn default() -> Self {
        Self::new(6.0, Vec::new())
    }
}

#[async_trait]
impl Examiner for HeuristicExaminer {
    async fn examine(&self, proposal: &Proposal) -> Result<ScoreResult, ExaminerError> {
        let payload = &proposal.payload;
        let mut sub_scores = BTreeMap::new();
        sub_scores.insert("title".to_string(), Self::title_score(&payload.title));
        sub_scores.insert(
            "structure".to_string(),
            Self::structure_score(proposal.content_type, payload.lines.len()),
        );
        sub_scores.insert("clarity".to_string(), Self::clarity_score(&payload.lines));

        let text = std::iter::once(payload.title.as_str())
            .chain(payload.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();
        let red_flags: Vec<String> = self
            .banned_phrases
            .iter()
            .filter(|p| text.contains(p.as_str()))
            .map(|p| format!("banned phrase: {}", p))
            .collect();

        let mean = sub_scores.values().sum::<f64>() / sub_scores.len() as f64;
        let composite_score = (mean - 2.0 * red_flags.len() as f64).clamp(0.0, 10.0);
        let passed = red_flags.is_empty() && composite_score >= self.threshold;

        let reason = if !red_flags.is_empty() {
            red_flags.join("; ")
        } else if passed {
            format!("composite {:.1} meets threshold {:.1}", composite_score, self.threshold)
        } else {
            let weakest = sub_scores
                .iter()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| k.as_str())
                .unwrap_or("overall");
            format!(
                "composite {:.1} below threshold {:.1} (weakest: {})",
                composite_score, self.threshold, weakest
            )
        };

        Ok(ScoreResult {
            passed,
            composite_score,
            sub_scores,
            verdict: if passed { "pass" } else { "fail" }.to_string(),
            reason,
            red_flags,
        })
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Examiner
//!
//! Scores a proposal and decides whether it may become a job. The scoring model
//! is opaque to the orchestrator; only the [`ScoreResult`] shape is fixed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::proposal::{ExaminerScores, Proposal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub passed: bool,
    /// 0.0 - 10.0
    pub composite_score: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    pub verdict: String,
    pub reason: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

impl ScoreResult {
    pub fn to_scores(&self) -> ExaminerScores {
        ExaminerScores {
            composite_score: self.composite_score,
            sub_scores: self.sub_scores.clone(),
            verdict: self.verdict.clone(),
            reason: self.reason.clone(),
            red_flags: self.red_flags.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExaminerError {
    #[error("examiner unavailable: {0}")]
    Unavailable(String),

    #[error("examiner response could not be parsed: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Examiner: Send + Sync {
    async fn examine(&self, proposal: &Proposal) -> Result<ScoreResult, ExaminerError>;

    fn name(&self) -> &str;
}

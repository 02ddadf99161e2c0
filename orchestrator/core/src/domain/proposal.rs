// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Proposal Aggregate
//!
//! One candidate unit of content for one brand, produced by an agent run and
//! reviewed exactly once by the quality gate (or a human reviewer).
//!
//! ## Status Transitions
//! | From | To | Trigger |
//! |------|----|---------|
//! | `Pending` | `Accepted` | examiner passed, or manual accept |
//! | `Pending` | `Rejected` | examiner failed, or manual reject |
//!
//! Both targets are terminal. Only reviewer notes may change afterwards.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::job::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Reel,
    Post,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Reel => write!(f, "reel"),
            ContentType::Post => write!(f, "post"),
        }
    }
}

/// Visual variant of a piece of content; reel slots alternate between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentVariant {
    Light,
    Dark,
}

impl ContentVariant {
    pub const ALL: [ContentVariant; 2] = [ContentVariant::Light, ContentVariant::Dark];

    pub fn other(self) -> Self {
        match self {
            ContentVariant::Light => ContentVariant::Dark,
            ContentVariant::Dark => ContentVariant::Light,
        }
    }
}

impl fmt::Display for ContentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentVariant::Light => write!(f, "light"),
            ContentVariant::Dark => write!(f, "dark"),
        }
    }
}

impl std::str::FromStr for ContentVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(ContentVariant::Light),
            "dark" => Ok(ContentVariant::Dark),
            other => Err(format!("unknown content variant '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalPayload {
    pub title: String,
    /// Reel script lines or post slide texts, in order.
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Scores persisted on the proposal once the examiner has looked at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExaminerScores {
    pub composite_score: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    pub verdict: String,
    pub reason: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ProposalError {
    #[error("proposal {id} already reviewed ({status:?})")]
    AlreadyReviewed { id: ProposalId, status: ProposalStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub agent_id: AgentId,
    pub brand: String,
    pub content_type: ContentType,
    pub variant: ContentVariant,
    /// Strategy the agent drew from its DNA for this proposal.
    pub strategy: String,
    pub payload: ProposalPayload,
    pub status: ProposalStatus,
    pub scores: Option<ExaminerScores>,
    pub accepted_job_id: Option<JobId>,
    pub regeneration_of: Option<ProposalId>,
    pub retry_count: u32,
    #[serde(default)]
    pub reviewer_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(
        agent_id: AgentId,
        brand: impl Into<String>,
        content_type: ContentType,
        variant: ContentVariant,
        strategy: impl Into<String>,
        payload: ProposalPayload,
    ) -> Self {
        Self {
            id: ProposalId::new(),
            agent_id,
            brand: brand.into(),
            content_type,
            variant,
            strategy: strategy.into(),
            payload,
            status: ProposalStatus::Pending,
            scores: None,
            accepted_job_id: None,
            regeneration_of: None,
            retry_count: 0,
            reviewer_notes: Vec::new(),
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    fn ensure_pending(&self) -> Result<(), ProposalError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(ProposalError::AlreadyReviewed {
                id: self.id,
                status: self.status,
            })
        }
    }

    pub fn accept(&mut self, scores: Option<ExaminerScores>, at: DateTime<Utc>) -> Result<(), ProposalError> {
        self.ensure_pending()?;
        self.status = ProposalStatus::Accepted;
        self.scores = scores;
        self.reviewed_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, scores: Option<ExaminerScores>, at: DateTime<Utc>) -> Result<(), ProposalError> {
        self.ensure_pending()?;
        self.status = ProposalStatus::Rejected;
        self.scores = scores;
        self.reviewed_at = Some(at);
        Ok(())
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.reviewer_notes.push(note.into());
    }

    /// Link a regenerated proposal back to the one it replaces.
    pub fn mark_regeneration_of(&mut self, original: &Proposal) {
        self.regeneration_of = Some(original.id);
        self.retry_count = original.retry_count + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> Proposal {
        Proposal::new(
            AgentId::new(),
            "northwind",
            ContentType::Reel,
            ContentVariant::Light,
            "explainer",
            ProposalPayload {
                title: "Why sleep matters".to_string(),
                lines: vec!["line one".to_string()],
                image_prompt: None,
            },
        )
    }

    #[test]
    fn test_review_is_terminal() {
        let mut p = proposal();
        let at = Utc::now();
        p.accept(None, at).unwrap();
        assert_eq!(p.status, ProposalStatus::Accepted);
        assert_eq!(p.reviewed_at, Some(at));
        assert!(matches!(p.reject(None, at), Err(ProposalError::AlreadyReviewed { .. })));
        assert_eq!(p.status, ProposalStatus::Accepted);
    }

    #[test]
    fn test_notes_allowed_after_review() {
        let mut p = proposal();
        p.reject(None, Utc::now()).unwrap();
        p.add_note("too generic");
        assert_eq!(p.reviewer_notes, vec!["too generic".to_string()]);
    }

    #[test]
    fn test_regeneration_lineage() {
        let original = proposal();
        let mut replacement = proposal();
        replacement.mark_regeneration_of(&original);
        assert_eq!(replacement.regeneration_of, Some(original.id));
        assert_eq!(replacement.retry_count, 1);
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!("Dark".parse::<ContentVariant>(), Ok(ContentVariant::Dark));
        assert!("grey".parse::<ContentVariant>().is_err());
        assert_eq!(ContentVariant::Light.other(), ContentVariant::Dark);
    }
}

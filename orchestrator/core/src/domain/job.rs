// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::proposal::{ContentType, ContentVariant, Proposal, ProposalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

/// Rendered, packaged content ready for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub media_ref: String,
    pub caption: String,
}

/// Failure reported by a [`crate::domain::runner::JobRunner`].
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("render failed: {0}")]
    Render(String),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum JobTransitionError {
    #[error("job {id} cannot move from {from:?} to {to:?}")]
    Invalid {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub proposal_id: ProposalId,
    pub brand: String,
    pub content_type: ContentType,
    pub variant: ContentVariant,
    pub status: JobStatus,
    pub error: Option<String>,
    pub retry_count: u32,
    pub output: Option<JobOutput>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn from_proposal(proposal: &Proposal) -> Self {
        Self {
            id: JobId::new(),
            proposal_id: proposal.id,
            brand: proposal.brand.clone(),
            content_type: proposal.content_type,
            variant: proposal.variant,
            status: JobStatus::Pending,
            error: None,
            retry_count: 0,
            output: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), JobTransitionError> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Generating)
                | (JobStatus::Generating, JobStatus::Completed)
                | (JobStatus::Generating, JobStatus::Failed)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Pending)
        );
        if !allowed {
            return Err(JobTransitionError::Invalid {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Generating)?;
        self.started_at = Some(at);
        self.finished_at = None;
        self.error = None;
        Ok(())
    }

    pub fn complete(&mut self, output: JobOutput, at: DateTime<Utc>) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Completed)?;
        self.output = Some(output);
        self.finished_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.finished_at = Some(at);
        Ok(())
    }

    /// Put a failed job back in the queue. The last error is kept for diagnosis
    /// until the job starts again.
    pub fn reset_for_retry(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Pending)?;
        self.retry_count += 1;
        self.started_at = None;
        self.finished_at = None;
        Ok(())
    }

    /// Still generating after `timeout` of wall-clock time.
    pub fn is_stuck(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == JobStatus::Generating
            && self
                .started_at
                .map(|started| now - started > timeout)
                .unwrap_or(false)
    }
}

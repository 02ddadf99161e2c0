// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, one per aggregate, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate |
//! |-------|-----------|
//! | `AgentRepository` | `Agent` |
//! | `ProposalRepository` | `Proposal` |
//! | `JobRepository` | `Job` |
//! | `ScheduleRepository` | `ScheduledEntry` |
//! | `PerformanceRepository` | `PerformanceRecord` (latest per entry) |
//! | `TrendRepository` | `TrendingItem` |
//! | `PatternRepository` | `LearnedPattern` |
//! | `GenePoolRepository` | `GenePoolEntry` |
//! | `LearningLogRepository` | `MutationRecord` (append-only) |
//! | `TenantStateRepository` | `TenantState` |
//!
//! Every tenant owns its own set of repositories; none of these traits take a
//! tenant argument.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::agent::{Agent, AgentId};
use crate::domain::gene_pool::{GenePoolEntry, GeneId};
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::learning::MutationRecord;
use crate::domain::pattern::{LearnedPattern, PatternId, PatternSubject};
use crate::domain::performance::{PerformanceRecord, TrendingItem};
use crate::domain::proposal::{ContentType, Proposal, ProposalId, ProposalStatus};
use crate::domain::schedule::{EntryId, ScheduledEntry};
use crate::domain::tenant::TenantState;

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError>;

    async fn list_active(&self) -> Result<Vec<Agent>, RepositoryError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn save(&self, proposal: &Proposal) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError>;

    async fn find_by_status(&self, status: ProposalStatus) -> Result<Vec<Proposal>, RepositoryError>;

    /// Proposals created at or after `since`.
    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Proposal>, RepositoryError>;

    /// Accepted proposals of one brand and type reviewed at or after `since`.
    async fn count_accepted_since(
        &self,
        brand: &str,
        content_type: ContentType,
        since: DateTime<Utc>,
    ) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, RepositoryError>;

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn save(&self, entry: &ScheduledEntry) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: EntryId) -> Result<Option<ScheduledEntry>, RepositoryError>;

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<ScheduledEntry>, RepositoryError>;

    /// Scheduled or publishing entries, optionally for one brand.
    async fn list_active(&self, brand: Option<&str>) -> Result<Vec<ScheduledEntry>, RepositoryError>;

    /// Published entries whose `published_at` falls in `[from, to]`.
    async fn list_published_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledEntry>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ScheduledEntry>, RepositoryError>;
}

#[async_trait]
pub trait PerformanceRepository: Send + Sync {
    /// Replace the stored record for the same entry if the new one is newer.
    async fn upsert(&self, record: &PerformanceRecord) -> Result<(), RepositoryError>;

    async fn latest_for_entry(&self, entry_id: EntryId) -> Result<Option<PerformanceRecord>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;
}

#[async_trait]
pub trait TrendRepository: Send + Sync {
    async fn save_all(&self, items: &[TrendingItem]) -> Result<(), RepositoryError>;

    async fn list_recent(&self, limit: usize) -> Result<Vec<TrendingItem>, RepositoryError>;
}

#[async_trait]
pub trait PatternRepository: Send + Sync {
    async fn save(&self, pattern: &LearnedPattern) -> Result<(), RepositoryError>;

    async fn find_by_subject(&self, subject: &PatternSubject) -> Result<Option<LearnedPattern>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<LearnedPattern>, RepositoryError>;

    async fn delete(&self, id: PatternId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait GenePoolRepository: Send + Sync {
    async fn save(&self, entry: &GenePoolEntry) -> Result<(), RepositoryError>;

    async fn find_by_source_agent(&self, agent_id: AgentId) -> Result<Option<GenePoolEntry>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<GenePoolEntry>, RepositoryError>;

    async fn delete(&self, id: GeneId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LearningLogRepository: Send + Sync {
    async fn append(&self, record: &MutationRecord) -> Result<(), RepositoryError>;

    async fn list_for_agent(&self, agent_id: AgentId) -> Result<Vec<MutationRecord>, RepositoryError>;

    async fn latest(&self) -> Result<Option<MutationRecord>, RepositoryError>;
}

#[async_trait]
pub trait TenantStateRepository: Send + Sync {
    async fn load(&self) -> Result<TenantState, RepositoryError>;

    async fn save(&self, state: &TenantState) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

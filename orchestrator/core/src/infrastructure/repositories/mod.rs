// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! In-memory implementations of the repository traits defined in
//! `crate::domain::repository`, used by the dry-run host and by tests.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! Every repository is a cheap `Clone` handle over `Arc<RwLock<..>>` state.
//! Locks are never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::agent::{Agent, AgentId};
use crate::domain::gene_pool::{GeneId, GenePoolEntry};
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::learning::MutationRecord;
use crate::domain::pattern::{LearnedPattern, PatternId, PatternSubject};
use crate::domain::performance::{PerformanceRecord, TrendingItem};
use crate::domain::proposal::{ContentType, Proposal, ProposalId, ProposalStatus};
use crate::domain::repository::{
    AgentRepository, GenePoolRepository, JobRepository, LearningLogRepository,
    PatternRepository, PerformanceRepository, ProposalRepository, RepositoryError,
    ScheduleRepository, TenantStateRepository, TrendRepository,
};
use crate::domain::schedule::{EntryId, EntryStatus, ScheduledEntry};
use crate::domain::tenant::TenantState;

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.agents.write().insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let mut agents: Vec<Agent> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(agents)
    }

    async fn list_active(&self) -> Result<Vec<Agent>, RepositoryError> {
        let mut agents = self.list_all().await?;
        agents.retain(|a| a.active);
        Ok(agents)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProposalRepository {
    proposals: Arc<RwLock<HashMap<ProposalId, Proposal>>>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn save(&self, proposal: &Proposal) -> Result<(), RepositoryError> {
        self.proposals.write().insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        Ok(self.proposals.read().get(&id).cloned())
    }

    async fn find_by_status(&self, status: ProposalStatus) -> Result<Vec<Proposal>, RepositoryError> {
        let mut proposals: Vec<Proposal> = self
            .proposals
            .read()
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        proposals.sort_by_key(|p| p.created_at);
        Ok(proposals)
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Proposal>, RepositoryError> {
        let mut proposals: Vec<Proposal> = self
            .proposals
            .read()
            .values()
            .filter(|p| p.created_at >= since)
            .cloned()
            .collect();
        proposals.sort_by_key(|p| p.created_at);
        Ok(proposals)
    }

    async fn count_accepted_since(
        &self,
        brand: &str,
        content_type: ContentType,
        since: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        Ok(self
            .proposals
            .read()
            .values()
            .filter(|p| {
                p.status == ProposalStatus::Accepted
                    && p.brand == brand
                    && p.content_type == content_type
                    && p.reviewed_at.map(|t| t >= since).unwrap_or(false)
            })
            .count())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.created_at >= since)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryScheduleRepository {
    entries: Arc<RwLock<HashMap<EntryId, ScheduledEntry>>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn save(&self, entry: &ScheduledEntry) -> Result<(), RepositoryError> {
        self.entries.write().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: EntryId) -> Result<Option<ScheduledEntry>, RepositoryError> {
        Ok(self.entries.read().get(&id).cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<ScheduledEntry>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .values()
            .find(|e| e.job_id == job_id)
            .cloned())
    }

    async fn list_active(&self, brand: Option<&str>) -> Result<Vec<ScheduledEntry>, RepositoryError> {
        let mut entries: Vec<ScheduledEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.is_active() && brand.map(|b| e.brand == b).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.scheduled_time);
        Ok(entries)
    }

    async fn list_published_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledEntry>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| {
                e.status == EntryStatus::Published
                    && e.published_at.map(|t| t >= from && t <= to).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ScheduledEntry>, RepositoryError> {
        let mut entries: Vec<ScheduledEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by_key(|e| e.scheduled_time);
        Ok(entries)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPerformanceRepository {
    records: Arc<RwLock<HashMap<EntryId, PerformanceRecord>>>,
}

impl InMemoryPerformanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PerformanceRepository for InMemoryPerformanceRepository {
    async fn upsert(&self, record: &PerformanceRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write();
        let newer = records
            .get(&record.entry_id)
            .map(|existing| record.collected_at >= existing.collected_at)
            .unwrap_or(true);
        if newer {
            records.insert(record.entry_id, record.clone());
        }
        Ok(())
    }

    async fn latest_for_entry(&self, entry_id: EntryId) -> Result<Option<PerformanceRecord>, RepositoryError> {
        Ok(self.records.read().get(&entry_id).cloned())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.records.read().len())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTrendRepository {
    items: Arc<RwLock<Vec<TrendingItem>>>,
}

impl InMemoryTrendRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrendRepository for InMemoryTrendRepository {
    async fn save_all(&self, items: &[TrendingItem]) -> Result<(), RepositoryError> {
        self.items.write().extend_from_slice(items);
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<TrendingItem>, RepositoryError> {
        let mut items = self.items.read().clone();
        items.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));
        items.truncate(limit);
        Ok(items)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPatternRepository {
    patterns: Arc<RwLock<HashMap<PatternId, LearnedPattern>>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn save(&self, pattern: &LearnedPattern) -> Result<(), RepositoryError> {
        self.patterns.write().insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn find_by_subject(&self, subject: &PatternSubject) -> Result<Option<LearnedPattern>, RepositoryError> {
        Ok(self
            .patterns
            .read()
            .values()
            .find(|p| &p.data.subject == subject)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<LearnedPattern>, RepositoryError> {
        Ok(self.patterns.read().values().cloned().collect())
    }

    async fn delete(&self, id: PatternId) -> Result<(), RepositoryError> {
        self.patterns
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("pattern {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGenePoolRepository {
    entries: Arc<RwLock<HashMap<GeneId, GenePoolEntry>>>,
}

impl InMemoryGenePoolRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GenePoolRepository for InMemoryGenePoolRepository {
    async fn save(&self, entry: &GenePoolEntry) -> Result<(), RepositoryError> {
        self.entries.write().insert(entry.id, entry.clone());
        Ok(())
    }

    async fn find_by_source_agent(&self, agent_id: AgentId) -> Result<Option<GenePoolEntry>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .values()
            .find(|e| e.source_agent_id == agent_id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<GenePoolEntry>, RepositoryError> {
        let mut entries: Vec<GenePoolEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.archived_at.cmp(&b.archived_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn delete(&self, id: GeneId) -> Result<(), RepositoryError> {
        self.entries
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("gene pool entry {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLearningLogRepository {
    records: Arc<RwLock<Vec<MutationRecord>>>,
}

impl InMemoryLearningLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningLogRepository for InMemoryLearningLogRepository {
    async fn append(&self, record: &MutationRecord) -> Result<(), RepositoryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn list_for_agent(&self, agent_id: AgentId) -> Result<Vec<MutationRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn latest(&self) -> Result<Option<MutationRecord>, RepositoryError> {
        Ok(self.records.read().last().cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTenantStateRepository {
    state: Arc<RwLock<TenantState>>,
}

impl InMemoryTenantStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStateRepository for InMemoryTenantStateRepository {
    async fn load(&self) -> Result<TenantState, RepositoryError> {
        Ok(self.state.read().clone())
    }

    async fn save(&self, state: &TenantState) -> Result<(), RepositoryError> {
        *self.state.write() = state.clone();
        Ok(())
    }
}

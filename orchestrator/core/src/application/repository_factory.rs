// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Bundles the repositories one tenant needs. The domain layer defines the
//! traits, infrastructure provides implementations, and this module decides
//! which implementation a tenant gets.

use std::sync::Arc;

use crate::domain::repository::{
    AgentRepository, GenePoolRepository, JobRepository, LearningLogRepository,
    PatternRepository, PerformanceRepository, ProposalRepository, ScheduleRepository,
    TenantStateRepository, TrendRepository,
};
use crate::infrastructure::repositories::{
    InMemoryAgentRepository, InMemoryGenePoolRepository, InMemoryJobRepository,
    InMemoryLearningLogRepository, InMemoryPatternRepository, InMemoryPerformanceRepository,
    InMemoryProposalRepository, InMemoryScheduleRepository, InMemoryTenantStateRepository,
    InMemoryTrendRepository,
};

/// Storage backend for a tenant's repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    InMemory,
}

/// All repositories owned by a single tenant.
#[derive(Clone)]
pub struct Repositories {
    pub agents: Arc<dyn AgentRepository>,
    pub proposals: Arc<dyn ProposalRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub schedule: Arc<dyn ScheduleRepository>,
    pub performance: Arc<dyn PerformanceRepository>,
    pub trends: Arc<dyn TrendRepository>,
    pub patterns: Arc<dyn PatternRepository>,
    pub gene_pool: Arc<dyn GenePoolRepository>,
    pub learning_log: Arc<dyn LearningLogRepository>,
    pub tenant_state: Arc<dyn TenantStateRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            agents: Arc::new(InMemoryAgentRepository::new()),
            proposals: Arc::new(InMemoryProposalRepository::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            schedule: Arc::new(InMemoryScheduleRepository::new()),
            performance: Arc::new(InMemoryPerformanceRepository::new()),
            trends: Arc::new(InMemoryTrendRepository::new()),
            patterns: Arc::new(InMemoryPatternRepository::new()),
            gene_pool: Arc::new(InMemoryGenePoolRepository::new()),
            learning_log: Arc::new(InMemoryLearningLogRepository::new()),
            tenant_state: Arc::new(InMemoryTenantStateRepository::new()),
        }
    }
}

/// Creates a tenant's repository bundle for the configured backend.
pub fn create_repositories(backend: StorageBackend) -> Repositories {
    match backend {
        StorageBackend::InMemory => Repositories::in_memory(),
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::cycle::{BurstMode, CycleKind};
use crate::domain::job::JobId;
use crate::domain::proposal::{ContentType, ContentVariant, ProposalId};
use crate::domain::schedule::EntryId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentLifecycleEvent {
    AgentSpawned {
        agent_id: AgentId,
        variant: ContentVariant,
        generation: u32,
        parent_id: Option<AgentId>,
        inherited: bool,
        spawned_at: DateTime<Utc>,
    },
    AgentAdapted {
        agent_id: AgentId,
        confidence: f64,
        survival_score: f64,
        adapted_at: DateTime<Utc>,
    },
    AgentRetired {
        agent_id: AgentId,
        survival_score: f64,
        retired_at: DateTime<Utc>,
    },
    AgentFailed {
        agent_id: AgentId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProposalEvent {
    ProposalAccepted {
        proposal_id: ProposalId,
        agent_id: AgentId,
        brand: String,
        content_type: ContentType,
        composite_score: Option<f64>,
        accepted_at: DateTime<Utc>,
    },
    ProposalRejected {
        proposal_id: ProposalId,
        agent_id: AgentId,
        brand: String,
        reason: String,
        will_regenerate: bool,
        rejected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    JobCreated {
        job_id: JobId,
        proposal_id: ProposalId,
        brand: String,
        created_at: DateTime<Utc>,
    },
    JobStarted {
        job_id: JobId,
        started_at: DateTime<Utc>,
    },
    JobCompleted {
        job_id: JobId,
        duration_ms: i64,
        completed_at: DateTime<Utc>,
    },
    JobFailed {
        job_id: JobId,
        error: String,
        failed_at: DateTime<Utc>,
    },
    JobRetried {
        job_id: JobId,
        retry_count: u32,
        retried_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScheduleEvent {
    EntryScheduled {
        entry_id: EntryId,
        job_id: JobId,
        brand: String,
        scheduled_time: DateTime<Utc>,
    },
    EntryMoved {
        entry_id: EntryId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    EntryPublished {
        entry_id: EntryId,
        succeeded: Vec<String>,
        failed: Vec<String>,
        published_at: DateTime<Utc>,
    },
    EntryFailed {
        entry_id: EntryId,
        error: String,
        credential: bool,
        failed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CycleEvent {
    CycleCompleted {
        kind: CycleKind,
        duration_ms: i64,
        completed_at: DateTime<Utc>,
    },
    CycleFailed {
        kind: CycleKind,
        error: String,
        failed_at: DateTime<Utc>,
    },
    BurstCompleted {
        mode: BurstMode,
        accepted: usize,
        rejected: usize,
        completed_at: DateTime<Utc>,
    },
    Paused {
        paused_at: DateTime<Utc>,
    },
    Resumed {
        resumed_at: DateTime<Utc>,
    },
}

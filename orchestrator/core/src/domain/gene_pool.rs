// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentDna, AgentId};
use crate::domain::proposal::ContentVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneId(pub Uuid);

impl GeneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GeneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GeneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Archived DNA of a thriving agent, available for inheritance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenePoolEntry {
    pub id: GeneId,
    pub source_agent_id: AgentId,
    pub variant: ContentVariant,
    pub dna: AgentDna,
    pub survival_score: f64,
    pub generation: u32,
    pub archived_at: DateTime<Utc>,
    pub times_inherited: u32,
}

impl GenePoolEntry {
    pub fn archive(agent: &Agent, at: DateTime<Utc>) -> Self {
        Self {
            id: GeneId::new(),
            source_agent_id: agent.id,
            variant: agent.variant,
            dna: agent.dna.clone(),
            survival_score: agent.survival_score,
            generation: agent.generation,
            archived_at: at,
            times_inherited: 0,
        }
    }

    /// Refresh an existing archive of the same agent with its current state.
    pub fn refresh_from(&mut self, agent: &Agent, at: DateTime<Utc>) {
        self.dna = agent.dna.clone();
        self.survival_score = agent.survival_score;
        self.generation = agent.generation;
        self.archived_at = at;
    }
}

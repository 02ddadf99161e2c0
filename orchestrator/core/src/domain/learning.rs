// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentDna, AgentId};

/// One append-only learning log entry: a DNA change made by adaptation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub agent_id: AgentId,
    pub before: AgentDna,
    pub after: AgentDna,
    pub survival_score: f64,
    pub sample_size: usize,
    pub confidence: f64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

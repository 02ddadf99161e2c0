// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::agent::Agent;
use crate::domain::proposal::{ContentType, Proposal};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator backend unavailable: {0}")]
    Unavailable(String),

    #[error("generator returned malformed output: {0}")]
    Malformed(String),

    #[error("generation failed: {0}")]
    Other(String),
}

/// Produces content proposals in the voice of one agent.
///
/// The backend is shared by every agent of a tenant; the agent's DNA (strategy
/// weights, temperature) parameterises each run. Returned proposals are
/// `Pending` and carry the strategy they were drawn from.
#[async_trait]
pub trait GeneratorAgent: Send + Sync {
    async fn run(
        &self,
        agent: &Agent,
        max_proposals: usize,
        content_type: ContentType,
        brand: &str,
    ) -> Result<Vec<Proposal>, GenerationError>;
}

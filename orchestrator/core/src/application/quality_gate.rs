// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Proposal Quality Gate
//!
//! Every generated proposal is examined exactly once. A pass accepts it for
//! dispatch. A fail rejects it (a normal outcome, not an error) and asks the
//! same agent for one replacement, up to `max_regenerations` times per slot;
//! after that the slot is abandoned.
//!
//! Examiner failures count as a failed examination of that proposal: the slot
//! is abandoned and the error is counted, but nothing propagates to the burst.
//!
//! Examinations and regenerations are charged to the quota governor. When it
//! defers an examination the proposal stays pending.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::domain::agent::Agent;
use crate::domain::events::ProposalEvent;
use crate::domain::examiner::Examiner;
use crate::domain::generator::GeneratorAgent;
use crate::domain::proposal::{Proposal, ProposalId};
use crate::domain::quota::{QuotaGovernor, OP_CONTENT_GENERATION, OP_EXAMINE};
use crate::domain::repository::ProposalRepository;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone)]
pub enum GateOutcome {
    Accepted {
        proposal: Proposal,
        regenerations: u32,
    },
    Abandoned {
        last_proposal: ProposalId,
        reason: String,
        regenerations: u32,
    },
    /// Examination quota ran out; the proposal is still pending.
    Deferred {
        proposal: ProposalId,
        regenerations: u32,
    },
}

impl GateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateOutcome::Accepted { .. })
    }

    /// Proposals rejected along the way, including the final one when abandoned.
    pub fn rejections(&self) -> u32 {
        match self {
            GateOutcome::Accepted { regenerations, .. } => *regenerations,
            GateOutcome::Abandoned { regenerations, .. } => regenerations + 1,
            GateOutcome::Deferred { regenerations, .. } => *regenerations,
        }
    }
}

/// Human review decision that bypasses the examiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept { note: Option<String> },
    Reject { note: Option<String> },
}

pub struct QualityGate {
    examiner: Arc<dyn Examiner>,
    proposals: Arc<dyn ProposalRepository>,
    event_bus: EventBus,
    quota: Arc<QuotaGovernor>,
    max_regenerations: u32,
}

impl QualityGate {
    pub fn new(
        examiner: Arc<dyn Examiner>,
        proposals: Arc<dyn ProposalRepository>,
        event_bus: EventBus,
        max_regenerations: u32,
    ) -> Self {
        Self {
            examiner,
            proposals,
            event_bus,
            quota: Arc::new(QuotaGovernor::unmetered()),
            max_regenerations,
        }
    }

    pub fn with_quota(mut self, quota: Arc<QuotaGovernor>) -> Self {
        self.quota = quota;
        self
    }

    pub async fn review(
        &self,
        agent: &Agent,
        generator: &dyn GeneratorAgent,
        proposal: Proposal,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome> {
        self.review_with_retry(agent, generator, proposal, 0, now).await
    }

    /// Review `proposal`, which is already the `retry`-th regeneration of its slot.
    pub async fn review_with_retry(
        &self,
        agent: &Agent,
        generator: &dyn GeneratorAgent,
        proposal: Proposal,
        retry: u32,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome> {
        let mut current = proposal;
        let mut retry = retry;

        loop {
            let regenerations = retry;
            if !self.quota.acquire_for(OP_EXAMINE, 1, Some(agent.name.as_str()), now) {
                info!(proposal_id = %current.id, agent = %agent.name, "Examination deferred by quota");
                counter!("autoreel_proposals_total", "outcome" => "deferred").increment(1);
                self.save(&current).await?;
                return Ok(GateOutcome::Deferred {
                    proposal: current.id,
                    regenerations,
                });
            }
            let examined = self.examiner.examine(&current).await;

            let score = match examined {
                Ok(score) => score,
                Err(e) => {
                    warn!(proposal_id = %current.id, examiner = self.examiner.name(), error = %e, "Examiner failed; abandoning slot");
                    counter!("autoreel_proposals_total", "outcome" => "examiner_error").increment(1);
                    current.add_note(format!("examiner error: {}", e));
                    current.reject(None, now)?;
                    self.save(&current).await?;
                    self.event_bus.publish(ProposalEvent::ProposalRejected {
                        proposal_id: current.id,
                        agent_id: current.agent_id,
                        brand: current.brand.clone(),
                        reason: e.to_string(),
                        will_regenerate: false,
                        rejected_at: now,
                    });
                    return Ok(GateOutcome::Abandoned {
                        last_proposal: current.id,
                        reason: format!("examiner error: {}", e),
                        regenerations,
                    });
                }
            };

            if score.passed {
                current.accept(Some(score.to_scores()), now)?;
                self.save(&current).await?;
                counter!("autoreel_proposals_total", "outcome" => "accepted").increment(1);
                self.event_bus.publish(ProposalEvent::ProposalAccepted {
                    proposal_id: current.id,
                    agent_id: current.agent_id,
                    brand: current.brand.clone(),
                    content_type: current.content_type,
                    composite_score: Some(score.composite_score),
                    accepted_at: now,
                });
                return Ok(GateOutcome::Accepted {
                    proposal: current,
                    regenerations,
                });
            }

            let will_regenerate = retry < self.max_regenerations;
            info!(
                proposal_id = %current.id,
                agent = %agent.name,
                score = score.composite_score,
                reason = %score.reason,
                will_regenerate,
                "Proposal rejected"
            );
            current.reject(Some(score.to_scores()), now)?;
            self.save(&current).await?;
            counter!("autoreel_proposals_total", "outcome" => "rejected").increment(1);
            self.event_bus.publish(ProposalEvent::ProposalRejected {
                proposal_id: current.id,
                agent_id: current.agent_id,
                brand: current.brand.clone(),
                reason: score.reason.clone(),
                will_regenerate,
                rejected_at: now,
            });

            if !will_regenerate {
                return Ok(GateOutcome::Abandoned {
                    last_proposal: current.id,
                    reason: score.reason,
                    regenerations,
                });
            }

            if !self
                .quota
                .acquire_for(OP_CONTENT_GENERATION, 1, Some(agent.name.as_str()), now)
            {
                return Ok(GateOutcome::Abandoned {
                    last_proposal: current.id,
                    reason: "regeneration deferred by quota".to_string(),
                    regenerations,
                });
            }

            let replacement = match generator
                .run(agent, 1, current.content_type, &current.brand)
                .await
            {
                Ok(mut batch) if !batch.is_empty() => batch.swap_remove(0),
                Ok(_) => {
                    return Ok(GateOutcome::Abandoned {
                        last_proposal: current.id,
                        reason: "regeneration produced no proposal".to_string(),
                        regenerations,
                    })
                }
                Err(e) => {
                    warn!(agent = %agent.name, error = %e, "Regeneration failed");
                    return Ok(GateOutcome::Abandoned {
                        last_proposal: current.id,
                        reason: format!("regeneration failed: {}", e),
                        regenerations,
                    });
                }
            };

            let mut replacement = replacement;
            replacement.mark_regeneration_of(&current);
            self.save(&replacement).await?;
            current = replacement;
            retry += 1;
        }
    }

    /// Apply a human decision to a pending proposal.
    pub async fn apply_decision(
        &self,
        id: ProposalId,
        decision: ReviewDecision,
        now: DateTime<Utc>,
    ) -> Result<Proposal> {
        let mut proposal = self
            .proposals
            .find_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("proposal {} not found", id))?;

        let (accepted, note) = match decision {
            ReviewDecision::Accept { note } => (true, note),
            ReviewDecision::Reject { note } => (false, note),
        };
        if accepted {
            proposal.accept(None, now)?;
        } else {
            proposal.reject(None, now)?;
        }
        if let Some(note) = note {
            proposal.add_note(note);
        }
        self.save(&proposal).await?;

        let outcome = if accepted { "manual_accept" } else { "manual_reject" };
        counter!("autoreel_proposals_total", "outcome" => outcome).increment(1);
        info!(proposal_id = %id, outcome, "Manual review applied");
        Ok(proposal)
    }

    async fn save(&self, proposal: &Proposal) -> Result<()> {
        self.proposals
            .save(proposal)
            .await
            .with_context(|| format!("saving proposal {}", proposal.id))
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. One bus is shared
// by every tenant; each orchestrator publishes through a handle scoped to its
// tenant id so subscribers can filter.
//
// Events are not persisted; a lagging receiver loses the oldest events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{
    AgentLifecycleEvent, CycleEvent, JobEvent, ProposalEvent, ScheduleEvent,
};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AgentLifecycle(AgentLifecycleEvent),
    Proposal(ProposalEvent),
    Job(JobEvent),
    Schedule(ScheduleEvent),
    Cycle(CycleEvent),
}

impl From<AgentLifecycleEvent> for DomainEvent {
    fn from(event: AgentLifecycleEvent) -> Self {
        DomainEvent::AgentLifecycle(event)
    }
}

impl From<ProposalEvent> for DomainEvent {
    fn from(event: ProposalEvent) -> Self {
        DomainEvent::Proposal(event)
    }
}

impl From<JobEvent> for DomainEvent {
    fn from(event: JobEvent) -> Self {
        DomainEvent::Job(event)
    }
}

impl From<ScheduleEvent> for DomainEvent {
    fn from(event: ScheduleEvent) -> Self {
        DomainEvent::Schedule(event)
    }
}

impl From<CycleEvent> for DomainEvent {
    fn from(event: CycleEvent) -> Self {
        DomainEvent::Cycle(event)
    }
}

/// A domain event stamped with the tenant that emitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub tenant: String,
    pub emitted_at: DateTime<Utc>,
    pub event: DomainEvent,
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<EventEnvelope>>,
    tenant: Arc<str>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity determines how many events can be buffered before dropping old ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            tenant: Arc::from(""),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Handle on the same channel that stamps events with `tenant`.
    pub fn scoped(&self, tenant: &str) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            tenant: Arc::from(tenant),
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Publish a domain event to all subscribers
    pub fn publish(&self, event: impl Into<DomainEvent>) {
        let envelope = EventEnvelope {
            tenant: self.tenant.to_string(),
            emitted_at: Utc::now(),
            event: event.into(),
        };
        debug!(tenant = %envelope.tenant, "Publishing event: {:?}", envelope.event);

        // send() only fails when nobody is subscribed
        if self.sender.send(envelope).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events of all tenants
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            tenant: None,
        }
    }

    /// Subscribe to the events of a single tenant
    pub fn subscribe_tenant(&self, tenant: &str) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            tenant: Some(tenant.to_string()),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for domain events, optionally filtered to one tenant
pub struct EventReceiver {
    receiver: broadcast::Receiver<EventEnvelope>,
    tenant: Option<String>,
}

impl EventReceiver {
    fn matches(&self, envelope: &EventEnvelope) -> bool {
        self.tenant
            .as_deref()
            .map(|t| t == envelope.tenant)
            .unwrap_or(true)
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<EventEnvelope, EventBusError> {
        loop {
            let envelope = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&envelope) {
                return Ok(envelope);
            }
        }
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Result<EventEnvelope, EventBusError> {
        loop {
            let envelope = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&envelope) {
                return Ok(envelope);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process orchestrator host
//!
//! Builds one [`Orchestrator`] per configured tenant on a shared event bus and
//! a shared quota governor, backed by in-memory repositories.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use autoreel_core::{
    application::{create_repositories, CycleScheduler, StorageBackend},
    domain::{
        config::{OrchestratorConfigManifest, TenantConfig},
        quota::QuotaGovernor,
    },
    infrastructure::event_bus::{EventBus, EventBusError},
    Capabilities, Orchestrator,
};

const EVENT_BUS_CAPACITY: usize = 1024;

pub struct EmbeddedHost {
    config: OrchestratorConfigManifest,
    event_bus: EventBus,
    orchestrators: Vec<Arc<Orchestrator>>,
}

impl EmbeddedHost {
    /// Validate the manifest and build every tenant's orchestrator.
    ///
    /// Only the offline capability set exists, so `dry_run` must be set.
    pub fn new(config: OrchestratorConfigManifest, dry_run: bool) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        if !dry_run {
            anyhow::bail!(
                "no live generator or publisher adapters are configured; rerun with --dry-run"
            );
        }

        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let quota = Arc::new(config.spec.quotas.governor());
        let orchestrators = config
            .spec
            .tenants
            .iter()
            .map(|tenant| {
                build_tenant(tenant, &config, Arc::clone(&quota), &event_bus).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            event_bus,
            orchestrators,
        })
    }

    pub fn config(&self) -> &OrchestratorConfigManifest {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn orchestrators(&self) -> &[Arc<Orchestrator>] {
        &self.orchestrators
    }

    pub fn orchestrator(&self, tenant: &str) -> Option<&Arc<Orchestrator>> {
        self.orchestrators.iter().find(|o| o.tenant_id() == tenant)
    }

    /// Seed populations and apply persisted pause state for every tenant.
    pub async fn initialize(&self) -> Result<()> {
        for orchestrator in &self.orchestrators {
            let population = orchestrator
                .initialize()
                .await
                .with_context(|| format!("Failed to initialize tenant '{}'", orchestrator.tenant_id()))?;
            info!(tenant = %orchestrator.tenant_id(), population, "Tenant initialized");
        }
        Ok(())
    }

    pub fn scheduler(&self) -> CycleScheduler {
        CycleScheduler::new(self.orchestrators.clone(), self.config.spec.cadences.clone())
    }

    /// Log every domain event until `token` is cancelled.
    pub fn spawn_event_logger(&self, token: CancellationToken) -> JoinHandle<()> {
        let mut receiver = self.event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Ok(envelope) => {
                            info!(tenant = %envelope.tenant, event = ?envelope.event, "Event");
                        }
                        Err(EventBusError::Closed) => break,
                        Err(_) => continue,
                    },
                    _ = token.cancelled() => {
                        debug!("Event logger stopping");
                        break;
                    }
                }
            }
        })
    }
}

fn build_tenant(
    tenant: &TenantConfig,
    config: &OrchestratorConfigManifest,
    quota: Arc<QuotaGovernor>,
    event_bus: &EventBus,
) -> Result<Orchestrator> {
    let repos = create_repositories(StorageBackend::InMemory);
    let capabilities = Capabilities::dry_run(&repos, &config.spec.quality_gate);
    debug!(tenant = %tenant.id, brands = tenant.brands.len(), "Building tenant orchestrator");
    Orchestrator::new(
        tenant.clone(),
        &config.spec,
        repos,
        capabilities,
        quota,
        event_bus,
    )
    .with_context(|| format!("Failed to build orchestrator for tenant '{}'", tenant.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoreel_core::domain::config::BrandConfig;

    #[test]
    fn test_live_mode_is_refused() {
        let err = EmbeddedHost::new(OrchestratorConfigManifest::default(), false)
            .err()
            .unwrap();
        assert!(err.to_string().contains("--dry-run"));
    }

    #[test]
    fn test_one_orchestrator_per_tenant() {
        let mut config = OrchestratorConfigManifest::default();
        let mut second = config.spec.tenants[0].clone();
        second.id = "second".to_string();
        second.brands = vec![BrandConfig::new("southwind")];
        config.spec.tenants.push(second);

        let host = EmbeddedHost::new(config, true).unwrap();
        assert_eq!(host.orchestrators().len(), 2);
        assert!(host.orchestrator("second").is_some());
        assert!(host.orchestrator("missing").is_none());
    }

    #[tokio::test]
    async fn test_event_logger_stops_on_cancel() {
        let host = EmbeddedHost::new(OrchestratorConfigManifest::default(), true).unwrap();
        let token = CancellationToken::new();
        let handle = host.spawn_event_logger(token.clone());
        host.orchestrators()[0].pause().await.unwrap();
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_seeds_every_tenant() {
        let host = EmbeddedHost::new(OrchestratorConfigManifest::default(), true).unwrap();
        host.initialize().await.unwrap();
        let status = host.orchestrators()[0].status().await.unwrap();
        assert!(!status.agents.is_empty());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cycle Scheduler
//!
//! One tracked loop per (tenant, cycle) ticks on the cycle's cadence. Each
//! invocation runs in its own task so that a panic inside a cycle body is
//! caught as a `JoinError`, counted against the tenant, and the loop carries
//! on with the next tick. A slow invocation delays only its own cycle.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::config::CadenceConfig;
use crate::domain::cycle::CycleKind;

use super::orchestrator::{CycleOutcome, Orchestrator};

pub struct CycleScheduler {
    orchestrators: Vec<Arc<Orchestrator>>,
    cadences: CadenceConfig,
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
}

impl CycleScheduler {
    pub fn new(orchestrators: Vec<Arc<Orchestrator>>, cadences: CadenceConfig) -> Self {
        Self {
            orchestrators,
            cadences,
            shutdown_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn orchestrators(&self) -> &[Arc<Orchestrator>] {
        &self.orchestrators
    }

    /// Spawn every cycle loop. Returns immediately.
    pub fn start(&self) {
        for orchestrator in &self.orchestrators {
            for kind in CycleKind::ALL {
                let orchestrator = Arc::clone(orchestrator);
                let period = self.cadences.interval(kind);
                let token = self.shutdown_token.clone();
                self.tracker.spawn(cycle_loop(orchestrator, kind, period, token));
            }
        }
        info!(
            tenants = self.orchestrators.len(),
            cycles = CycleKind::ALL.len(),
            "Cycle scheduler started"
        );
    }

    /// Cancel every loop, wait for in-flight cycles, then drain the tenants'
    /// dispatchers.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        for orchestrator in &self.orchestrators {
            orchestrator.shutdown().await;
        }
        info!("Cycle scheduler stopped");
    }
}

async fn cycle_loop(
    orchestrator: Arc<Orchestrator>,
    kind: CycleKind,
    period: std::time::Duration,
    token: CancellationToken,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let tenant = orchestrator.tenant_id().to_string();
                let worker = Arc::clone(&orchestrator);
                let handle = tokio::spawn(async move { worker.run_cycle(kind).await });
                match handle.await {
                    Ok(CycleOutcome::Skipped { reason }) => {
                        debug!(tenant = %tenant, cycle = %kind, %reason, "Cycle skipped");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let error = if e.is_panic() { "cycle panicked" } else { "cycle task cancelled" };
                        orchestrator.record_failure(kind, Utc::now(), error);
                    }
                }
            }
            _ = token.cancelled() => {
                debug!(tenant = %orchestrator.tenant_id(), cycle = %kind, "Cycle loop stopping");
                break;
            }
        }
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        if !self.shutdown_token.is_cancelled() {
            warn!("Cycle scheduler dropped without shutdown; cancelling loops");
            self.shutdown_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::orchestrator::Capabilities;
    use crate::application::repository_factory::Repositories;
    use crate::domain::config::OrchestratorConfigSpec;
    use crate::domain::performance::PerformanceRecord;
    use crate::domain::sources::{MetricsSource, SourceError};
    use crate::infrastructure::event_bus::EventBus;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::time::Duration;

    struct PanickingMetrics;

    #[async_trait]
    impl MetricsSource for PanickingMetrics {
        async fn collect(&self, _brand: &str, _since: DateTime<Utc>) -> Result<Vec<PerformanceRecord>, SourceError> {
            panic!("metrics backend exploded");
        }
    }

    fn fast_spec() -> OrchestratorConfigSpec {
        let mut spec = OrchestratorConfigSpec::default();
        let fast = Duration::from_millis(20);
        let slow = Duration::from_secs(3600);
        spec.dispatch.stagger = Duration::ZERO;
        spec.cadences.check = slow;
        spec.cadences.publish = slow;
        spec.cadences.observe = fast;
        spec.cadences.scout = slow;
        spec.cadences.feedback = slow;
        spec.cadences.evolution_check = slow;
        spec.cadences.diagnostics = slow;
        spec.cadences.bootstrap = slow;
        spec.cadences.healing = fast;
        spec
    }

    #[tokio::test]
    async fn test_panicking_cycle_keeps_ticking() {
        let spec = fast_spec();
        let repos = Repositories::in_memory();
        let mut capabilities = Capabilities::dry_run(&repos, &spec.quality_gate);
        capabilities.metrics = Arc::new(PanickingMetrics);
        let orchestrator = Arc::new(
            Orchestrator::new(
                spec.tenants[0].clone(),
                &spec,
                repos,
                capabilities,
                Arc::new(spec.quotas.governor()),
                &EventBus::new(256),
            )
            .unwrap(),
        );

        let scheduler = CycleScheduler::new(vec![orchestrator.clone()], spec.cadences.clone());
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.shutdown().await;

        let status = orchestrator.status().await.unwrap();
        assert!(status.cycle_errors.get(&CycleKind::Observe).copied().unwrap_or(0) >= 2);
        assert!(status.last_runs.contains_key(&CycleKind::Healing));
    }

    #[tokio::test]
    async fn test_shutdown_stops_loops() {
        let spec = fast_spec();
        let repos = Repositories::in_memory();
        let capabilities = Capabilities::dry_run(&repos, &spec.quality_gate);
        let orchestrator = Arc::new(
            Orchestrator::new(
                spec.tenants[0].clone(),
                &spec,
                repos,
                capabilities,
                Arc::new(spec.quotas.governor()),
                &EventBus::new(256),
            )
            .unwrap(),
        );
        let scheduler = CycleScheduler::new(vec![orchestrator], spec.cadences.clone());
        scheduler.start();
        scheduler.shutdown().await;
        assert!(scheduler.shutdown_token().is_cancelled());
    }
}

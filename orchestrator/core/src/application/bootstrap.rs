// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cold-start research.
//!
//! A young tenant has no engagement history for feedback to learn from. Until
//! enough performance records exist, each tick spends a few low-priority calls
//! on metrics and trend research, rotating over brands and trend kinds. Once
//! the record count reaches the maturity threshold the cycle disables itself
//! and the flag is persisted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::config::BootstrapConfig;
use crate::domain::repository::{PerformanceRepository, TenantStateRepository};

use super::research::{CallOutcome, ResearchReport, ResearchService};

pub const OP_BOOTSTRAP_RESEARCH: &str = "bootstrap_research";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapStatus {
    Disabled,
    /// Matured on this tick; nothing was called.
    Matured { records: usize },
    Ran { records: usize, report: ResearchReport },
}

enum Target<'a> {
    Brand(&'a str),
    TrendKind(&'a str),
}

pub struct BootstrapService {
    research: Arc<ResearchService>,
    performance: Arc<dyn PerformanceRepository>,
    tenant_state: Arc<dyn TenantStateRepository>,
    config: BootstrapConfig,
    cursor: AtomicUsize,
}

impl BootstrapService {
    pub fn new(
        research: Arc<ResearchService>,
        performance: Arc<dyn PerformanceRepository>,
        tenant_state: Arc<dyn TenantStateRepository>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            research,
            performance,
            tenant_state,
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    pub async fn is_active(&self) -> Result<bool> {
        Ok(self.config.enabled && !self.tenant_state.load().await?.bootstrap_disabled)
    }

    fn targets(&self) -> Vec<Target<'_>> {
        self.research
            .brands()
            .iter()
            .map(|b| Target::Brand(b))
            .chain(self.research.trend_kinds().iter().map(|k| Target::TrendKind(k)))
            .collect()
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Result<BootstrapStatus> {
        if !self.is_active().await? {
            return Ok(BootstrapStatus::Disabled);
        }

        let records = self.performance.count().await?;
        if records >= self.config.maturity_threshold {
            let mut state = self.tenant_state.load().await?;
            state.bootstrap_disabled = true;
            self.tenant_state.save(&state).await?;
            info!(records, threshold = self.config.maturity_threshold, "Bootstrap matured; disabling");
            return Ok(BootstrapStatus::Matured { records });
        }

        let targets = self.targets();
        let mut report = ResearchReport::default();
        if !targets.is_empty() {
            for _ in 0..self.config.calls_per_tick {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % targets.len();
                let outcome = match targets[index] {
                    Target::Brand(brand) => {
                        self.research
                            .collect_brand(brand, OP_BOOTSTRAP_RESEARCH, now)
                            .await
                    }
                    Target::TrendKind(kind) => {
                        self.research
                            .scan_kind(kind, OP_BOOTSTRAP_RESEARCH, now)
                            .await
                    }
                };
                let deferred = outcome == CallOutcome::Deferred;
                report.absorb(outcome);
                // low-priority budget is gone for this window
                if deferred {
                    break;
                }
            }
        }
        info!(
            calls = report.calls,
            deferred = report.deferred,
            records,
            "Bootstrap tick"
        );
        Ok(BootstrapStatus::Ran { records, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ResearchConfig;
    use crate::domain::performance::PerformanceRecord;
    use crate::domain::quota::{QuotaGovernor, ServiceQuota};
    use crate::domain::job::JobId;
    use crate::domain::schedule::EntryId;
    use crate::infrastructure::dry_run::StaticTrendSource;
    use crate::infrastructure::repositories::{
        InMemoryPerformanceRepository, InMemoryTenantStateRepository, InMemoryTrendRepository,
    };
    use crate::domain::sources::{MetricsSource, SourceError};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct NoMetrics;

    #[async_trait]
    impl MetricsSource for NoMetrics {
        async fn collect(&self, _brand: &str, _since: DateTime<Utc>) -> Result<Vec<PerformanceRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn fixture(threshold: usize) -> (BootstrapService, Arc<InMemoryPerformanceRepository>, Arc<InMemoryTenantStateRepository>) {
        let mut services = BTreeMap::new();
        services.insert("meta".to_string(), ServiceQuota::hourly(100));
        services.insert("search".to_string(), ServiceQuota::daily(100));
        let performance = Arc::new(InMemoryPerformanceRepository::new());
        let state = Arc::new(InMemoryTenantStateRepository::new());
        let research = Arc::new(ResearchService::new(
            Arc::new(QuotaGovernor::with_default_priorities(services)),
            Arc::new(NoMetrics),
            Arc::new(StaticTrendSource),
            performance.clone(),
            Arc::new(InMemoryTrendRepository::new()),
            vec!["northwind".to_string()],
            ResearchConfig::default(),
        ));
        let service = BootstrapService::new(
            research,
            performance.clone(),
            state.clone(),
            BootstrapConfig {
                enabled: true,
                calls_per_tick: 3,
                maturity_threshold: threshold,
            },
        );
        (service, performance, state)
    }

    #[tokio::test]
    async fn test_tick_spends_call_budget() {
        let (service, _, _) = fixture(10);
        match service.tick(Utc::now()).await.unwrap() {
            BootstrapStatus::Ran { report, .. } => assert_eq!(report.calls, 3),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disables_itself_at_maturity() {
        let (service, performance, state) = fixture(1);
        let now = Utc::now();
        performance
            .upsert(&PerformanceRecord {
                entry_id: EntryId::new(),
                job_id: JobId::new(),
                brand: "northwind".to_string(),
                views: 10,
                likes: 1,
                saves: 0,
                shares: 0,
                comments: 0,
                published_at: now,
                collected_at: now,
            })
            .await
            .unwrap();

        assert!(matches!(service.tick(now).await.unwrap(), BootstrapStatus::Matured { records: 1 }));
        assert!(state.load().await.unwrap().bootstrap_disabled);
        assert_eq!(service.tick(now).await.unwrap(), BootstrapStatus::Disabled);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Research Cycles
//!
//! Observe pulls engagement numbers for each brand's published content; Scout
//! pulls trending items. Every external call is admitted by the
//! [`QuotaGovernor`] first. A deferral is not an error: the call is simply
//! skipped until the next tick.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::config::{chrono_duration, ResearchConfig};
use crate::domain::quota::QuotaGovernor;
use crate::domain::repository::{PerformanceRepository, TrendRepository};
use crate::domain::sources::{MetricsSource, SourceError, TrendSource};

pub const OP_OWN_ANALYSIS: &str = "own_analysis";
pub const OP_TREND_DISCOVERY: &str = "trend_discovery";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub calls: usize,
    pub records: usize,
    pub deferred: usize,
    pub errors: usize,
}

impl ResearchReport {
    pub(crate) fn absorb(&mut self, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Done(n) => {
                self.calls += 1;
                self.records += n;
            }
            CallOutcome::Deferred => self.deferred += 1,
            CallOutcome::Failed => {
                self.calls += 1;
                self.errors += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Done(usize),
    Deferred,
    Failed,
}

pub struct ResearchService {
    quota: Arc<QuotaGovernor>,
    metrics: Arc<dyn MetricsSource>,
    trends: Arc<dyn TrendSource>,
    performance: Arc<dyn PerformanceRepository>,
    trend_store: Arc<dyn TrendRepository>,
    brands: Vec<String>,
    config: ResearchConfig,
}

fn log_source_error(subject: &str, e: &SourceError) {
    match e {
        SourceError::RateLimited(_) => info!(subject, error = %e, "Source rate limited"),
        SourceError::Unauthorized(_) => warn!(subject, error = %e, "Source rejected credentials"),
        SourceError::Request(_) => warn!(subject, error = %e, "Source request failed"),
    }
}

impl ResearchService {
    pub fn new(
        quota: Arc<QuotaGovernor>,
        metrics: Arc<dyn MetricsSource>,
        trends: Arc<dyn TrendSource>,
        performance: Arc<dyn PerformanceRepository>,
        trend_store: Arc<dyn TrendRepository>,
        brands: Vec<String>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            quota,
            metrics,
            trends,
            performance,
            trend_store,
            brands,
            config,
        }
    }

    pub fn brands(&self) -> &[String] {
        &self.brands
    }

    pub fn trend_kinds(&self) -> &[String] {
        &self.config.trend_kinds
    }

    /// One metrics call for one brand, charged to `operation`.
    ///
    /// Source and storage failures are reported as [`CallOutcome::Failed`].
    pub async fn collect_brand(&self, brand: &str, operation: &str, now: DateTime<Utc>) -> CallOutcome {
        if !self
            .quota
            .try_acquire(&self.config.metrics_service, operation, 1, Some(brand), now)
        {
            debug!(brand, operation, "Metrics call deferred");
            return CallOutcome::Deferred;
        }
        let since = now - chrono_duration(self.config.metrics_lookback);
        let records = match self.metrics.collect(brand, since).await {
            Ok(records) => records,
            Err(e) => {
                log_source_error(brand, &e);
                return CallOutcome::Failed;
            }
        };
        for record in &records {
            if let Err(e) = self.performance.upsert(record).await {
                warn!(brand, error = %e, "Failed to store performance record");
                return CallOutcome::Failed;
            }
        }
        CallOutcome::Done(records.len())
    }

    /// One trend scan for one kind, charged to `operation`.
    pub async fn scan_kind(&self, kind: &str, operation: &str, now: DateTime<Utc>) -> CallOutcome {
        if !self
            .quota
            .try_acquire(&self.config.trend_service, operation, 1, None, now)
        {
            debug!(kind, operation, "Trend scan deferred");
            return CallOutcome::Deferred;
        }
        let items = match self.trends.scan(kind, self.config.trend_limit).await {
            Ok(items) => items,
            Err(e) => {
                log_source_error(kind, &e);
                return CallOutcome::Failed;
            }
        };
        if let Err(e) = self.trend_store.save_all(&items).await {
            warn!(kind, error = %e, "Failed to store trending items");
            return CallOutcome::Failed;
        }
        CallOutcome::Done(items.len())
    }

    /// Observe cycle body.
    pub async fn observe(&self, now: DateTime<Utc>) -> Result<ResearchReport> {
        let outcomes = join_all(
            self.brands
                .iter()
                .map(|brand| self.collect_brand(brand, OP_OWN_ANALYSIS, now)),
        )
        .await;

        let mut report = ResearchReport::default();
        for outcome in outcomes {
            report.absorb(outcome);
        }
        info!(
            calls = report.calls,
            records = report.records,
            deferred = report.deferred,
            errors = report.errors,
            "Observe complete"
        );
        Ok(report)
    }

    /// Scout cycle body.
    pub async fn scout(&self, now: DateTime<Utc>) -> Result<ResearchReport> {
        let mut report = ResearchReport::default();
        for kind in &self.config.trend_kinds {
            report.absorb(self.scan_kind(kind, OP_TREND_DISCOVERY, now).await);
        }
        info!(
            calls = report.calls,
            items = report.records,
            deferred = report.deferred,
            errors = report.errors,
            "Scout complete"
        );
        Ok(report)
    }
}

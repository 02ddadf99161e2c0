// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! External research sources: engagement metrics for published content and
//! trending topics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::performance::{PerformanceRecord, TrendingItem};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source rate limited: {0}")]
    RateLimited(String),

    #[error("source credentials rejected: {0}")]
    Unauthorized(String),

    #[error("source request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Latest engagement numbers for the brand's content published since `since`.
    async fn collect(
        &self,
        brand: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceRecord>, SourceError>;
}

#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn scan(&self, kind: &str, limit: usize) -> Result<Vec<TrendingItem>, SourceError>;
}

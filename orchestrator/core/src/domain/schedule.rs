// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Publish calendar entries.
//!
//! An entry places a completed job's output on a brand's calendar. Active
//! entries (`Scheduled`, `Publishing`) are unique per `(brand, scheduled_time)`;
//! the slot allocator and its cleanup pass maintain that.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobId};
use crate::domain::proposal::{ContentType, ContentVariant};
use crate::domain::publisher::{PlatformResult, PublishErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Scheduled,
    Publishing,
    Published,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryMetadata {
    pub attempts: u32,
    pub last_error: Option<String>,
    pub error_kind: Option<PublishErrorKind>,
    #[serde(default)]
    pub platform_results: BTreeMap<String, PlatformResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub id: EntryId,
    pub job_id: JobId,
    pub brand: String,
    pub content_type: ContentType,
    pub variant: ContentVariant,
    pub platforms: BTreeSet<String>,
    pub scheduled_time: DateTime<Utc>,
    pub status: EntryStatus,
    pub retry: RetryMetadata,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Start of the current publish attempt while `Publishing`.
    #[serde(default)]
    pub publishing_started_at: Option<DateTime<Utc>>,
}

impl ScheduledEntry {
    pub fn for_job(job: &Job, platforms: BTreeSet<String>, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            job_id: job.id,
            brand: job.brand.clone(),
            content_type: job.content_type,
            variant: job.variant,
            platforms,
            scheduled_time,
            status: EntryStatus::Scheduled,
            retry: RetryMetadata::default(),
            created_at: Utc::now(),
            published_at: None,
            publishing_started_at: None,
        }
    }

    /// Scheduled or publishing; these hold their `(brand, time)` key.
    pub fn is_active(&self) -> bool {
        matches!(self.status, EntryStatus::Scheduled | EntryStatus::Publishing)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Scheduled && self.scheduled_time <= now
    }

    pub fn begin_publishing(&mut self, at: DateTime<Utc>) {
        self.status = EntryStatus::Publishing;
        self.publishing_started_at = Some(at);
        self.retry.attempts += 1;
    }

    /// Still `Publishing` more than `timeout` after the attempt began. An
    /// attempt with no recorded start is always stalled.
    pub fn is_publish_stalled(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == EntryStatus::Publishing
            && self
                .publishing_started_at
                .map_or(true, |started| now - started > timeout)
    }

    /// Return a stalled attempt to `Scheduled` so the next publish pass picks
    /// it up again.
    pub fn release_stalled(&mut self, reason: impl Into<String>) {
        self.status = EntryStatus::Scheduled;
        self.publishing_started_at = None;
        self.retry.last_error = Some(reason.into());
        self.retry.error_kind = Some(PublishErrorKind::Transient);
    }

    /// Record per-platform outcomes. One successful platform is enough to count
    /// the entry as published; the failures stay in the retry metadata.
    pub fn record_publish(&mut self, results: BTreeMap<String, PlatformResult>, at: DateTime<Utc>) {
        let any_success = results.values().any(|r| r.success);
        let first_error = results
            .values()
            .filter(|r| !r.success)
            .find_map(|r| r.error.clone());
        let credential_error = results
            .values()
            .any(|r| r.error_kind == Some(PublishErrorKind::Credential));

        self.retry.platform_results = results;
        self.retry.last_error = first_error;
        self.retry.error_kind = if self.retry.last_error.is_none() {
            None
        } else if credential_error {
            Some(PublishErrorKind::Credential)
        } else {
            Some(PublishErrorKind::Transient)
        };

        self.publishing_started_at = None;
        if any_success {
            self.status = EntryStatus::Published;
            self.published_at = Some(at);
        } else {
            self.status = EntryStatus::Failed;
        }
    }

    pub fn reschedule(&mut self, to: DateTime<Utc>) {
        self.scheduled_time = to;
    }
}

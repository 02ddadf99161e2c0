// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Publish Scheduling
//!
//! Places completed jobs on their brand's calendar, repairs the calendar when
//! it drifts (wrong hours, collisions) and hands due entries to the
//! [`Publisher`].
//!
//! Slot allocation is serialised per scheduler: the occupied set is read and
//! the new entry written under one lock, so two jobs finishing together never
//! receive the same `(brand, time)`.
//!
//! Each publish is charged to the quota governor, one call per platform. An
//! entry the governor defers stays `Scheduled` for the next pass.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::events::ScheduleEvent;
use crate::domain::job::Job;
use crate::domain::publisher::{PlatformResult, PublishErrorKind, Publisher};
use crate::domain::quota::{QuotaGovernor, OP_PUBLISH};
use crate::domain::repository::{JobRepository, ScheduleRepository};
use crate::domain::schedule::{EntryId, EntryStatus, ScheduledEntry};
use crate::domain::slots::{CleanupPlan, SlotAllocator};
use crate::infrastructure::event_bus::EventBus;

const DEFAULT_PLATFORMS: &[&str] = &["instagram", "facebook"];

/// Outcome of one pass over due entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
    pub credential_failures: usize,
    /// Due entries left for a later pass because quota ran out.
    pub deferred: usize,
}

pub struct PublishScheduler {
    slots: Arc<SlotAllocator>,
    schedule: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRepository>,
    publisher: Arc<dyn Publisher>,
    platforms: HashMap<String, BTreeSet<String>>,
    event_bus: EventBus,
    quota: Arc<QuotaGovernor>,
    allocation: Mutex<()>,
}

impl PublishScheduler {
    pub fn new(
        slots: Arc<SlotAllocator>,
        schedule: Arc<dyn ScheduleRepository>,
        jobs: Arc<dyn JobRepository>,
        publisher: Arc<dyn Publisher>,
        platforms: HashMap<String, BTreeSet<String>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            slots,
            schedule,
            jobs,
            publisher,
            platforms,
            event_bus,
            quota: Arc::new(QuotaGovernor::unmetered()),
            allocation: Mutex::new(()),
        }
    }

    pub fn with_quota(mut self, quota: Arc<QuotaGovernor>) -> Self {
        self.quota = quota;
        self
    }

    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    fn platforms_for(&self, brand: &str) -> BTreeSet<String> {
        self.platforms
            .get(brand)
            .cloned()
            .unwrap_or_else(|| DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect())
    }

    /// Allocate the next free slot for a completed job and persist the entry.
    /// Scheduling the same job twice returns the existing entry.
    pub async fn schedule_job(&self, job: &Job, now: DateTime<Utc>) -> Result<ScheduledEntry> {
        let _guard = self.allocation.lock().await;

        if let Some(existing) = self.schedule.find_by_job(job.id).await? {
            debug!(job_id = %job.id, entry_id = %existing.id, "Job already scheduled");
            return Ok(existing);
        }

        let occupied: BTreeSet<DateTime<Utc>> = self
            .schedule
            .list_active(Some(job.brand.as_str()))
            .await?
            .into_iter()
            .map(|e| e.scheduled_time)
            .collect();

        let slot = self
            .slots
            .next_slot(&job.brand, job.content_type, job.variant, now, &occupied)
            .with_context(|| format!("allocating slot for job {}", job.id))?;

        let entry = ScheduledEntry::for_job(job, self.platforms_for(&job.brand), slot);
        self.schedule.save(&entry).await?;

        info!(
            job_id = %job.id,
            entry_id = %entry.id,
            brand = %entry.brand,
            scheduled_time = %slot,
            "Job scheduled"
        );
        self.event_bus.publish(ScheduleEvent::EntryScheduled {
            entry_id: entry.id,
            job_id: job.id,
            brand: entry.brand.clone(),
            scheduled_time: slot,
        });
        Ok(entry)
    }

    /// Move misplaced and colliding entries to valid, free slots.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupPlan> {
        let _guard = self.allocation.lock().await;

        let entries = self.schedule.list_active(None).await?;
        let plan = self.slots.plan_cleanup(&entries, now);
        if plan.is_empty() {
            return Ok(plan);
        }

        let by_id: HashMap<_, _> = entries.into_iter().map(|e| (e.id, e)).collect();
        for slot_move in &plan.moves {
            let Some(mut entry) = by_id.get(&slot_move.entry_id).cloned() else {
                continue;
            };
            entry.reschedule(slot_move.to);
            if let Err(e) = self.schedule.save(&entry).await {
                warn!(entry_id = %entry.id, error = %e, "Failed to persist slot move");
                continue;
            }
            info!(
                entry_id = %entry.id,
                brand = %slot_move.brand,
                from = %slot_move.from,
                to = %slot_move.to,
                reason = ?slot_move.reason,
                "Entry moved"
            );
            self.event_bus.publish(ScheduleEvent::EntryMoved {
                entry_id: entry.id,
                from: slot_move.from,
                to: slot_move.to,
            });
        }
        for (entry_id, error) in &plan.unresolved {
            warn!(entry_id = %entry_id, error = %error, "Entry could not be rescheduled");
        }
        Ok(plan)
    }

    /// Publish every scheduled entry whose time has come.
    pub async fn publish_due(&self, now: DateTime<Utc>) -> Result<PublishSummary> {
        let mut due: Vec<ScheduledEntry> = self
            .schedule
            .list_active(None)
            .await?
            .into_iter()
            .filter(|e| e.is_due(now))
            .collect();
        due.sort_by_key(|e| e.scheduled_time);

        let mut summary = PublishSummary::default();
        for entry in due {
            let calls = u32::try_from(entry.platforms.len()).unwrap_or(u32::MAX);
            if !self.quota.acquire_for(OP_PUBLISH, calls, Some(entry.brand.as_str()), now) {
                debug!(entry_id = %entry.id, brand = %entry.brand, "Publish deferred by quota");
                summary.deferred += 1;
                continue;
            }
            summary.attempted += 1;
            match self.publish_entry(entry, now).await {
                Ok(published) if published.status == EntryStatus::Published => summary.published += 1,
                Ok(failed) => {
                    summary.failed += 1;
                    if failed.retry.error_kind == Some(PublishErrorKind::Credential) {
                        summary.credential_failures += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(error = %e, "Publishing entry failed");
                }
            }
        }
        Ok(summary)
    }

    /// Return entries stuck in `Publishing` for longer than `timeout` to
    /// `Scheduled`.
    pub async fn release_stalled(&self, now: DateTime<Utc>, timeout: Duration) -> Result<Vec<EntryId>> {
        let mut released = Vec::new();
        for mut entry in self.schedule.list_active(None).await? {
            if !entry.is_publish_stalled(now, timeout) {
                continue;
            }
            entry.release_stalled(format!(
                "publish attempt stalled for more than {} minutes",
                timeout.num_minutes()
            ));
            if let Err(e) = self.schedule.save(&entry).await {
                warn!(entry_id = %entry.id, error = %e, "Failed to release stalled entry");
                continue;
            }
            counter!("autoreel_publish_total", "outcome" => "stalled").increment(1);
            warn!(entry_id = %entry.id, brand = %entry.brand, "Stalled publish released");
            released.push(entry.id);
        }
        Ok(released)
    }

    async fn publish_entry(&self, mut entry: ScheduledEntry, now: DateTime<Utc>) -> Result<ScheduledEntry> {
        let job = self
            .jobs
            .find_by_id(entry.job_id)
            .await?
            .ok_or_else(|| anyhow!("job {} for entry {} not found", entry.job_id, entry.id))?;

        entry.begin_publishing(now);
        self.schedule.save(&entry).await?;

        let results = match &job.output {
            Some(output) => {
                self.publisher
                    .publish(&entry.platforms, &output.media_ref, &output.caption)
                    .await
            }
            None => entry
                .platforms
                .iter()
                .map(|p| {
                    (
                        p.clone(),
                        PlatformResult::failed("job has no rendered output", PublishErrorKind::Transient),
                    )
                })
                .collect(),
        };

        entry.record_publish(results, now);
        self.schedule.save(&entry).await?;

        let (succeeded, failed): (Vec<_>, Vec<_>) = entry
            .retry
            .platform_results
            .iter()
            .partition(|(_, r)| r.success);
        let succeeded: Vec<String> = succeeded.into_iter().map(|(p, _)| p.clone()).collect();
        let failed: Vec<String> = failed.into_iter().map(|(p, _)| p.clone()).collect();

        if entry.status == EntryStatus::Published {
            counter!("autoreel_publish_total", "outcome" => "published").increment(1);
            info!(entry_id = %entry.id, brand = %entry.brand, ?succeeded, ?failed, "Entry published");
            self.event_bus.publish(ScheduleEvent::EntryPublished {
                entry_id: entry.id,
                succeeded,
                failed,
                published_at: now,
            });
        } else {
            let credential = entry.retry.error_kind == Some(PublishErrorKind::Credential);
            counter!("autoreel_publish_total", "outcome" => "failed").increment(1);
            warn!(
                entry_id = %entry.id,
                brand = %entry.brand,
                credential,
                error = entry.retry.last_error.as_deref().unwrap_or("unknown"),
                "Entry failed to publish"
            );
            self.event_bus.publish(ScheduleEvent::EntryFailed {
                entry_id: entry.id,
                error: entry.retry.last_error.clone().unwrap_or_default(),
                credential,
                failed_at: now,
            });
        }
        Ok(entry)
    }
}

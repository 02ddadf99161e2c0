// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Healing
//!
//! Periodic repair of the job pipeline:
//!
//! 1. jobs still `Generating` past the dispatcher's timeout are failed with a
//!    diagnostic reason;
//! 2. schedule entries stuck in `Publishing` past the publish timeout go back
//!    to `Scheduled`;
//! 3. failed jobs are diagnosed from their stored error and retried
//!    automatically when the failure is retryable and the retry budget allows;
//! 4. everything else is surfaced in the [`HealingReport`] for a human.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::config::{chrono_duration, HealingConfig};
use crate::domain::events::JobEvent;
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::repository::JobRepository;
use crate::domain::schedule::EntryId;
use crate::infrastructure::event_bus::EventBus;

use super::dispatcher::JobDispatcher;
use super::publishing::PublishScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Transient,
    RateLimited,
    Credential,
    Resource,
    Content,
    Unknown,
}

impl FailureCategory {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureCategory::Transient | FailureCategory::RateLimited | FailureCategory::Resource
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCategory::Transient => "transient",
            FailureCategory::RateLimited => "rate_limited",
            FailureCategory::Credential => "credential",
            FailureCategory::Resource => "resource",
            FailureCategory::Content => "content",
            FailureCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// First match wins.
const RULES: &[(&str, FailureCategory)] = &[
    (
        r"(?i)unauthori[sz]ed|forbidden|\b40[13]\b|invalid (api )?key|token (expired|invalid|revoked)|credential",
        FailureCategory::Credential,
    ),
    (
        r"(?i)rate.?limit|too many requests|\b429\b|quota",
        FailureCategory::RateLimited,
    ),
    (
        r"(?i)out of memory|\boom\b|no space left|disk full|resource exhausted",
        FailureCategory::Resource,
    ),
    (
        r"(?i)malformed|invalid (payload|content|script)|policy violation|empty (script|payload)",
        FailureCategory::Content,
    ),
    (
        r"(?i)time(d)? ?out|connection (reset|refused|closed)|temporar|unavailable|\b50[234]\b|stuck",
        FailureCategory::Transient,
    ),
];

/// Maps stored job errors to a [`FailureCategory`].
pub struct FailureClassifier {
    rules: Vec<(Regex, FailureCategory)>,
}

impl FailureClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|(pattern, category)| Ok((Regex::new(pattern)?, *category)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn classify(&self, error: &str) -> FailureCategory {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(error))
            .map(|(_, category)| *category)
            .unwrap_or(FailureCategory::Unknown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJobDiagnosis {
    pub job_id: JobId,
    pub brand: String,
    pub category: FailureCategory,
    pub error: String,
    pub retry_count: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealingReport {
    pub stuck_reset: Vec<JobId>,
    #[serde(default)]
    pub publishes_released: Vec<EntryId>,
    pub retried: Vec<JobId>,
    pub needs_attention: Vec<FailedJobDiagnosis>,
}

impl HealingReport {
    pub fn is_clean(&self) -> bool {
        self.stuck_reset.is_empty()
            && self.publishes_released.is_empty()
            && self.retried.is_empty()
            && self.needs_attention.is_empty()
    }
}

pub struct HealingService {
    jobs: Arc<dyn JobRepository>,
    dispatcher: JobDispatcher,
    publishing: Arc<PublishScheduler>,
    event_bus: EventBus,
    classifier: FailureClassifier,
    max_auto_retries: u32,
    publish_timeout: chrono::Duration,
}

impl HealingService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        dispatcher: JobDispatcher,
        publishing: Arc<PublishScheduler>,
        event_bus: EventBus,
        config: &HealingConfig,
    ) -> Result<Self> {
        Ok(Self {
            jobs,
            dispatcher,
            publishing,
            event_bus,
            classifier: FailureClassifier::new()?,
            max_auto_retries: config.max_auto_retries,
            publish_timeout: chrono_duration(config.publish_timeout),
        })
    }

    pub fn classify(&self, error: &str) -> FailureCategory {
        self.classifier.classify(error)
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<HealingReport> {
        let mut report = HealingReport {
            stuck_reset: self.reset_stuck(now).await?,
            ..Default::default()
        };
        match self.publishing.release_stalled(now, self.publish_timeout).await {
            Ok(released) => report.publishes_released = released,
            Err(e) => warn!(error = %e, "Failed to scan for stalled publishes"),
        }

        for job in self.jobs.find_by_status(JobStatus::Failed).await? {
            let error = job.error.clone().unwrap_or_default();
            let category = self.classifier.classify(&error);

            let reason = if !category.is_retryable() {
                format!("{} failure needs manual attention", category)
            } else if job.retry_count >= self.max_auto_retries {
                format!("retry budget exhausted ({} attempts)", job.retry_count)
            } else {
                let id = job.id;
                match self.requeue(job).await {
                    Ok(()) => report.retried.push(id),
                    Err(e) => warn!(job_id = %id, error = %e, "Automatic retry failed"),
                }
                continue;
            };

            report.needs_attention.push(FailedJobDiagnosis {
                job_id: job.id,
                brand: job.brand.clone(),
                category,
                error,
                retry_count: job.retry_count,
                reason,
            });
        }

        if !report.is_clean() {
            info!(
                stuck = report.stuck_reset.len(),
                released = report.publishes_released.len(),
                retried = report.retried.len(),
                attention = report.needs_attention.len(),
                "Healing pass complete"
            );
        }
        Ok(report)
    }

    async fn reset_stuck(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        let timeout = chrono_duration(self.dispatcher.job_timeout());
        let mut reset = Vec::new();
        for mut job in self.jobs.find_by_status(JobStatus::Generating).await? {
            if !job.is_stuck(now, timeout) {
                continue;
            }
            let reason = format!(
                "stuck: still generating after {} minutes (timeout {} minutes)",
                job.started_at.map(|s| (now - s).num_minutes()).unwrap_or_default(),
                timeout.num_minutes()
            );
            job.fail(reason.clone(), now)?;
            self.jobs.save(&job).await?;
            counter!("autoreel_jobs_total", "outcome" => "stuck").increment(1);
            warn!(job_id = %job.id, brand = %job.brand, "Stuck job failed");
            self.event_bus.publish(JobEvent::JobFailed {
                job_id: job.id,
                error: reason,
                failed_at: now,
            });
            reset.push(job.id);
        }
        Ok(reset)
    }

    async fn requeue(&self, mut job: Job) -> Result<()> {
        job.reset_for_retry()?;
        self.jobs.save(&job).await?;
        counter!("autoreel_jobs_total", "outcome" => "retried").increment(1);
        self.event_bus.publish(JobEvent::JobRetried {
            job_id: job.id,
            retry_count: job.retry_count,
            retried_at: Utc::now(),
        });
        info!(job_id = %job.id, retry = job.retry_count, "Job requeued");
        self.dispatcher.dispatch(job);
        Ok(())
    }

    /// Manual retry of one failed job, regardless of category or budget.
    pub async fn retry_job(&self, id: JobId) -> Result<Job> {
        let job = self
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", id))?;
        if job.status != JobStatus::Failed {
            bail!("job {} is {:?}; only failed jobs can be retried", id, job.status);
        }
        let mut snapshot = job.clone();
        self.requeue(job).await?;
        snapshot.status = JobStatus::Pending;
        snapshot.retry_count += 1;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::DispatchSettings;
    use crate::application::publishing::PublishScheduler;
    use crate::domain::agent::AgentId;
    use crate::domain::job::{JobError, JobOutput};
    use crate::domain::proposal::{ContentType, ContentVariant, Proposal, ProposalPayload};
    use crate::domain::runner::JobRunner;
    use crate::domain::repository::ScheduleRepository;
    use crate::domain::schedule::{EntryStatus, ScheduledEntry};
    use crate::domain::slots::SlotAllocator;
    use crate::infrastructure::dry_run::LogPublisher;
    use crate::infrastructure::repositories::{
        InMemoryJobRepository, InMemoryProposalRepository, InMemoryScheduleRepository,
    };
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::time::Duration;

    struct OkRunner;

    #[async_trait]
    impl JobRunner for OkRunner {
        async fn process(&self, _job: &Job) -> Result<JobOutput, JobError> {
            Ok(JobOutput {
                media_ref: "m".to_string(),
                caption: "c".to_string(),
            })
        }
    }

    fn service(jobs: Arc<InMemoryJobRepository>) -> HealingService {
        service_with_schedule(jobs, Arc::new(InMemoryScheduleRepository::new()))
    }

    fn service_with_schedule(
        jobs: Arc<InMemoryJobRepository>,
        schedule: Arc<InMemoryScheduleRepository>,
    ) -> HealingService {
        let bus = EventBus::new(64);
        let publishing = Arc::new(PublishScheduler::new(
            Arc::new(SlotAllocator::default()),
            schedule,
            jobs.clone(),
            Arc::new(LogPublisher),
            HashMap::new(),
            bus.clone(),
        ));
        let dispatcher = JobDispatcher::new(
            jobs.clone(),
            Arc::new(InMemoryProposalRepository::new()),
            Arc::new(OkRunner),
            publishing.clone(),
            bus.clone(),
            DispatchSettings {
                max_concurrent_jobs: 2,
                stagger: Duration::ZERO,
                job_timeout: Duration::from_secs(30 * 60),
            },
        );
        HealingService::new(jobs, dispatcher, publishing, bus, &HealingConfig::default()).unwrap()
    }

    fn failed_job(error: &str, retries: u32) -> Job {
        let proposal = Proposal::new(
            AgentId::new(),
            "northwind",
            ContentType::Reel,
            ContentVariant::Light,
            "explainer",
            ProposalPayload::default(),
        );
        let mut job = Job::from_proposal(&proposal);
        job.retry_count = retries;
        job.fail(error, Utc::now()).unwrap();
        job
    }

    #[test]
    fn test_classification() {
        let c = FailureClassifier::new().unwrap();
        assert_eq!(c.classify("HTTP 429 Too Many Requests"), FailureCategory::RateLimited);
        assert_eq!(c.classify("render failed: upstream timed out"), FailureCategory::Transient);
        assert_eq!(c.classify("401 Unauthorized"), FailureCategory::Credential);
        assert_eq!(c.classify("ffmpeg: No space left on device"), FailureCategory::Resource);
        assert_eq!(c.classify("malformed script payload"), FailureCategory::Content);
        assert_eq!(c.classify("something odd"), FailureCategory::Unknown);
        assert!(!FailureCategory::Credential.is_retryable());
    }

    #[tokio::test]
    async fn test_stuck_job_is_failed_then_retried() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let healing = service(jobs.clone());
        let proposal = Proposal::new(
            AgentId::new(),
            "northwind",
            ContentType::Post,
            ContentVariant::Dark,
            "listicle",
            ProposalPayload::default(),
        );
        let mut job = Job::from_proposal(&proposal);
        let now = Utc::now();
        job.start(now - chrono::Duration::hours(2)).unwrap();
        jobs.save(&job).await.unwrap();

        let report = healing.run(now).await.unwrap();
        assert_eq!(report.stuck_reset, vec![job.id]);
        assert_eq!(report.retried, vec![job.id]);

        healing.dispatcher.wait_idle().await;
        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_stalled_publish_is_rescheduled() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let schedule = Arc::new(InMemoryScheduleRepository::new());
        let healing = service_with_schedule(jobs.clone(), schedule.clone());
        let now = Utc::now();

        let proposal = Proposal::new(
            AgentId::new(),
            "northwind",
            ContentType::Reel,
            ContentVariant::Light,
            "explainer",
            ProposalPayload::default(),
        );
        let job = Job::from_proposal(&proposal);
        let mut stalled = ScheduledEntry::for_job(&job, BTreeSet::from(["instagram".to_string()]), now);
        stalled.begin_publishing(now - chrono::Duration::hours(2));
        let mut fresh = ScheduledEntry::for_job(&job, BTreeSet::new(), now + chrono::Duration::hours(8));
        fresh.begin_publishing(now - chrono::Duration::minutes(1));
        schedule.save(&stalled).await.unwrap();
        schedule.save(&fresh).await.unwrap();

        let report = healing.run(now).await.unwrap();
        assert_eq!(report.publishes_released, vec![stalled.id]);
        assert!(!report.is_clean());
        let stored = schedule.find_by_id(stalled.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Scheduled);
        assert!(stored.retry.last_error.unwrap().contains("stalled"));
        let untouched = schedule.find_by_id(fresh.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, EntryStatus::Publishing);
    }

    #[tokio::test]
    async fn test_non_retryable_and_exhausted_surface() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let healing = service(jobs.clone());
        let credential = failed_job("403 forbidden", 0);
        let exhausted = failed_job("connection reset by peer", 3);
        jobs.save(&credential).await.unwrap();
        jobs.save(&exhausted).await.unwrap();

        let report = healing.run(Utc::now()).await.unwrap();
        assert!(report.retried.is_empty());
        assert_eq!(report.needs_attention.len(), 2);
        let cred = report
            .needs_attention
            .iter()
            .find(|d| d.job_id == credential.id)
            .unwrap();
        assert_eq!(cred.category, FailureCategory::Credential);
    }

    #[tokio::test]
    async fn test_manual_retry_ignores_budget() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let healing = service(jobs.clone());
        let job = failed_job("403 forbidden", 5);
        jobs.save(&job).await.unwrap();

        let retried = healing.retry_job(job.id).await.unwrap();
        assert_eq!(retried.retry_count, 6);
        healing.dispatcher.wait_idle().await;
        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);

        assert!(healing.retry_job(job.id).await.is_err());
    }
}

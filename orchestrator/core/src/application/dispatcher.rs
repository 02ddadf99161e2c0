// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Dispatcher
//!
//! Turns accepted proposals into rendering jobs and runs them with bounded
//! concurrency. A job only enters `Generating` while holding a semaphore
//! permit, so at most `max_concurrent_jobs` jobs render at once. The permit is
//! released on every exit path, including panics inside the runner.
//!
//! Jobs are never cancelled mid-flight. A job that outlives `job_timeout` is
//! picked up by the healing cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, gauge};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::domain::events::JobEvent;
use crate::domain::job::{Job, JobStatus};
use crate::domain::proposal::Proposal;
use crate::domain::repository::{JobRepository, ProposalRepository};
use crate::domain::runner::JobRunner;
use crate::infrastructure::event_bus::EventBus;

use super::publishing::PublishScheduler;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub max_concurrent_jobs: usize,
    pub stagger: Duration,
    pub job_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            stagger: Duration::from_secs(5),
            job_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Decrements the in-flight counter when a generating job leaves scope.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("autoreel_jobs_in_flight").set(now as f64);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("autoreel_jobs_in_flight").set(now as f64);
    }
}

#[derive(Clone)]
pub struct JobDispatcher {
    jobs: Arc<dyn JobRepository>,
    proposals: Arc<dyn ProposalRepository>,
    runner: Arc<dyn JobRunner>,
    publishing: Arc<PublishScheduler>,
    event_bus: EventBus,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    in_flight: Arc<AtomicUsize>,
    settings: DispatchSettings,
}

impl JobDispatcher {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        proposals: Arc<dyn ProposalRepository>,
        runner: Arc<dyn JobRunner>,
        publishing: Arc<PublishScheduler>,
        event_bus: EventBus,
        settings: DispatchSettings,
    ) -> Self {
        let permits = settings.max_concurrent_jobs.max(1);
        Self {
            jobs,
            proposals,
            runner,
            publishing,
            event_bus,
            semaphore: Arc::new(Semaphore::new(permits)),
            tracker: TaskTracker::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            settings,
        }
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    pub fn job_timeout(&self) -> Duration {
        self.settings.job_timeout
    }

    /// Jobs currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Create a pending job for an accepted proposal and link it back.
    pub async fn create_job(&self, proposal: &Proposal) -> Result<Job> {
        let job = Job::from_proposal(proposal);
        self.jobs
            .save(&job)
            .await
            .with_context(|| format!("saving job for proposal {}", proposal.id))?;

        let mut linked = proposal.clone();
        linked.accepted_job_id = Some(job.id);
        self.proposals.save(&linked).await?;

        counter!("autoreel_jobs_total", "outcome" => "created").increment(1);
        debug!(job_id = %job.id, proposal_id = %proposal.id, "Job created");
        self.event_bus.publish(JobEvent::JobCreated {
            job_id: job.id,
            proposal_id: proposal.id,
            brand: job.brand.clone(),
            created_at: job.created_at,
        });
        Ok(job)
    }

    /// Create and dispatch jobs for a batch of accepted proposals.
    ///
    /// Returns immediately; a tracked feeder task walks the batch with the
    /// configured stagger between dispatches.
    pub fn dispatch_batch(&self, proposals: Vec<Proposal>) {
        if proposals.is_empty() {
            return;
        }
        let dispatcher = self.clone();
        self.tracker.spawn(async move {
            let total = proposals.len();
            for (i, proposal) in proposals.into_iter().enumerate() {
                if i > 0 && !dispatcher.settings.stagger.is_zero() {
                    tokio::time::sleep(dispatcher.settings.stagger).await;
                }
                match dispatcher.create_job(&proposal).await {
                    Ok(job) => dispatcher.dispatch(job),
                    Err(e) => warn!(proposal_id = %proposal.id, error = %e, "Failed to create job"),
                }
            }
            info!(jobs = total, "Batch handed to dispatcher");
        });
    }

    /// Run one pending job in a tracked task once a permit is free.
    pub fn dispatch(&self, job: Job) {
        let dispatcher = self.clone();
        self.tracker.spawn(async move {
            let permit = match Arc::clone(&dispatcher.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %job.id, "Dispatcher closed; job left pending");
                    return;
                }
            };
            if let Err(e) = dispatcher.run(job).await {
                error!(error = %e, "Job execution failed");
            }
            drop(permit);
        });
    }

    async fn run(&self, mut job: Job) -> Result<()> {
        let started_at = Utc::now();
        if let Err(e) = job.start(started_at) {
            warn!(job_id = %job.id, error = %e, "Job not startable");
            return Ok(());
        }
        self.jobs.save(&job).await?;
        let _in_flight = InFlight::enter(&self.in_flight);
        self.event_bus.publish(JobEvent::JobStarted {
            job_id: job.id,
            started_at,
        });

        let outcome = self.runner.process(&job).await;
        if !self.still_owned(&job).await? {
            counter!("autoreel_jobs_total", "outcome" => "superseded").increment(1);
            warn!(
                job_id = %job.id,
                attempt = job.retry_count,
                "Job was reset while running; discarding stale result"
            );
            return Ok(());
        }

        match outcome {
            Ok(output) => {
                let finished_at = Utc::now();
                job.complete(output, finished_at)?;
                self.jobs.save(&job).await?;
                counter!("autoreel_jobs_total", "outcome" => "completed").increment(1);
                let duration_ms = (finished_at - started_at).num_milliseconds();
                info!(job_id = %job.id, brand = %job.brand, duration_ms, "Job completed");
                self.event_bus.publish(JobEvent::JobCompleted {
                    job_id: job.id,
                    duration_ms,
                    completed_at: finished_at,
                });

                if let Err(e) = self.publishing.schedule_job(&job, finished_at).await {
                    warn!(job_id = %job.id, error = %e, "Completed job could not be scheduled");
                }
            }
            Err(e) => {
                let failed_at = Utc::now();
                job.fail(e.to_string(), failed_at)?;
                self.jobs.save(&job).await?;
                counter!("autoreel_jobs_total", "outcome" => "failed").increment(1);
                warn!(job_id = %job.id, brand = %job.brand, error = %e, "Job failed");
                self.event_bus.publish(JobEvent::JobFailed {
                    job_id: job.id,
                    error: e.to_string(),
                    failed_at,
                });
            }
        }
        Ok(())
    }

    /// Whether the stored job is still the attempt this task started.
    /// Healing may have reset a stuck job and handed it to another task.
    async fn still_owned(&self, job: &Job) -> Result<bool> {
        let stored = self
            .jobs
            .find_by_id(job.id)
            .await
            .with_context(|| format!("re-reading job {}", job.id))?;
        Ok(stored.is_some_and(|stored| {
            stored.status == JobStatus::Generating
                && stored.retry_count == job.retry_count
                && stored.started_at == job.started_at
        }))
    }

    /// Wait until every batch feeder and job task spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop handing out permits and wait for running jobs to finish.
    pub async fn shutdown(&self) {
        self.semaphore.close();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::job::{JobError, JobOutput, JobStatus};
    use crate::domain::proposal::{ContentType, ContentVariant, ProposalPayload};
    use crate::domain::repository::ScheduleRepository;
    use crate::domain::slots::SlotAllocator;
    use crate::infrastructure::dry_run::LogPublisher;
    use crate::infrastructure::repositories::{
        InMemoryJobRepository, InMemoryProposalRepository, InMemoryScheduleRepository,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Runner that records the peak number of concurrent `process` calls.
    #[derive(Default)]
    struct PeakRunner {
        current: AtomicUsize,
        peak: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl JobRunner for PeakRunner {
        async fn process(&self, job: &Job) -> Result<JobOutput, JobError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(JobError::Render("encoder crashed".to_string()));
            }
            Ok(JobOutput {
                media_ref: format!("mem://{}", job.id),
                caption: "caption".to_string(),
            })
        }
    }

    struct Fixture {
        dispatcher: JobDispatcher,
        jobs: Arc<InMemoryJobRepository>,
        proposals: Arc<InMemoryProposalRepository>,
        schedule: Arc<InMemoryScheduleRepository>,
    }

    fn fixture(runner: Arc<PeakRunner>, max_concurrent_jobs: usize) -> Fixture {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let proposals = Arc::new(InMemoryProposalRepository::new());
        let schedule = Arc::new(InMemoryScheduleRepository::new());
        let bus = EventBus::new(64);
        let publishing = Arc::new(PublishScheduler::new(
            Arc::new(SlotAllocator::default()),
            schedule.clone(),
            jobs.clone(),
            Arc::new(LogPublisher),
            HashMap::new(),
            bus.clone(),
        ));
        let dispatcher = JobDispatcher::new(
            jobs.clone(),
            proposals.clone(),
            runner,
            publishing,
            bus,
            DispatchSettings {
                max_concurrent_jobs,
                stagger: Duration::ZERO,
                job_timeout: Duration::from_secs(60),
            },
        );
        Fixture {
            dispatcher,
            jobs,
            proposals,
            schedule,
        }
    }

    fn accepted(variant: ContentVariant) -> Proposal {
        let mut proposal = Proposal::new(
            AgentId::new(),
            "northwind",
            ContentType::Reel,
            variant,
            "explainer",
            ProposalPayload::default(),
        );
        proposal.accept(None, Utc::now()).unwrap();
        proposal
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let runner = Arc::new(PeakRunner::default());
        let f = fixture(runner.clone(), 2);
        let batch: Vec<_> = (0..6)
            .map(|i| accepted(if i % 2 == 0 { ContentVariant::Light } else { ContentVariant::Dark }))
            .collect();

        f.dispatcher.dispatch_batch(batch);
        f.dispatcher.wait_idle().await;

        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(f.dispatcher.in_flight(), 0);
        let completed = f.jobs.find_by_status(JobStatus::Completed).await.unwrap();
        assert_eq!(completed.len(), 6);
        assert_eq!(f.schedule.list_all().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_create_job_links_proposal() {
        let f = fixture(Arc::new(PeakRunner::default()), 1);
        let proposal = accepted(ContentVariant::Light);
        f.proposals.save(&proposal).await.unwrap();

        let job = f.dispatcher.create_job(&proposal).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        let stored = f.proposals.find_by_id(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_job_id, Some(job.id));
    }

    #[tokio::test]
    async fn test_runner_failure_marks_job_failed() {
        let runner = Arc::new(PeakRunner {
            fail: true,
            ..Default::default()
        });
        let f = fixture(runner, 1);
        f.dispatcher.dispatch_batch(vec![accepted(ContentVariant::Dark)]);
        f.dispatcher.wait_idle().await;

        let failed = f.jobs.find_by_status(JobStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap_or_default().contains("encoder crashed"));
        assert!(f.schedule.list_all().await.unwrap().is_empty());
    }

    /// Runner that resets its own job mid-flight, as healing does for a stuck job.
    struct ResettingRunner {
        jobs: Arc<InMemoryJobRepository>,
    }

    #[async_trait]
    impl JobRunner for ResettingRunner {
        async fn process(&self, job: &Job) -> Result<JobOutput, JobError> {
            let mut stored = self.jobs.find_by_id(job.id).await.unwrap().unwrap();
            stored.fail("stuck", Utc::now()).unwrap();
            stored.reset_for_retry().unwrap();
            self.jobs.save(&stored).await.unwrap();
            Ok(JobOutput {
                media_ref: format!("mem://{}", job.id),
                caption: "caption".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_stale_completion_does_not_overwrite_reset_job() {
        let jobs = Arc::new(InMemoryJobRepository::new());
        let proposals = Arc::new(InMemoryProposalRepository::new());
        let schedule = Arc::new(InMemoryScheduleRepository::new());
        let bus = EventBus::new(64);
        let publishing = Arc::new(PublishScheduler::new(
            Arc::new(SlotAllocator::default()),
            schedule.clone(),
            jobs.clone(),
            Arc::new(LogPublisher),
            HashMap::new(),
            bus.clone(),
        ));
        let dispatcher = JobDispatcher::new(
            jobs.clone(),
            proposals,
            Arc::new(ResettingRunner { jobs: jobs.clone() }),
            publishing,
            bus,
            DispatchSettings {
                max_concurrent_jobs: 1,
                stagger: Duration::ZERO,
                job_timeout: Duration::from_secs(60),
            },
        );

        dispatcher.dispatch_batch(vec![accepted(ContentVariant::Light)]);
        dispatcher.wait_idle().await;

        let pending = jobs.find_by_status(JobStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
        assert!(pending[0].output.is_none());
        assert!(jobs.find_by_status(JobStatus::Completed).await.unwrap().is_empty());
        assert!(schedule.list_all().await.unwrap().is_empty());
    }
}

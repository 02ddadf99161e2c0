// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use crate::domain::job::{Job, JobError, JobOutput};

/// Renders and packages a job. Blocking work belongs on the blocking pool
/// (`tokio::task::spawn_blocking`) inside the implementation.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn process(&self, job: &Job) -> Result<JobOutput, JobError>;
}

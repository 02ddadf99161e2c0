// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: the services that drive a tenant's content loop and the
//! per-tenant orchestrator and scheduler that compose them.

pub mod bootstrap;
pub mod burst;
pub mod diagnostics;
pub mod dispatcher;
pub mod evolution;
pub mod healing;
pub mod orchestrator;
pub mod publishing;
pub mod quality_gate;
pub mod repository_factory;
pub mod research;
pub mod scheduler;

// Re-export the composition root for convenience
pub use orchestrator::{Capabilities, CycleOutcome, Orchestrator, StatusSnapshot};
pub use repository_factory::{create_repositories, Repositories, StorageBackend};
pub use scheduler::CycleScheduler;

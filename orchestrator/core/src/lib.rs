// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Autoreel core
//!
//! Autonomous orchestration of short-form content for many brands: proposal
//! generation behind a quality gate, bounded job dispatch, collision-free
//! publish slots, quota-governed research, and an evolution loop that tunes
//! the generating agents from engagement feedback.
//!
//! # Architecture
//!
//! - **domain:** entities, value objects, pure services, capability traits
//! - **application:** use-case services, the per-tenant orchestrator, the scheduler
//! - **infrastructure:** event bus, in-memory repositories, offline adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{Capabilities, CycleScheduler, Orchestrator, Repositories};
pub use domain::config::OrchestratorConfigManifest;

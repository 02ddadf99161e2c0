// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: entities, value objects, pure domain services (quota
//! governor, slot allocator), and the repository and capability traits the
//! application layer is written against.

pub mod agent;
pub mod config;
pub mod cycle;
pub mod events;
pub mod examiner;
pub mod gene_pool;
pub mod generator;
pub mod job;
pub mod learning;
pub mod pattern;
pub mod performance;
pub mod proposal;
pub mod publisher;
pub mod quota;
pub mod repository;
pub mod runner;
pub mod schedule;
pub mod slots;
pub mod sources;
pub mod tenant;

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the autoreel CLI

pub mod config;
pub mod diagnose;
pub mod run;
pub mod slots;

pub use self::config::ConfigCommand;
pub use self::diagnose::DiagnoseArgs;
pub use self::run::RunArgs;
pub use self::slots::SlotsArgs;

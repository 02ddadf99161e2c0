// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dry_run;
pub mod event_bus;
pub mod examiner;
pub mod repositories;

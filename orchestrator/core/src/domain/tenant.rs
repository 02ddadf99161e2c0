// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted per-tenant control state. Survives restarts so that a paused
/// tenant stays paused and a burst is not repeated on the same local day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantState {
    pub paused: bool,
    pub last_burst_at: Option<DateTime<Utc>>,
    pub bootstrap_disabled: bool,
}

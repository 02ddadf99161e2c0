// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named periodic cycles run by the scheduler for each tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Check,
    Publish,
    Observe,
    Scout,
    Feedback,
    Evolution,
    Diagnostics,
    Bootstrap,
    Healing,
}

impl CycleKind {
    pub const ALL: [CycleKind; 9] = [
        CycleKind::Check,
        CycleKind::Publish,
        CycleKind::Observe,
        CycleKind::Scout,
        CycleKind::Feedback,
        CycleKind::Evolution,
        CycleKind::Diagnostics,
        CycleKind::Bootstrap,
        CycleKind::Healing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CycleKind::Check => "check",
            CycleKind::Publish => "publish",
            CycleKind::Observe => "observe",
            CycleKind::Scout => "scout",
            CycleKind::Feedback => "feedback",
            CycleKind::Evolution => "evolution",
            CycleKind::Diagnostics => "diagnostics",
            CycleKind::Bootstrap => "bootstrap",
            CycleKind::Healing => "healing",
        }
    }

    /// Cycles that mutate long-lived state and must not run twice per cadence window.
    pub fn is_idempotent_guarded(self) -> bool {
        matches!(
            self,
            CycleKind::Feedback | CycleKind::Evolution | CycleKind::Bootstrap
        )
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CycleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CycleKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown cycle '{}'", s))
    }
}

/// How the daily burst sizes its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstMode {
    /// Generate the full daily target.
    Full,
    /// Subtract what has already been accepted since local midnight.
    Smart,
}

impl fmt::Display for BurstMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstMode::Full => f.write_str("full"),
            BurstMode::Smart => f.write_str("smart"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_names_round_trip() {
        for kind in CycleKind::ALL {
            assert_eq!(kind.as_str().parse::<CycleKind>(), Ok(kind));
        }
        assert!("weekly".parse::<CycleKind>().is_err());
    }
}

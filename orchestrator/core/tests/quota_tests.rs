// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::BTreeMap;

use autoreel_core::domain::quota::{QuotaGovernor, ServiceQuota};
use chrono::{DateTime, Duration, Utc};

fn governor(limit: u32) -> QuotaGovernor {
    QuotaGovernor::with_default_priorities(BTreeMap::from([(
        "meta".to_string(),
        ServiceQuota::hourly(limit),
    )]))
}

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[test]
fn test_reserved_band_defers_low_priority_only() {
    let quota = governor(150);
    let now = at("2025-01-16T10:15:00Z");
    quota.record_usage("meta", 140, None, "own_analysis", now);

    assert!(!quota.should_allow("meta", "competitor_scrape", 10, now));
    assert!(quota.should_allow("meta", "own_analysis", 10, now));
    assert!(!quota.should_allow("meta", "own_analysis", 11, now));

    // the next hour is a fresh window
    assert!(quota.should_allow("meta", "competitor_scrape", 10, now + Duration::hours(1)));
    assert_eq!(quota.window("meta", now).unwrap().calls_made, 140);
}

#[test]
fn test_honoured_high_priority_usage_never_exceeds_limit() {
    let quota = governor(20);
    let now = at("2025-01-16T10:15:00Z");
    let mut admitted = 0;
    for _ in 0..50 {
        if quota.try_acquire("meta", "own_analysis", 1, Some("light-1"), now) {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 20);
    let window = quota.window("meta", now).unwrap();
    assert_eq!(window.calls_made, 20);
    assert_eq!(window.agent_breakdown.get("light-1"), Some(&20));
}

#[test]
fn test_low_priority_stops_at_reserved_band() {
    let quota = governor(20);
    let now = at("2025-01-16T10:15:00Z");
    let admitted = (0..50)
        .filter(|_| quota.try_acquire("meta", "trend_discovery", 1, None, now))
        .count();
    // 30% of 20 is held back for high-priority work
    assert_eq!(admitted, 14);
    assert!(quota.try_acquire("meta", "own_analysis", 6, None, now));
}

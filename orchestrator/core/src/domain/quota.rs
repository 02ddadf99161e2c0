// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # API Quota Governor
//!
//! Tracks calls against external APIs in fixed hourly or daily windows and
//! decides whether an operation may spend quota now.
//!
//! High-priority operations (own analytics, content generation, examination,
//! publishing) may use the whole window. Everything else must leave a reserved
//! band of `ceil(limit * reserved_fraction)` calls untouched. A `false` answer
//! means "defer", and callers skip the work until a later tick.
//!
//! Services without a configured quota are unmetered. Pipeline stages charge
//! by operation name through [`QuotaGovernor::acquire_for`], which resolves
//! the service from the governor's routing table.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, DurationRound, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RESERVED_FRACTION: f64 = 0.30;

pub const OP_CONTENT_GENERATION: &str = "content_generation";
pub const OP_EXAMINE: &str = "examine";
pub const OP_PUBLISH: &str = "publish";

pub const DEFAULT_HIGH_PRIORITY_OPERATIONS: &[&str] =
    &["own_analysis", OP_CONTENT_GENERATION, OP_EXAMINE, OP_PUBLISH];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowGranularity {
    Hourly,
    Daily,
}

impl WindowGranularity {
    /// Start of the window containing `now`.
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = match self {
            WindowGranularity::Hourly => Duration::hours(1),
            WindowGranularity::Daily => Duration::days(1),
        };
        now.duration_trunc(step).unwrap_or(now)
    }
}

fn default_reserved_fraction() -> f64 {
    DEFAULT_RESERVED_FRACTION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceQuota {
    pub limit: u32,
    pub window: WindowGranularity,
    #[serde(default = "default_reserved_fraction")]
    pub reserved_fraction: f64,
}

impl ServiceQuota {
    pub fn hourly(limit: u32) -> Self {
        Self {
            limit,
            window: WindowGranularity::Hourly,
            reserved_fraction: DEFAULT_RESERVED_FRACTION,
        }
    }

    pub fn daily(limit: u32) -> Self {
        Self {
            limit,
            window: WindowGranularity::Daily,
            reserved_fraction: DEFAULT_RESERVED_FRACTION,
        }
    }

    /// Calls kept back for high-priority operations.
    pub fn reserved(&self) -> u32 {
        (self.limit as f64 * self.reserved_fraction.clamp(0.0, 1.0)).ceil() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPriority {
    High,
    Low,
}

/// Usage of one service within one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaWindow {
    pub service: String,
    pub window: WindowGranularity,
    pub window_start: DateTime<Utc>,
    pub calls_made: u32,
    pub limit: u32,
    pub agent_breakdown: BTreeMap<String, u32>,
    pub operation_breakdown: BTreeMap<String, u32>,
}

impl QuotaWindow {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.calls_made)
    }
}

/// Current-window view of one service, for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub service: String,
    pub window: WindowGranularity,
    pub window_start: DateTime<Utc>,
    pub calls_made: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reserved: u32,
}

pub struct QuotaGovernor {
    services: BTreeMap<String, ServiceQuota>,
    high_priority: HashSet<String>,
    // operation -> service
    routes: BTreeMap<String, String>,
    // Keyed by (service, window_start). Old windows are kept as history.
    windows: Mutex<BTreeMap<(String, DateTime<Utc>), QuotaWindow>>,
}

impl QuotaGovernor {
    pub fn new<I, S>(services: BTreeMap<String, ServiceQuota>, high_priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            services,
            high_priority: high_priority.into_iter().map(Into::into).collect(),
            routes: BTreeMap::new(),
            windows: Mutex::new(BTreeMap::new()),
        }
    }

    /// Governor with no metered services; every call is admitted.
    pub fn unmetered() -> Self {
        Self::with_default_priorities(BTreeMap::new())
    }

    /// Route operations to the service they are charged against.
    pub fn with_routes(mut self, routes: BTreeMap<String, String>) -> Self {
        self.routes = routes;
        self
    }

    pub fn service_for(&self, operation: &str) -> Option<&str> {
        self.routes.get(operation).map(String::as_str)
    }

    pub fn with_default_priorities(services: BTreeMap<String, ServiceQuota>) -> Self {
        Self::new(services, DEFAULT_HIGH_PRIORITY_OPERATIONS.iter().copied())
    }

    pub fn priority_of(&self, operation: &str) -> OperationPriority {
        if self.high_priority.contains(operation) {
            OperationPriority::High
        } else {
            OperationPriority::Low
        }
    }

    pub fn quota(&self, service: &str) -> Option<&ServiceQuota> {
        self.services.get(service)
    }

    fn calls_in_window(
        windows: &BTreeMap<(String, DateTime<Utc>), QuotaWindow>,
        service: &str,
        start: DateTime<Utc>,
    ) -> u32 {
        windows
            .get(&(service.to_string(), start))
            .map(|w| w.calls_made)
            .unwrap_or(0)
    }

    fn allowed(
        &self,
        windows: &BTreeMap<(String, DateTime<Utc>), QuotaWindow>,
        service: &str,
        operation: Option<&str>,
        n: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(quota) = self.services.get(service) else {
            return true;
        };
        let made = Self::calls_in_window(windows, service, quota.window.window_start(now));
        match operation.map(|op| self.priority_of(op)) {
            None | Some(OperationPriority::High) => made.saturating_add(n) <= quota.limit,
            Some(OperationPriority::Low) => {
                let remaining = quota.limit.saturating_sub(made) as i64;
                remaining - n as i64 >= quota.reserved() as i64
            }
        }
    }

    /// `calls_made + n <= limit` in the current window.
    pub fn can_use(&self, service: &str, n: u32, now: DateTime<Utc>) -> bool {
        let windows = self.windows.lock();
        self.allowed(&windows, service, None, n, now)
    }

    /// Priority-aware admission check. Does not record anything.
    pub fn should_allow(&self, service: &str, operation: &str, n: u32, now: DateTime<Utc>) -> bool {
        let windows = self.windows.lock();
        let allowed = self.allowed(&windows, service, Some(operation), n, now);
        if !allowed {
            tracing::debug!(service, operation, n, "Quota deferral");
        }
        allowed
    }

    fn record_locked(
        &self,
        windows: &mut BTreeMap<(String, DateTime<Utc>), QuotaWindow>,
        service: &str,
        n: u32,
        agent: Option<&str>,
        operation: &str,
        now: DateTime<Utc>,
    ) {
        let Some(quota) = self.services.get(service) else {
            return;
        };
        let start = quota.window.window_start(now);
        let window = windows
            .entry((service.to_string(), start))
            .or_insert_with(|| QuotaWindow {
                service: service.to_string(),
                window: quota.window,
                window_start: start,
                calls_made: 0,
                limit: quota.limit,
                agent_breakdown: BTreeMap::new(),
                operation_breakdown: BTreeMap::new(),
            });
        window.calls_made = window.calls_made.saturating_add(n);
        if let Some(agent) = agent {
            let calls = window.agent_breakdown.entry(agent.to_string()).or_default();
            *calls = calls.saturating_add(n);
        }
        let calls = window
            .operation_breakdown
            .entry(operation.to_string())
            .or_default();
        *calls = calls.saturating_add(n);
    }

    /// Count `n` calls against the service's current window.
    pub fn record_usage(
        &self,
        service: &str,
        n: u32,
        agent: Option<&str>,
        operation: &str,
        now: DateTime<Utc>,
    ) {
        let mut windows = self.windows.lock();
        self.record_locked(&mut windows, service, n, agent, operation, now);
    }

    /// Check and record under one lock. Returns whether the calls were admitted.
    pub fn try_acquire(
        &self,
        service: &str,
        operation: &str,
        n: u32,
        agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut windows = self.windows.lock();
        if !self.allowed(&windows, service, Some(operation), n, now) {
            tracing::debug!(service, operation, n, "Quota deferral");
            return false;
        }
        self.record_locked(&mut windows, service, n, agent, operation, now);
        true
    }

    /// [`try_acquire`](Self::try_acquire) against the service `operation` is
    /// routed to. Unrouted operations are admitted without being recorded.
    pub fn acquire_for(&self, operation: &str, n: u32, agent: Option<&str>, now: DateTime<Utc>) -> bool {
        match self.service_for(operation) {
            Some(service) => self.try_acquire(service, operation, n, agent, now),
            None => true,
        }
    }

    pub fn window(&self, service: &str, now: DateTime<Utc>) -> Option<QuotaWindow> {
        let quota = self.services.get(service)?;
        let start = quota.window.window_start(now);
        self.windows
            .lock()
            .get(&(service.to_string(), start))
            .cloned()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> Vec<QuotaUsage> {
        let windows = self.windows.lock();
        self.services
            .iter()
            .map(|(service, quota)| {
                let start = quota.window.window_start(now);
                let made = Self::calls_in_window(&windows, service, start);
                QuotaUsage {
                    service: service.clone(),
                    window: quota.window,
                    window_start: start,
                    calls_made: made,
                    limit: quota.limit,
                    remaining: quota.limit.saturating_sub(made),
                    reserved: quota.reserved(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn governor() -> QuotaGovernor {
        let services = BTreeMap::from([
            ("meta".to_string(), ServiceQuota::hourly(150)),
            ("search".to_string(), ServiceQuota::daily(10)),
        ]);
        QuotaGovernor::with_default_priorities(services)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 16, h, m, 0).unwrap()
    }

    #[test]
    fn test_reserved_band_defers_low_priority() {
        let q = governor();
        q.record_usage("meta", 140, None, "own_analysis", at(10, 5));
        assert!(!q.should_allow("meta", "competitor_scrape", 10, at(10, 30)));
        assert!(q.should_allow("meta", "own_analysis", 10, at(10, 30)));
        assert!(!q.should_allow("meta", "own_analysis", 11, at(10, 30)));
    }

    #[test]
    fn test_low_priority_allowed_above_reserve() {
        let q = governor();
        // reserved = ceil(150 * 0.3) = 45; remaining 100 - 55 = 45 >= 45
        q.record_usage("meta", 50, None, "trend_discovery", at(9, 0));
        assert!(q.should_allow("meta", "trend_discovery", 55, at(9, 10)));
        assert!(!q.should_allow("meta", "trend_discovery", 56, at(9, 10)));
    }

    #[test]
    fn test_window_rollover() {
        let q = governor();
        q.record_usage("meta", 150, Some("agent-a"), "publish", at(10, 59));
        assert!(!q.can_use("meta", 1, at(10, 59)));
        assert!(q.can_use("meta", 150, at(11, 0)));
        let w = q.window("meta", at(10, 1)).unwrap();
        assert_eq!(w.agent_breakdown.get("agent-a"), Some(&150));
        assert_eq!(w.operation_breakdown.get("publish"), Some(&150));
        assert!(q.window("meta", at(11, 1)).is_none());
    }

    #[test]
    fn test_unknown_service_unmetered() {
        let q = governor();
        assert!(q.should_allow("unlisted", "competitor_scrape", 10_000, at(1, 0)));
        assert!(q.try_acquire("unlisted", "competitor_scrape", 10_000, None, at(1, 0)));
        assert!(q.summary(at(1, 0)).iter().all(|u| u.service != "unlisted"));
    }

    #[test]
    fn test_try_acquire_records_only_when_admitted() {
        let q = governor();
        for _ in 0..10 {
            assert!(q.try_acquire("search", "examine", 1, None, at(3, 0)));
        }
        assert!(!q.try_acquire("search", "examine", 1, None, at(23, 0)));
        let usage = q
            .summary(at(23, 0))
            .into_iter()
            .find(|u| u.service == "search")
            .unwrap();
        assert_eq!(usage.calls_made, 10);
        assert_eq!(usage.remaining, 0);
        assert_eq!(usage.reserved, 3);
    }

    #[test]
    fn test_breakdowns_saturate() {
        let q = governor();
        q.record_usage("meta", u32::MAX, Some("agent-a"), "publish", at(4, 0));
        q.record_usage("meta", 5, Some("agent-a"), "publish", at(4, 1));
        let w = q.window("meta", at(4, 2)).unwrap();
        assert_eq!(w.calls_made, u32::MAX);
        assert_eq!(w.agent_breakdown.get("agent-a"), Some(&u32::MAX));
        assert_eq!(w.operation_breakdown.get("publish"), Some(&u32::MAX));
    }

    #[test]
    fn test_routed_operations_are_charged() {
        let q = governor().with_routes(BTreeMap::from([(OP_PUBLISH.to_string(), "meta".to_string())]));
        assert_eq!(q.service_for(OP_PUBLISH), Some("meta"));
        assert!(q.acquire_for(OP_PUBLISH, 110, Some("northwind"), at(12, 0)));
        assert_eq!(q.window("meta", at(12, 0)).unwrap().calls_made, 110);
        // 40 left, inside the 45-call reserve
        assert!(!q.should_allow("meta", "trend_discovery", 1, at(12, 5)));
        assert!(q.acquire_for(OP_PUBLISH, 40, None, at(12, 5)));
        assert!(!q.acquire_for(OP_PUBLISH, 1, None, at(12, 6)));
        // unrouted operations are not metered
        assert!(q.acquire_for("unrouted", 1_000, None, at(12, 6)));
        assert_eq!(q.window("meta", at(12, 6)).unwrap().calls_made, 150);
    }
}

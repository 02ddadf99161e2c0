// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Publish-Slot Allocator
//!
//! Maps brands onto a fixed daily grid of publish times.
//!
//! Reels use a six-slot pattern that alternates variants
//! (`00 light, 04 dark, 08 light, 12 dark, 16 light, 20 dark`), shifted by the
//! brand's hour offset so brands sharing an account do not publish at once.
//! Posts take `posts_per_day` of those slots, spread evenly and shifted again
//! by `post_offset_hours`; they carry no variant constraint.
//!
//! All times are UTC and on the hour. The allocator is pure: callers pass in
//! the times already taken by active entries.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::proposal::{ContentType, ContentVariant};
use crate::domain::schedule::{EntryId, EntryStatus, ScheduledEntry};

pub const DEFAULT_HORIZON_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHour {
    pub hour: u32,
    pub variant: ContentVariant,
}

pub fn default_reel_pattern() -> Vec<SlotHour> {
    use ContentVariant::{Dark, Light};
    [(0, Light), (4, Dark), (8, Light), (12, Dark), (16, Light), (20, Dark)]
        .into_iter()
        .map(|(hour, variant)| SlotHour { hour, variant })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandSlots {
    #[serde(default)]
    pub hour_offset: u32,
    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: usize,
    #[serde(default = "default_post_offset_hours")]
    pub post_offset_hours: u32,
    /// No slot is handed out before this instant.
    #[serde(default)]
    pub launch_date: Option<DateTime<Utc>>,
}

fn default_posts_per_day() -> usize {
    2
}

fn default_post_offset_hours() -> u32 {
    2
}

impl Default for BrandSlots {
    fn default() -> Self {
        Self {
            hour_offset: 0,
            posts_per_day: default_posts_per_day(),
            post_offset_hours: default_post_offset_hours(),
            launch_date: None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SlotError {
    #[error("no free {content_type} slot for brand '{brand}' within {days} days")]
    HorizonExhausted {
        brand: String,
        content_type: ContentType,
        days: u32,
    },

    #[error("brand '{brand}' has no {content_type} hours configured")]
    NoHours {
        brand: String,
        content_type: ContentType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveReason {
    /// Entry sat on an hour that is not valid for its type and variant.
    WrongSlot,
    /// Another active entry of the brand was created earlier at the same time.
    Collision,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotMove {
    pub entry_id: EntryId,
    pub brand: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub reason: MoveReason,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    pub moves: Vec<SlotMove>,
    pub unresolved: Vec<(EntryId, SlotError)>,
}

impl CleanupPlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SlotAllocator {
    reel_pattern: Vec<SlotHour>,
    brands: HashMap<String, BrandSlots>,
    horizon_days: u32,
}

impl SlotAllocator {
    pub fn new(reel_pattern: Vec<SlotHour>, brands: HashMap<String, BrandSlots>) -> Self {
        Self {
            reel_pattern,
            brands,
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }

    pub fn with_horizon_days(mut self, days: u32) -> Self {
        self.horizon_days = days.max(1);
        self
    }

    /// Brands without explicit configuration use the unshifted defaults.
    pub fn brand(&self, brand: &str) -> BrandSlots {
        self.brands.get(brand).cloned().unwrap_or_default()
    }

    pub fn valid_hours(&self, brand: &str, variant: ContentVariant) -> Vec<u32> {
        let cfg = self.brand(brand);
        let mut hours: Vec<u32> = self
            .reel_pattern
            .iter()
            .filter(|s| s.variant == variant)
            .map(|s| (s.hour + cfg.hour_offset) % 24)
            .collect();
        hours.sort_unstable();
        hours.dedup();
        hours
    }

    pub fn post_hours(&self, brand: &str) -> Vec<u32> {
        let cfg = self.brand(brand);
        let n = self.reel_pattern.len();
        let k = cfg.posts_per_day.min(n);
        let mut hours: Vec<u32> = (0..k)
            .map(|i| {
                let base = self.reel_pattern[i * n / k].hour;
                (base + cfg.hour_offset + cfg.post_offset_hours) % 24
            })
            .collect();
        hours.sort_unstable();
        hours.dedup();
        hours
    }

    fn hours_for(&self, brand: &str, content_type: ContentType, variant: ContentVariant) -> Vec<u32> {
        match content_type {
            ContentType::Reel => self.valid_hours(brand, variant),
            ContentType::Post => self.post_hours(brand),
        }
    }

    pub fn is_valid_slot(
        &self,
        brand: &str,
        content_type: ContentType,
        variant: ContentVariant,
        t: DateTime<Utc>,
    ) -> bool {
        if t.minute() != 0 || t.second() != 0 || t.nanosecond() != 0 {
            return false;
        }
        self.hours_for(brand, content_type, variant)
            .contains(&t.hour())
    }

    fn scan(
        &self,
        brand: &str,
        content_type: ContentType,
        hours: &[u32],
        after: DateTime<Utc>,
        occupied: &BTreeSet<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, SlotError> {
        if hours.is_empty() {
            return Err(SlotError::NoHours {
                brand: brand.to_string(),
                content_type,
            });
        }
        let floor = match self.brand(brand).launch_date {
            Some(launch) if launch > after => launch,
            _ => after,
        };
        let first_day = floor.date_naive();
        for day in 0..=i64::from(self.horizon_days) {
            let date = first_day + Duration::days(day);
            for &hour in hours {
                let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
                    continue;
                };
                let candidate = date.and_time(time).and_utc();
                if candidate > after && candidate >= floor && !occupied.contains(&candidate) {
                    return Ok(candidate);
                }
            }
        }
        Err(SlotError::HorizonExhausted {
            brand: brand.to_string(),
            content_type,
            days: self.horizon_days,
        })
    }

    /// First free reel slot for the variant strictly after `after`.
    pub fn next_available_slot(
        &self,
        brand: &str,
        variant: ContentVariant,
        after: DateTime<Utc>,
        occupied: &BTreeSet<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, SlotError> {
        let hours = self.valid_hours(brand, variant);
        self.scan(brand, ContentType::Reel, &hours, after, occupied)
    }

    pub fn next_post_slot(
        &self,
        brand: &str,
        after: DateTime<Utc>,
        occupied: &BTreeSet<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, SlotError> {
        let hours = self.post_hours(brand);
        self.scan(brand, ContentType::Post, &hours, after, occupied)
    }

    pub fn next_slot(
        &self,
        brand: &str,
        content_type: ContentType,
        variant: ContentVariant,
        after: DateTime<Utc>,
        occupied: &BTreeSet<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, SlotError> {
        match content_type {
            ContentType::Reel => self.next_available_slot(brand, variant, after, occupied),
            ContentType::Post => self.next_post_slot(brand, after, occupied),
        }
    }

    /// The next `count` free slots, each one treated as taken for the next.
    pub fn upcoming(
        &self,
        brand: &str,
        content_type: ContentType,
        variant: ContentVariant,
        after: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<DateTime<Utc>>, SlotError> {
        let mut occupied = BTreeSet::new();
        let mut cursor = after;
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            let slot = self.next_slot(brand, content_type, variant, cursor, &occupied)?;
            occupied.insert(slot);
            cursor = slot;
            slots.push(slot);
        }
        Ok(slots)
    }

    /// Compute the moves that restore slot validity and per-brand uniqueness.
    ///
    /// Publishing entries are never moved. Among entries sharing a valid
    /// `(brand, time)`, the earliest created stays; the others, and every
    /// scheduled entry on a wrong hour, move to the next open matching slot
    /// after `max(scheduled_time, now)`.
    pub fn plan_cleanup(&self, entries: &[ScheduledEntry], now: DateTime<Utc>) -> CleanupPlan {
        let mut active: Vec<&ScheduledEntry> = entries.iter().filter(|e| e.is_active()).collect();
        active.sort_by(|a, b| {
            let not_publishing = |e: &ScheduledEntry| e.status != EntryStatus::Publishing;
            not_publishing(a)
                .cmp(&not_publishing(b))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut occupied: BTreeMap<&str, BTreeSet<DateTime<Utc>>> = BTreeMap::new();
        let mut pending: Vec<(&ScheduledEntry, MoveReason)> = Vec::new();

        for entry in active.iter().copied() {
            let taken = occupied.entry(entry.brand.as_str()).or_default();
            if entry.status == EntryStatus::Publishing {
                taken.insert(entry.scheduled_time);
                continue;
            }
            let valid = self.is_valid_slot(
                &entry.brand,
                entry.content_type,
                entry.variant,
                entry.scheduled_time,
            );
            if !valid {
                pending.push((entry, MoveReason::WrongSlot));
            } else if !taken.insert(entry.scheduled_time) {
                pending.push((entry, MoveReason::Collision));
            }
        }

        let mut plan = CleanupPlan::default();
        for (entry, reason) in pending {
            let taken = occupied.entry(entry.brand.as_str()).or_default();
            let after = entry.scheduled_time.max(now);
            match self.next_slot(&entry.brand, entry.content_type, entry.variant, after, taken) {
                Ok(to) => {
                    taken.insert(to);
                    plan.moves.push(SlotMove {
                        entry_id: entry.id,
                        brand: entry.brand.clone(),
                        from: entry.scheduled_time,
                        to,
                        reason,
                    });
                }
                Err(err) => plan.unresolved.push((entry.id, err)),
            }
        }
        plan
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new(default_reel_pattern(), HashMap::new())
    }
}

// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Heatwise.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! In-memory store of half-hour tariff slots.
//!
//! Slots are keyed by start instant. A batch is validated in full before any
//! slot is written, so a rejected batch leaves the store untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use heatwise_types::{Period, RateSlot};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Rates closer than this are treated as the same value.
const RATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct StoredSlot {
    slot: RateSlot,
    source: String,
}

#[derive(Debug, Default)]
pub struct RateStore {
    slots: RwLock<BTreeMap<DateTime<Utc>, StoredSlot>>,
}

impl RateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a batch of slots delivered by `source`.
    ///
    /// Returns the number of slots written. Re-delivering an identical slot
    /// is a no-op write; a different source disagreeing on a rate that is
    /// already stored is rejected.
    pub fn upsert(&self, batch: &[RateSlot], source: &str) -> EngineResult<usize> {
        let mut slots = self.slots.write();

        let mut previous: Option<DateTime<Utc>> = None;
        for slot in batch {
            validate_slot(slot)?;

            if let Some(prev) = previous
                && slot.start <= prev
            {
                return Err(EngineError::InvalidSlot {
                    start: slot.start,
                    reason: "batch is not strictly increasing by start time".to_owned(),
                });
            }
            previous = Some(slot.start);

            if let Some(existing) = slots.get(&slot.start)
                && existing.source != source
                && (existing.slot.unit_rate - slot.unit_rate).abs() > RATE_EPSILON
            {
                return Err(EngineError::InvalidSlot {
                    start: slot.start,
                    reason: format!(
                        "conflicts with rate {:.4} from source '{}'",
                        existing.slot.unit_rate, existing.source
                    ),
                });
            }
        }

        for slot in batch {
            slots.insert(
                slot.start,
                StoredSlot {
                    slot: *slot,
                    source: source.to_owned(),
                },
            );
        }

        debug!(
            "Stored {} rate slots from '{}' ({} total)",
            batch.len(),
            source,
            slots.len()
        );
        Ok(batch.len())
    }

    /// Slot containing `t`, if one is stored.
    pub fn rate_at(&self, t: DateTime<Utc>) -> Option<RateSlot> {
        let slots = self.slots.read();
        slots
            .range(..=t)
            .next_back()
            .map(|(_, stored)| stored.slot)
            .filter(|slot| slot.contains(t))
    }

    /// Slots starting in `[from, to)`, ordered by start.
    pub fn slots_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<RateSlot> {
        if to <= from {
            return Vec::new();
        }
        self.slots
            .read()
            .range(from..to)
            .map(|(_, stored)| stored.slot)
            .collect()
    }

    /// Slots starting in `[now - period, now)`, ordered by start.
    pub fn history(&self, period: Period, now: DateTime<Utc>) -> Vec<RateSlot> {
        self.slots_between(period.start_from(now), now)
    }

    /// Mean unit rate over the period, or `None` when no slot falls in it.
    pub fn average_rate(&self, period: Period, now: DateTime<Utc>) -> Option<f64> {
        let history = self.history(period, now);
        if history.is_empty() {
            return None;
        }
        let total: f64 = history.iter().map(|slot| slot.unit_rate).sum();
        #[expect(clippy::cast_precision_loss, reason = "slot counts are small")]
        let count = history.len() as f64;
        Some(total / count)
    }

    /// Start of the latest stored slot.
    pub fn latest_start(&self) -> Option<DateTime<Utc>> {
        self.slots.read().keys().next_back().copied()
    }

    /// Drop every slot starting before `cutoff`. Returns how many were removed.
    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut slots = self.slots.write();
        let kept = slots.split_off(&cutoff);
        let removed = slots.len();
        *slots = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

fn validate_slot(slot: &RateSlot) -> EngineResult<()> {
    let reason = if slot.end <= slot.start {
        "end must be after start"
    } else if !slot.is_aligned() {
        "slot must be exactly 30 minutes and start on a half-hour boundary"
    } else if !slot.unit_rate.is_finite() {
        "unit rate must be a finite number"
    } else {
        return Ok(());
    };

    Err(EngineError::InvalidSlot {
        start: slot.start,
        reason: reason.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, h, m, 0).unwrap()
    }

    #[test]
    fn test_rate_at_uses_half_open_slots() {
        let store = RateStore::new();
        store
            .upsert(&[RateSlot::new(at(6, 0), 12.0), RateSlot::new(at(6, 30), 20.0)], "feed")
            .unwrap();

        assert_eq!(store.rate_at(at(6, 0)).unwrap().unit_rate, 12.0);
        assert_eq!(store.rate_at(at(6, 29)).unwrap().unit_rate, 12.0);
        assert_eq!(store.rate_at(at(6, 30)).unwrap().unit_rate, 20.0);
        assert!(store.rate_at(at(7, 0)).is_none());
        assert!(store.rate_at(at(5, 59)).is_none());
    }

    #[test]
    fn test_gap_is_not_filled() {
        let store = RateStore::new();
        store
            .upsert(&[RateSlot::new(at(6, 0), 12.0), RateSlot::new(at(7, 0), 20.0)], "feed")
            .unwrap();
        assert!(store.rate_at(at(6, 45)).is_none());
    }

    #[test]
    fn test_upsert_replaces_same_source() {
        let store = RateStore::new();
        store.upsert(&[RateSlot::new(at(6, 0), 12.0)], "feed").unwrap();
        store.upsert(&[RateSlot::new(at(6, 0), 14.5)], "feed").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.rate_at(at(6, 10)).unwrap().unit_rate, 14.5);
    }

    #[test]
    fn test_conflicting_source_rejects_whole_batch() {
        let store = RateStore::new();
        store.upsert(&[RateSlot::new(at(6, 30), 12.0)], "feed").unwrap();

        let err = store
            .upsert(&[RateSlot::new(at(6, 0), 9.0), RateSlot::new(at(6, 30), 30.0)], "manual")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSlot { .. }));
        // nothing from the rejected batch was applied
        assert!(store.rate_at(at(6, 0)).is_none());
        assert_eq!(store.rate_at(at(6, 30)).unwrap().unit_rate, 12.0);

        // agreeing on the value is fine
        store.upsert(&[RateSlot::new(at(6, 30), 12.0)], "manual").unwrap();
    }

    #[test]
    fn test_invalid_slots_are_rejected() {
        let store = RateStore::new();

        let misaligned = RateSlot::new(at(6, 10), 12.0);
        assert!(store.upsert(&[misaligned], "feed").is_err());

        let inverted = RateSlot {
            start: at(6, 30),
            end: at(6, 0),
            unit_rate: 12.0,
        };
        assert!(store.upsert(&[inverted], "feed").is_err());

        let nan = RateSlot::new(at(6, 0), f64::NAN);
        assert!(store.upsert(&[nan], "feed").is_err());

        let unordered = [RateSlot::new(at(7, 0), 1.0), RateSlot::new(at(6, 30), 1.0)];
        assert!(store.upsert(&unordered, "feed").is_err());

        assert!(store.is_empty());
    }

    #[test]
    fn test_history_and_average() {
        let store = RateStore::new();
        let now = at(12, 0);
        let old = RateSlot::new(now - Duration::days(10), 40.0);
        let recent = [
            RateSlot::new(now - Duration::days(2), 10.0),
            RateSlot::new(now - Duration::hours(1), 20.0),
        ];
        store.upsert(&[old], "feed").unwrap();
        store.upsert(&recent, "feed").unwrap();

        let week = store.history(Period::Week, now);
        assert_eq!(week.len(), 2);
        assert!((store.average_rate(Period::Week, now).unwrap() - 15.0).abs() < 1e-9);
        assert!((store.average_rate(Period::Month, now).unwrap() - 70.0 / 3.0).abs() < 1e-9);

        let empty = RateStore::new();
        assert!(empty.average_rate(Period::Week, now).is_none());
    }

    #[test]
    fn test_history_excludes_slot_starting_at_now() {
        let store = RateStore::new();
        let now = at(12, 0);
        store
            .upsert(&[RateSlot::new(now - Duration::minutes(30), 10.0), RateSlot::new(now, 50.0)], "feed")
            .unwrap();

        let week = store.history(Period::Week, now);
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].unit_rate, 10.0);
        assert!((store.average_rate(Period::Week, now).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_evict_before() {
        let store = RateStore::new();
        store
            .upsert(&[RateSlot::new(at(6, 0), 1.0), RateSlot::new(at(6, 30), 2.0)], "feed")
            .unwrap();
        assert_eq!(store.evict_before(at(6, 30)), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest_start(), Some(at(6, 30)));
    }
}

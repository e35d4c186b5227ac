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


//! Metered consumption read back from the supplier.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use heatwise_types::ConsumptionSample;
use parking_lot::RwLock;
use tracing::debug;

/// Meter intervals keyed by start. A later reading for the same interval
/// replaces the earlier one.
#[derive(Debug, Default)]
pub struct ConsumptionStore {
    samples: RwLock<BTreeMap<DateTime<Utc>, ConsumptionSample>>,
}

impl ConsumptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every valid sample and return how many were kept.
    pub fn upsert(&self, batch: &[ConsumptionSample]) -> usize {
        let mut samples = self.samples.write();
        let mut kept = 0;
        for sample in batch {
            if !sample.is_valid() {
                debug!(start = %sample.start, kwh = sample.kwh, "Skipping invalid meter reading");
                continue;
            }
            samples.insert(sample.start, *sample);
            kept += 1;
        }
        kept
    }

    /// Samples starting in `[from, to)`, ordered by start.
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<ConsumptionSample> {
        if to <= from {
            return Vec::new();
        }
        self.samples.read().range(from..to).map(|(_, s)| *s).collect()
    }

    /// End of the newest stored interval.
    pub fn latest_end(&self) -> Option<DateTime<Utc>> {
        self.samples.read().values().next_back().map(|s| s.end)
    }

    /// Drop samples starting before `cutoff`, returning how many went.
    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut samples = self.samples.write();
        let kept = samples.split_off(&cutoff);
        let removed = samples.len();
        *samples = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use heatwise_types::slot_width;

    fn sample(h: u32, m: u32, kwh: f64) -> ConsumptionSample {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, h, m, 0).unwrap();
        ConsumptionSample {
            start,
            end: start + slot_width(),
            kwh,
        }
    }

    #[test]
    fn test_upsert_skips_invalid_and_replaces_same_interval() {
        let store = ConsumptionStore::new();
        assert_eq!(store.upsert(&[sample(6, 0, 0.5), sample(6, 30, -1.0)]), 1);
        assert_eq!(store.upsert(&[sample(6, 0, 0.7)]), 1);

        assert_eq!(store.len(), 1);
        let from = sample(0, 0, 0.0).start;
        let stored = store.between(from, from + Duration::days(1));
        assert_eq!(stored, vec![sample(6, 0, 0.7)]);
    }

    #[test]
    fn test_between_and_eviction() {
        let store = ConsumptionStore::new();
        store.upsert(&[sample(6, 0, 0.5), sample(6, 30, 0.25), sample(7, 0, 1.0)]);

        assert_eq!(store.between(sample(6, 30, 0.0).start, sample(7, 0, 0.0).start).len(), 1);
        assert_eq!(store.latest_end(), Some(sample(7, 30, 0.0).start));

        assert_eq!(store.evict_before(sample(7, 0, 0.0).start), 2);
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}

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

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Width of a tariff slot in minutes.
pub const SLOT_MINUTES: i64 = 30;

/// Width of a tariff slot.
pub fn slot_width() -> Duration {
    Duration::minutes(SLOT_MINUTES)
}

/// Floor an instant to the start of the half-hour slot containing it.
pub fn slot_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let into_slot = t.timestamp().rem_euclid(SLOT_MINUTES * 60);
    t - Duration::seconds(into_slot) - Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// One half-hour tariff slot. Rates are pence per kWh including VAT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub unit_rate: f64,
}

impl RateSlot {
    pub fn new(start: DateTime<Utc>, unit_rate: f64) -> Self {
        Self {
            start,
            end: start + slot_width(),
            unit_rate,
        }
    }

    /// Whether the instant falls inside `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Whether the slot sits on a half-hour boundary and is exactly one slot wide.
    pub fn is_aligned(&self) -> bool {
        slot_start(self.start) == self.start && self.end - self.start == slot_width()
    }
}

/// Energy read from the supply meter over one interval, kWh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kwh: f64,
}

impl ConsumptionSample {
    pub fn is_valid(&self) -> bool {
        self.end > self.start && self.kwh.is_finite() && self.kwh >= 0.0
    }
}

/// Price band a unit rate falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateClass {
    Cheap,
    Standard,
    Expensive,
}

impl RateClass {
    /// Cheap at or below `cheap_threshold`, expensive at or above
    /// `expensive_threshold`, standard in between.
    pub fn classify(rate: f64, cheap_threshold: f64, expensive_threshold: f64) -> Self {
        if rate <= cheap_threshold {
            Self::Cheap
        } else if rate >= expensive_threshold {
            Self::Expensive
        } else {
            Self::Standard
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Standard => "standard",
            Self::Expensive => "expensive",
        }
    }
}

impl std::fmt::Display for RateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

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

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// Why the heater was (or was not) energised for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    ManualOff,
    ManualBoost,
    OutsideWindow,
    RateUnavailableFallback,
    RateOptimized,
    MinimumRunGuarantee,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualOff => "manual_off",
            Self::ManualBoost => "manual_boost",
            Self::OutsideWindow => "outside_window",
            Self::RateUnavailableFallback => "rate_unavailable_fallback",
            Self::RateOptimized => "rate_optimized",
            Self::MinimumRunGuarantee => "minimum_run_guarantee",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_off" => Ok(Self::ManualOff),
            "manual_boost" => Ok(Self::ManualBoost),
            "outside_window" => Ok(Self::OutsideWindow),
            "rate_unavailable_fallback" => Ok(Self::RateUnavailableFallback),
            "rate_optimized" => Ok(Self::RateOptimized),
            "minimum_run_guarantee" => Ok(Self::MinimumRunGuarantee),
            other => Err(format!("unknown decision reason '{other}'")),
        }
    }
}

/// Persisted outcome of one slot decision. At most one record exists per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub heating: bool,
    /// Unit rate in force for the slot, when known
    pub rate: Option<f64>,
    pub mode: Mode,
    pub reason: DecisionReason,
    pub estimated_cost: f64,
    pub baseline_cost: f64,
}

impl DecisionRecord {
    pub fn savings(&self) -> f64 {
        self.baseline_cost - self.estimated_cost
    }

    /// Heated minutes of this slot that fall inside `[from, to)`.
    pub fn heated_minutes_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        if !self.heating {
            return 0;
        }
        let start = self.slot_start.max(from);
        let end = self.slot_end.min(to);
        (end - start).num_minutes().max(0)
    }
}

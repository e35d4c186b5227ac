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

use chrono::{DateTime, Utc};
use heatwise_types::{DecisionRecord, Mode, SLOT_MINUTES, slot_width};

use crate::engine::Decision;

/// Converts slot decisions into costs, in pence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Immersion heater rating
    pub heater_power_kw: f64,
    /// Fixed standard rate used as the comparison baseline, p/kWh
    pub baseline_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            heater_power_kw: 3.0,
            baseline_rate: 24.5,
        }
    }
}

impl CostModel {
    /// Energy drawn by one fully heated slot, kWh.
    pub fn slot_energy_kwh(&self) -> f64 {
        #[expect(clippy::cast_precision_loss, reason = "slot width is a small constant")]
        let hours = SLOT_MINUTES as f64 / 60.0;
        self.heater_power_kw * hours
    }

    /// Cost of the slot at its own rate. An unknown rate is priced at the
    /// baseline so it never shows up as a saving.
    pub fn estimated_cost(&self, heating: bool, rate: Option<f64>) -> f64 {
        if !heating {
            return 0.0;
        }
        rate.unwrap_or(self.baseline_rate) * self.slot_energy_kwh()
    }

    pub fn baseline_cost(&self, heating: bool) -> f64 {
        if heating {
            self.baseline_rate * self.slot_energy_kwh()
        } else {
            0.0
        }
    }

    pub fn record(&self, slot_start: DateTime<Utc>, decision: &Decision, mode: Mode) -> DecisionRecord {
        DecisionRecord {
            slot_start,
            slot_end: slot_start + slot_width(),
            heating: decision.heating,
            rate: decision.rate,
            mode,
            reason: decision.reason,
            estimated_cost: self.estimated_cost(decision.heating, decision.rate),
            baseline_cost: self.baseline_cost(decision.heating),
        }
    }
}

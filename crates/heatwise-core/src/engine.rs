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

//! Per-slot heating decision.
//!
//! `DecisionEngine::decide` is a pure function of the instant and an input
//! snapshot; the same inputs always give the same decision. Rules, first
//! match wins:
//!
//! 1. Off never heats.
//! 2. An unexpired Boost always heats.
//! 3. A slot that overlaps no enabled window does not heat. Windows are
//!    matched against the whole slot, not just the decision instant.
//! 4. Without a rate the slot heats only if it overlaps the final required
//!    run of an overlapping window.
//! 5. Cheap slots heat; standard slots heat outside peak hours; expensive
//!    slots never heat.
//! 6. A standard slot the rate rules declined still heats when the window
//!    has no more time left than the heating it still owes.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use heatwise_types::{
    DecisionReason, DecisionRecord, HeatingWindow, Mode, OverrideState, RateClass, RateSlot,
    SystemSettings, slot_start, slot_width,
};

use crate::schedule::{WindowInstance, instances_overlapping};

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub heating: bool,
    pub reason: DecisionReason,
    pub rate: Option<f64>,
    pub rate_class: Option<RateClass>,
    pub is_peak: bool,
}

/// Snapshot the engine decides from.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    pub mode: OverrideState,
    pub windows: &'a [HeatingWindow],
    pub settings: &'a SystemSettings,
    /// Slot covering the decision instant, if the store has one
    pub rate: Option<RateSlot>,
    /// Recent decision records, used for minimum-run bookkeeping
    pub recent: &'a [DecisionRecord],
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    timezone: Tz,
}

impl DecisionEngine {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn decide(&self, now: DateTime<Utc>, inputs: &DecisionInputs<'_>) -> Decision {
        let settings = inputs.settings;
        let is_peak = settings.is_peak(now.with_timezone(&self.timezone).time());
        let rate = inputs
            .rate
            .filter(|slot| slot.contains(now))
            .map(|slot| slot.unit_rate);
        let rate_class = rate.map(|r| settings.classify(r));
        let decision = |heating, reason| Decision {
            heating,
            reason,
            rate,
            rate_class,
            is_peak,
        };

        match inputs.mode.mode {
            Mode::Off => return decision(false, DecisionReason::ManualOff),
            Mode::Boost if !inputs.mode.is_expired_boost(now) => {
                return decision(true, DecisionReason::ManualBoost);
            }
            Mode::Boost | Mode::Optimized => {}
        }

        let slot_start = slot_start(now);
        let slot_end = slot_start + slot_width();

        let instances = instances_overlapping(inputs.windows, self.timezone, slot_start, slot_end);
        if instances.is_empty() {
            return decision(false, DecisionReason::OutsideWindow);
        }

        let Some(class) = rate_class else {
            let heating = instances
                .iter()
                .any(|instance| overlaps_final_run(instance, slot_end));
            return decision(heating, DecisionReason::RateUnavailableFallback);
        };

        let rate_allows = match class {
            RateClass::Cheap => true,
            RateClass::Standard => !is_peak,
            RateClass::Expensive => false,
        };
        if rate_allows {
            return decision(true, DecisionReason::RateOptimized);
        }

        if class == RateClass::Standard
            && instances
                .iter()
                .any(|instance| owes_remaining_window(instance, slot_start, inputs.recent))
        {
            return decision(true, DecisionReason::MinimumRunGuarantee);
        }

        decision(false, DecisionReason::RateOptimized)
    }
}

/// The slot reaches into the last `required` minutes of the instance.
fn overlaps_final_run(instance: &WindowInstance, slot_end: DateTime<Utc>) -> bool {
    let final_run_start = instance.end - Duration::minutes(instance.required_minutes());
    slot_end > final_run_start
}

/// Minutes already heated inside the instance. Boost slots are manual
/// overrides and do not count towards the window's minimum run.
fn heated_minutes(
    instance: &WindowInstance,
    slot_start: DateTime<Utc>,
    recent: &[DecisionRecord],
) -> i64 {
    recent
        .iter()
        .filter(|record| record.mode != Mode::Boost && record.slot_start != slot_start)
        .map(|record| record.heated_minutes_within(instance.start, instance.end))
        .sum()
}

fn owes_remaining_window(
    instance: &WindowInstance,
    slot_start: DateTime<Utc>,
    recent: &[DecisionRecord],
) -> bool {
    let still_required =
        (instance.required_minutes() - heated_minutes(instance, slot_start, recent)).max(0);
    if still_required == 0 {
        return false;
    }
    let remaining_window = (instance.end - slot_start.max(instance.start)).num_minutes();
    remaining_window <= still_required
}

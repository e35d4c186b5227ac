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

pub mod decision;
pub mod mode;
pub mod period;
pub mod rates;
pub mod schedule;
pub mod time_format;

// Re-export common types for convenience
pub use decision::{DecisionReason, DecisionRecord};
pub use mode::{Mode, OverrideState};
pub use period::Period;
pub use rates::{ConsumptionSample, RateClass, RateSlot, SLOT_MINUTES, slot_start, slot_width};
pub use schedule::{HeatingWindow, SystemSettings, Weekdays};

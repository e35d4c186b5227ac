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

//! Integrations with the outside world: the Octopus Energy tariff feed and
//! the relays that switch the immersion heater.

pub mod dry_run;
pub mod error;
pub mod home_assistant;
pub mod octopus;

pub use dry_run::DryRunRelay;
pub use error::{FeedError, FeedResult};
pub use home_assistant::HomeAssistantRelay;
pub use octopus::{MeterPoint, OctopusRateFeed};

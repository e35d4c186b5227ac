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

//! Heatwise decision core.
//!
//! Holds the in-memory rate store, schedule configuration and mode state,
//! the pure per-slot decision engine, and the control loop that records each
//! decision and drives the relay.

pub mod consumption;
pub mod control_loop;
pub mod cost;
pub mod decision_log;
pub mod engine;
pub mod error;
pub mod mode_controller;
pub mod persistence;
pub mod rate_feed;
pub mod rate_store;
pub mod relay;
pub mod schedule;
pub mod statistics;

pub use consumption::ConsumptionStore;
pub use control_loop::{ControlLoop, ControlStatus, TickOutcome};
pub use cost::CostModel;
pub use decision_log::{DecisionLog, MemoryDecisionLog};
pub use engine::{Decision, DecisionEngine, DecisionInputs};
pub use error::{EngineError, EngineResult};
pub use mode_controller::ModeController;
pub use persistence::{EngineState, StatePersistence};
pub use rate_feed::{ConsumptionFeed, RateFeed};
pub use rate_store::RateStore;
pub use relay::{Relay, RelayError, RetryPolicy};
pub use schedule::ScheduleConfig;
pub use statistics::StatisticsAggregator;

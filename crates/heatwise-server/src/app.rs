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

//! Shared engine state handed to the HTTP handlers.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use heatwise_core::{
    ConsumptionStore, ControlLoop, CostModel, DecisionLog, EngineResult, EngineState,
    ModeController, RateStore, Relay, RetryPolicy, ScheduleConfig, StatePersistence,
    StatisticsAggregator,
};
use parking_lot::Mutex;
use tracing::error;

/// Everything needed to assemble the engine.
#[derive(Debug)]
pub struct EngineParts {
    pub timezone: Tz,
    pub state: EngineState,
    pub rates: Arc<RateStore>,
    pub consumption: Arc<ConsumptionStore>,
    pub log: Arc<dyn DecisionLog>,
    pub relay: Arc<dyn Relay>,
    pub persistence: StatePersistence,
    pub costs: CostModel,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub schedule: Arc<ScheduleConfig>,
    pub rates: Arc<RateStore>,
    pub consumption: Arc<ConsumptionStore>,
    pub mode: Arc<ModeController>,
    pub control: Arc<ControlLoop>,
    pub stats: Arc<StatisticsAggregator>,
    persistence: Arc<Mutex<StatePersistence>>,
}

impl AppState {
    /// Assemble the engine. Fails if the persisted windows or settings no
    /// longer validate.
    pub fn new(parts: EngineParts) -> EngineResult<Self> {
        let EngineParts {
            timezone,
            mut state,
            rates,
            consumption,
            log,
            relay,
            persistence,
            costs,
            retry,
        } = parts;

        state.normalize(Utc::now());
        let schedule = Arc::new(ScheduleConfig::with_state(
            timezone,
            state.windows,
            state.settings,
        )?);
        let mode = Arc::new(ModeController::new(state.mode));
        let control = Arc::new(
            ControlLoop::new(
                schedule.clone(),
                rates.clone(),
                mode.clone(),
                log.clone(),
                relay,
            )
            .with_costs(costs)
            .with_retry_policy(retry),
        );
        let stats = Arc::new(
            StatisticsAggregator::new(rates.clone(), log, schedule.clone())
                .with_consumption(consumption.clone())
                .with_costs(costs),
        );

        Ok(Self {
            schedule,
            rates,
            consumption,
            mode,
            control,
            stats,
            persistence: Arc::new(Mutex::new(persistence)),
        })
    }

    /// Copy of the state that survives a restart.
    pub fn snapshot(&self) -> EngineState {
        EngineState {
            windows: self.schedule.list_windows(),
            settings: self.schedule.get_settings(),
            mode: self.mode.current(),
        }
    }

    /// Write the current snapshot to disk. Writers are serialized so the file
    /// always holds one complete snapshot.
    pub fn persist(&self) -> Result<()> {
        let persistence = self.persistence.lock();
        let snapshot = self.snapshot();
        persistence.save(&snapshot).inspect_err(|e| {
            error!("Failed to persist engine state: {:#}", e);
        })
    }
}

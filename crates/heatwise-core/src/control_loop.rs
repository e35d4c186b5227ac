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

//! Slot-aligned control loop.
//!
//! Each tick expires a due Boost, makes at most one decision per slot,
//! records it, and drives the relay. A slot that already has a record (for
//! example after a restart) is never re-decided; its stored outcome is
//! re-applied instead, unless Off or an active Boost is in force.
//!
//! Manual mode changes wake the loop between ticks, and so does the end of
//! a Boost. The loop then drives the relay to match the mode at once, but
//! leaves the slot's record as it was.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use heatwise_types::{DecisionReason, DecisionRecord, Mode, OverrideState, slot_start, slot_width};
use parking_lot::RwLock;
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::cost::CostModel;
use crate::decision_log::DecisionLog;
use crate::engine::{Decision, DecisionEngine, DecisionInputs};
use crate::mode_controller::ModeController;
use crate::rate_store::RateStore;
use crate::relay::{Relay, RetryPolicy, apply_with_retry};
use crate::schedule::ScheduleConfig;

/// How far back decision records are read for minimum-run bookkeeping.
const HISTORY_LOOKBACK_HOURS: i64 = 4;

/// Slack added after a slot boundary before the next tick.
const BOUNDARY_GRACE: StdDuration = StdDuration::from_millis(250);

/// Observable state of the loop, reported by the status and health endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlStatus {
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_decision: Option<Decision>,
    pub last_record: Option<DecisionRecord>,
    /// Slot and command last confirmed by the relay
    pub applied: Option<(DateTime<Utc>, bool)>,
    pub relay_healthy: bool,
    pub last_relay_error: Option<String>,
    pub consecutive_relay_failures: u32,
}

impl Default for ControlStatus {
    fn default() -> Self {
        Self {
            last_tick_at: None,
            last_decision: None,
            last_record: None,
            applied: None,
            relay_healthy: true,
            last_relay_error: None,
            consecutive_relay_failures: 0,
        }
    }
}

impl ControlStatus {
    /// Heating state most recently decided, including a mid-slot mode change.
    pub fn is_heating(&self) -> bool {
        self.last_decision
            .map(|d| d.heating)
            .or_else(|| self.last_record.as_ref().map(|r| r.heating))
            .unwrap_or(false)
    }

    pub fn reason(&self) -> Option<DecisionReason> {
        self.last_decision
            .map(|d| d.reason)
            .or_else(|| self.last_record.as_ref().map(|r| r.reason))
    }
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A new decision was made and recorded
    Decided(DecisionRecord),
    /// The slot was already recorded; its outcome was sent to the relay again
    Replayed(DecisionRecord),
    /// The slot was already recorded; the manual mode drove the relay instead
    Overridden(DecisionRecord),
    /// The slot was already recorded and applied
    Unchanged(DecisionRecord),
}

impl TickOutcome {
    pub fn record(&self) -> &DecisionRecord {
        match self {
            Self::Decided(r) | Self::Replayed(r) | Self::Overridden(r) | Self::Unchanged(r) => r,
        }
    }
}

#[derive(Debug)]
pub struct ControlLoop {
    engine: DecisionEngine,
    schedule: Arc<ScheduleConfig>,
    rates: Arc<RateStore>,
    mode: Arc<ModeController>,
    log: Arc<dyn DecisionLog>,
    relay: Arc<dyn Relay>,
    costs: CostModel,
    retry: RetryPolicy,
    status: RwLock<ControlStatus>,
    wake: Notify,
}

impl ControlLoop {
    pub fn new(
        schedule: Arc<ScheduleConfig>,
        rates: Arc<RateStore>,
        mode: Arc<ModeController>,
        log: Arc<dyn DecisionLog>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(schedule.timezone()),
            schedule,
            rates,
            mode,
            log,
            relay,
            costs: CostModel::default(),
            retry: RetryPolicy::default(),
            status: RwLock::new(ControlStatus::default()),
            wake: Notify::new(),
        }
    }

    pub fn with_costs(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn status(&self) -> ControlStatus {
        self.status.read().clone()
    }

    /// Ask the running loop to re-evaluate the relay before the next tick.
    pub fn request_reevaluation(&self) {
        self.wake.notify_one();
    }

    /// Run one evaluation at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        self.mode.expire_if_due(now);
        self.status.write().last_tick_at = Some(now);

        let slot = slot_start(now);
        match self.log.get(slot) {
            Ok(Some(existing)) => return self.reapply(existing, now).await,
            Ok(None) => {}
            Err(e) => error!(slot_start = %slot, "Failed to read decision log: {:#}", e),
        }

        let decision = self.decide(now, slot);
        let record = self.costs.record(slot, &decision, self.mode.current().mode);

        match self.log.insert_if_absent(&record) {
            Ok(true) => info!(
                slot_start = %record.slot_start,
                heating = record.heating,
                reason = %record.reason,
                rate = ?record.rate,
                "Decision recorded"
            ),
            Ok(false) => debug!(slot_start = %record.slot_start, "Decision already recorded"),
            Err(e) => error!(slot_start = %record.slot_start, "Failed to record decision: {:#}", e),
        }

        {
            let mut status = self.status.write();
            status.last_decision = Some(decision);
            status.last_record = Some(record.clone());
        }
        self.apply(record.slot_start, record.heating).await;
        TickOutcome::Decided(record)
    }

    fn decide(&self, now: DateTime<Utc>, slot: DateTime<Utc>) -> Decision {
        let recent = self
            .log
            .records_between(slot - Duration::hours(HISTORY_LOOKBACK_HOURS), slot)
            .unwrap_or_else(|e| {
                warn!("Failed to read recent decisions, assuming none: {:#}", e);
                Vec::new()
            });
        let windows = self.schedule.list_windows();
        let settings = self.schedule.get_settings();

        self.engine.decide(
            now,
            &DecisionInputs {
                mode: self.mode.current(),
                windows: &windows,
                settings: &settings,
                rate: self.rates.rate_at(now),
                recent: &recent,
            },
        )
    }

    async fn reapply(&self, existing: DecisionRecord, now: DateTime<Utc>) -> TickOutcome {
        {
            let mut status = self.status.write();
            if status.last_record.as_ref().map(|r| r.slot_start) != Some(existing.slot_start) {
                status.last_decision = None;
            }
            status.last_record = Some(existing.clone());
        }

        if is_manual(self.mode.current(), now) {
            return if self.reevaluate(now).await {
                TickOutcome::Overridden(existing)
            } else {
                TickOutcome::Unchanged(existing)
            };
        }

        let already_applied =
            self.status.read().applied == Some((existing.slot_start, existing.heating));
        if already_applied {
            return TickOutcome::Unchanged(existing);
        }

        info!(
            slot_start = %existing.slot_start,
            heating = existing.heating,
            "Re-applying recorded decision"
        );
        self.apply(existing.slot_start, existing.heating).await;
        TickOutcome::Replayed(existing)
    }

    /// Bring the relay in line with the current mode without touching the
    /// slot's record. Returns `true` if a command was sent.
    pub async fn reevaluate(&self, now: DateTime<Utc>) -> bool {
        self.mode.expire_if_due(now);
        let slot = slot_start(now);
        let decision = self.decide(now, slot);

        let already_applied = {
            let mut status = self.status.write();
            status.last_decision = Some(decision);
            status.applied == Some((slot, decision.heating))
        };
        if already_applied {
            return false;
        }

        info!(
            heating = decision.heating,
            reason = %decision.reason,
            "Applying mode change before next slot"
        );
        self.apply(slot, decision.heating).await;
        true
    }

    async fn apply(&self, slot: DateTime<Utc>, heating: bool) {
        let result = apply_with_retry(self.relay.as_ref(), heating, &self.retry).await;

        let mut status = self.status.write();
        match result {
            Ok(_) => {
                status.applied = Some((slot, heating));
                status.relay_healthy = true;
                status.last_relay_error = None;
                status.consecutive_relay_failures = 0;
            }
            Err(e) => {
                status.relay_healthy = false;
                status.last_relay_error = Some(e.to_string());
                status.consecutive_relay_failures += 1;
            }
        }
    }

    /// Tick immediately, then at every slot boundary until `shutdown` turns
    /// true or its sender is dropped. A tick in progress always completes and
    /// the relay is left in its last commanded state.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(relay = self.relay.name(), "Control loop started");

        'ticks: loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick(Utc::now()).await;

            let boundary = tokio::time::sleep(until_next_slot(Utc::now()));
            tokio::pin!(boundary);
            loop {
                let boost_end = until_boost_ends(self.mode.current(), Utc::now());
                tokio::select! {
                    () = &mut boundary => break,
                    () = boost_end => {
                        self.reevaluate(Utc::now()).await;
                    }
                    () = self.wake.notified() => {
                        self.reevaluate(Utc::now()).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'ticks;
                        }
                    }
                }
            }
        }

        info!("Control loop stopped");
    }
}

/// Off and an unexpired Boost take precedence over a slot's recorded outcome.
fn is_manual(mode: OverrideState, now: DateTime<Utc>) -> bool {
    match mode.mode {
        Mode::Off => true,
        Mode::Boost => !mode.is_expired_boost(now),
        Mode::Optimized => false,
    }
}

/// Completes when the current Boost runs out; never completes otherwise.
async fn until_boost_ends(mode: OverrideState, now: DateTime<Utc>) {
    match mode.expires_at.filter(|_| mode.mode == Mode::Boost) {
        Some(expires_at) => {
            tokio::time::sleep((expires_at - now).to_std().unwrap_or_default()).await;
        }
        None => std::future::pending().await,
    }
}

fn until_next_slot(now: DateTime<Utc>) -> StdDuration {
    let next = slot_start(now) + slot_width();
    (next - now).to_std().unwrap_or_default() + BOUNDARY_GRACE
}

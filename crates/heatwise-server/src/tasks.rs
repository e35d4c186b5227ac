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

//! Background tasks that run beside the control loop: tariff refresh, meter
//! reading refresh and retention cleanup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use heatwise_core::{ConsumptionFeed, ConsumptionStore, RateFeed, RateStore};
use heatwise_types::slot_start;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::Database;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(86400);

/// Periodically pulls upcoming slots from a rate feed into the store and the
/// database.
#[derive(Debug)]
pub struct RateRefresher {
    feed: Arc<dyn RateFeed>,
    rates: Arc<RateStore>,
    db: Arc<Database>,
    interval: Duration,
    lookahead: chrono::Duration,
}

impl RateRefresher {
    pub fn new(
        feed: Arc<dyn RateFeed>,
        rates: Arc<RateStore>,
        db: Arc<Database>,
        interval: Duration,
        lookahead_hours: u32,
    ) -> Self {
        Self {
            feed,
            rates,
            db,
            interval,
            lookahead: chrono::Duration::hours(i64::from(lookahead_hours)),
        }
    }

    /// Fetch slots from the current slot up to the lookahead horizon and
    /// ingest them. Returns the number of slots accepted.
    pub async fn refresh_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let from = slot_start(now);
        let to = from + self.lookahead;
        let source = self.feed.source();

        let slots = self
            .feed
            .fetch_rates(from, to)
            .await
            .with_context(|| format!("Failed to fetch rates from {source}"))?;
        if slots.is_empty() {
            warn!(source, "Rate feed returned no slots for {} - {}", from, to);
            return Ok(0);
        }

        let accepted = self
            .rates
            .upsert(&slots, source)
            .with_context(|| format!("Rejected rate batch from {source}"))?;
        self.db
            .upsert_rate_slots(&slots, source)
            .context("Failed to store rate slots")?;

        info!(
            source,
            slots = accepted,
            latest = ?self.rates.latest_start(),
            "Rates ingested"
        );
        Ok(accepted)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            source = self.feed.source(),
            interval_secs = self.interval.as_secs(),
            "Rate refresh started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_once(Utc::now()).await {
                        warn!("Rate refresh failed, retrying next cycle: {:#}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Rate refresh stopped");
    }
}

/// Periodically reads recent meter intervals into the consumption store and
/// the database. The supplier publishes readings with a delay, so every pass
/// re-reads the whole lookback.
#[derive(Debug)]
pub struct ConsumptionRefresher {
    feed: Arc<dyn ConsumptionFeed>,
    consumption: Arc<ConsumptionStore>,
    db: Arc<Database>,
    interval: Duration,
    lookback: chrono::Duration,
}

impl ConsumptionRefresher {
    pub fn new(
        feed: Arc<dyn ConsumptionFeed>,
        consumption: Arc<ConsumptionStore>,
        db: Arc<Database>,
        interval: Duration,
        lookback_hours: u32,
    ) -> Self {
        Self {
            feed,
            consumption,
            db,
            interval,
            lookback: chrono::Duration::hours(i64::from(lookback_hours)),
        }
    }

    /// Fetch completed intervals in the lookback and store them. Returns the
    /// number of readings kept.
    pub async fn refresh_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let to = slot_start(now);
        let from = to - self.lookback;

        let samples = self
            .feed
            .fetch_consumption(from, to)
            .await
            .context("Failed to fetch meter readings")?;
        if samples.is_empty() {
            debug!("No meter readings published for {} - {}", from, to);
            return Ok(0);
        }

        let kept = self.consumption.upsert(&samples);
        self.db
            .upsert_consumption(&samples)
            .context("Failed to store meter readings")?;

        info!(
            readings = kept,
            latest = ?self.consumption.latest_end(),
            "Meter readings ingested"
        );
        Ok(kept)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Meter reading refresh started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_once(Utc::now()).await {
                        warn!("Meter reading refresh failed, retrying next cycle: {:#}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Meter reading refresh stopped");
    }
}

/// Drop stored rows, in-memory slots and meter readings older than the
/// retention window.
pub fn cleanup_once(
    db: &Database,
    rates: &RateStore,
    consumption: &ConsumptionStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let removed_rows = db.cleanup_older_than(retention_days)?;
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));
    let evicted = rates.evict_before(cutoff);
    let readings = consumption.evict_before(cutoff);
    debug!(removed_rows, evicted, readings, "Retention cleanup finished");
    Ok(())
}

pub async fn run_retention_cleanup(
    db: Arc<Database>,
    rates: Arc<RateStore>,
    consumption: Arc<ConsumptionStore>,
    retention_days: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = cleanup_once(&db, &rates, &consumption, retention_days, Utc::now()) {
                    error!("Retention cleanup failed: {:#}", e);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

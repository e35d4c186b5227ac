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

//! Heatwise server: configuration, SQLite storage, REST API and the
//! background tasks around the decision core.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use heatwise_adapters::{DryRunRelay, HomeAssistantRelay, OctopusRateFeed};
use heatwise_core::{ConsumptionStore, RateStore, Relay, StatePersistence};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app::{AppState, EngineParts};
use crate::config::{RelayKind, RelaySettings, ServerConfig};
use crate::db::Database;
use crate::tasks::{ConsumptionRefresher, RateRefresher};

pub fn build_relay(settings: &RelaySettings) -> Result<Arc<dyn Relay>> {
    match settings.kind {
        RelayKind::DryRun => {
            info!("Using dry-run relay, no hardware will be switched");
            Ok(Arc::new(DryRunRelay::new()))
        }
        RelayKind::HomeAssistant => {
            let relay = HomeAssistantRelay::from_config(
                settings.base_url.clone().unwrap_or_default(),
                settings.token.clone(),
                settings.entity_id.clone().unwrap_or_default(),
            )
            .context("Failed to set up Home Assistant relay")?;
            Ok(Arc::new(relay))
        }
    }
}

/// Fill the rate store from slots kept in the database.
fn restore_rates(db: &Database, rates: &RateStore, retention_days: u32) -> Result<()> {
    let since = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    for (source, slots) in db.load_rate_slots(since)? {
        match rates.upsert(&slots, &source) {
            Ok(count) => info!(source = %source, count, "Restored rate slots"),
            Err(e) => warn!(source = %source, "Skipping stored rate slots: {}", e),
        }
    }
    Ok(())
}

/// Fill the consumption store from meter readings kept in the database.
fn restore_consumption(
    db: &Database,
    consumption: &ConsumptionStore,
    retention_days: u32,
) -> Result<()> {
    let since = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let count = consumption.upsert(&db.load_consumption(since)?);
    if count > 0 {
        info!(count, "Restored meter readings");
    }
    Ok(())
}

/// Start the engine and serve the API until Ctrl-C.
pub async fn run(config: &ServerConfig) -> Result<()> {
    let timezone = config.timezone()?;
    let db = Arc::new(Database::open(&config.database.path)?);
    let rates = Arc::new(RateStore::new());
    restore_rates(&db, &rates, config.database.retention_days)?;
    let consumption = Arc::new(ConsumptionStore::new());
    restore_consumption(&db, &consumption, config.database.retention_days)?;

    let persistence = StatePersistence::new(&config.state.path);
    let state = persistence.load()?;

    let app_state = AppState::new(EngineParts {
        timezone,
        state,
        rates: rates.clone(),
        consumption: consumption.clone(),
        log: db.clone(),
        relay: build_relay(&config.relay)?,
        persistence,
        costs: config.cost_model(),
        retry: config.retry_policy(),
    })
    .context("Stored engine state is invalid")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = vec![tokio::spawn(
        app_state.control.clone().run(shutdown_rx.clone()),
    )];

    if config.rate_feed.enabled {
        let feed = OctopusRateFeed::from_config(
            config.rate_feed.base_url.clone(),
            config.rate_feed.product_code.clone(),
            config.rate_feed.tariff_code.clone(),
            config.rate_feed.api_key.clone(),
        )?;
        let interval = Duration::from_secs(config.rate_feed.refresh_interval_secs);

        if let Some(meter) = config.meter_point() {
            let metered = feed.clone().with_meter(meter);
            let refresher = ConsumptionRefresher::new(
                Arc::new(metered),
                consumption.clone(),
                db.clone(),
                interval,
                config.rate_feed.consumption_lookback_hours,
            );
            handles.push(tokio::spawn(refresher.run(shutdown_rx.clone())));
        } else {
            info!("No electricity meter configured, usage history shows estimates only");
        }

        let refresher = RateRefresher::new(
            Arc::new(feed),
            rates.clone(),
            db.clone(),
            interval,
            config.rate_feed.lookahead_hours,
        );
        handles.push(tokio::spawn(refresher.run(shutdown_rx.clone())));
    } else {
        info!("Rate feed disabled, decisions use stored slots only");
    }

    handles.push(tokio::spawn(tasks::run_retention_cleanup(
        db,
        rates,
        consumption,
        config.database.retention_days,
        shutdown_rx,
    )));

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Heatwise API listening on http://{addr}");

    let signal_tx = shutdown_tx.clone();
    axum::serve(listener, api::router(app_state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            signal_tx.send_replace(true);
        })
        .await
        .context("API server failed")?;

    shutdown_tx.send_replace(true);
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    info!("Heatwise stopped");
    Ok(())
}
